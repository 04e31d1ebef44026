use criterion::{Criterion, criterion_group, criterion_main};
use kb_rag::chunking::{ChunkingConfig, chunk_text};
use kb_rag::extraction::{HtmlExtractor, TextExtractor};
use std::hint::black_box;

fn handbook_text() -> String {
    let paragraph = "Employees accrue vacation monthly. Requests go through the HR portal! \
                     Who approves them? Your manager does, usually within two days.\n\
                     Unused days roll over once.";
    (0..400)
        .map(|i| format!("Section {}\n{}", i, paragraph))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = handbook_text();
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&config)))
    });

    let html = format!(
        "<html><head><style>p {{ color: red; }}</style></head><body>{}</body></html>",
        text.split("\n\n")
            .map(|section| format!("<p>{}</p>", section))
            .collect::<Vec<_>>()
            .concat()
    );
    c.bench_function("html_extraction_and_chunking", |b| {
        b.iter(|| {
            let extracted = HtmlExtractor
                .extract(black_box(html.as_bytes()))
                .expect("benchmark page should extract");
            chunk_text(&extracted, &config)
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

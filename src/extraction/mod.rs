// File-type specific text extraction


use scraper::{Html, Node};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

const BLOCK_ELEMENTS: [&str; 24] = [
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figcaption",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main", "p", "pre", "section",
    "tr",
];

/// Converts raw file bytes into plain text
pub trait TextExtractor: Send + Sync {
    /// Lowercase extensions, without the dot, this extractor handles
    fn extensions(&self) -> &[&'static str];

    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// UTF-8 text and Markdown, passed through as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md", "markdown"]
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RagError::Extraction(format!("File is not valid UTF-8: {}", e)))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
    }
}

/// Visible text of an HTML document
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["html", "htm"]
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let html = std::str::from_utf8(bytes)
            .map_err(|e| RagError::Extraction(format!("HTML is not valid UTF-8: {}", e)))?;
        Ok(visible_text(&Html::parse_document(html)))
    }
}

/// Text layer of a PDF
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        // pdf-extract panics on some malformed font tables
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match result {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RagError::Extraction(format!(
                "Failed to extract PDF text: {}",
                e
            ))),
            Err(_) => {
                warn!("PDF extraction panicked");
                Err(RagError::Extraction(
                    "Failed to extract PDF text: malformed document".to_string(),
                ))
            }
        }
    }
}

/// Extractors keyed by file extension
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

impl Default for ExtractorRegistry {
    #[inline]
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(HtmlExtractor));
        registry.register(Arc::new(PdfExtractor));
        registry
    }
}

impl ExtractorRegistry {
    /// A registry with no extractors
    #[inline]
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Register `extractor` for each of its extensions, replacing earlier ones
    #[inline]
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for extension in extractor.extensions() {
            self.extractors
                .insert(extension.to_ascii_lowercase(), Arc::clone(&extractor));
        }
    }

    /// Extractor for an extension, ignoring case and a leading dot
    #[inline]
    pub fn get(&self, extension: &str) -> Option<Arc<dyn TextExtractor>> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extractors.get(&extension).cloned()
    }

    #[inline]
    pub fn supports(&self, extension: &str) -> bool {
        self.get(extension).is_some()
    }

    /// Extractor for a file name, or `UnsupportedFileType`
    #[inline]
    pub fn for_file_name(&self, file_name: &str) -> Result<Arc<dyn TextExtractor>> {
        let extension = file_extension(file_name);
        self.get(&extension)
            .ok_or(RagError::UnsupportedFileType { extension })
    }

    /// Sorted list of supported extensions
    #[inline]
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extractors.keys().cloned().collect();
        extensions.sort_unstable();
        extensions
    }
}

/// Lowercase extension of `file_name`, empty when it has none
#[inline]
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    let mut current_block = None;

    for node in document.tree.root().descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }

        let words: Vec<&str> = fragment.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let block = node.ancestors().find(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| BLOCK_ELEMENTS.contains(&element.name()))
        });
        let block_id = block.map(|b| b.id());

        if !text.is_empty() {
            text.push_str(if block_id == current_block { " " } else { "\n\n" });
        }
        current_block = block_id;
        text.push_str(&words.join(" "));
    }

    debug!("Extracted {} characters of visible HTML text", text.len());
    text
}

use clap::{Parser, Subcommand};
use kb_rag::Result;
use kb_rag::commands::{
    ask, create_knowledge_base, delete_document, document_info, download_document, ingest_file,
    list_documents, list_knowledge_bases, repair, show_status,
};
use kb_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "Knowledge-base document ingestion and question answering")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Manage knowledge bases
    Kb {
        #[command(subcommand)]
        action: KbCommands,
    },
    /// Upload a file into a knowledge base
    Ingest {
        /// Knowledge base ID or name
        kb: String,
        /// File to upload (txt, md, html, pdf)
        file: PathBuf,
    },
    /// Ask a question against a knowledge base
    Ask {
        /// Knowledge base ID or name
        kb: String,
        /// The question; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// List the documents of a knowledge base
    Docs {
        /// Knowledge base ID or name
        kb: String,
    },
    /// Delete a document
    Delete {
        /// Document ID
        doc: String,
    },
    /// Show details of a document
    Info {
        /// Document ID
        doc: String,
    },
    /// Save the original upload of a document
    Download {
        /// Document ID
        doc: String,
        /// Destination file or directory
        dest: PathBuf,
    },
    /// Re-index a document, or every failed document when none is given
    Repair {
        /// Document ID
        doc: Option<String>,
    },
    /// Show the status of Ollama, the vector store and the documents
    Status,
}

#[derive(Subcommand)]
enum KbCommands {
    /// Create a knowledge base
    Create {
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List knowledge bases
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Kb { action } => match action {
            KbCommands::Create { name, description } => {
                create_knowledge_base(&name, description).await?;
            }
            KbCommands::List => {
                list_knowledge_bases().await?;
            }
        },
        Commands::Ingest { kb, file } => {
            ingest_file(&kb, &file).await?;
        }
        Commands::Ask { kb, question } => {
            ask(&kb, &question.join(" ")).await?;
        }
        Commands::Docs { kb } => {
            list_documents(&kb).await?;
        }
        Commands::Delete { doc } => {
            delete_document(&doc).await?;
        }
        Commands::Info { doc } => {
            document_info(&doc).await?;
        }
        Commands::Download { doc, dest } => {
            download_document(&doc, &dest).await?;
        }
        Commands::Repair { doc } => {
            repair(doc.as_deref()).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

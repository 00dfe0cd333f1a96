//! CLI commands for docrelay using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::agents::Pipeline;
use crate::config::{load_settings_or_default, validate_settings, Settings, UndeliverablePolicy};
use crate::providers::{create_embedder, create_provider, Provider};
use crate::store::VectorStore;

/// docrelay - question answering over your documents, one agent hop at a time.
#[derive(Parser)]
#[command(name = "docrelay")]
#[command(version)]
#[command(about = "Ask questions over an ingested document corpus", long_about = None)]
pub struct Commands {
    /// Vector store directory (overrides settings)
    #[arg(long, global = true, env = "DOCRELAY_STORE")]
    pub store: Option<PathBuf>,

    /// Generation provider: extractive, ollama
    #[arg(long, global = true, env = "DOCRELAY_PROVIDER")]
    pub provider: Option<String>,

    /// Embedding provider: hash, ollama
    #[arg(long, global = true, env = "DOCRELAY_EMBEDDER")]
    pub embedder: Option<String>,

    /// What to do with envelopes nobody listens for: drop, warn, reject
    #[arg(long, global = true, value_parser = parse_policy)]
    pub undeliverable: Option<UndeliverablePolicy>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ask a question
    Ask {
        /// The question
        question: String,

        /// Documents to ingest before answering
        #[arg(long = "doc", short = 'd')]
        docs: Vec<PathBuf>,

        /// Seconds to wait for the answer
        #[arg(long)]
        timeout: Option<u64>,

        /// Print every envelope of the question's trace
        #[arg(long)]
        trace: bool,
    },

    /// Ingest documents into the vector store
    Ingest {
        /// Document paths
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Seconds to wait for each document
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Search the vector store without generating an answer
    Search {
        /// Search text
        query: String,

        /// Number of fragments to return
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// Show vector store statistics
    Stats,

    /// Print the effective settings
    Config,
}

fn parse_policy(s: &str) -> std::result::Result<UndeliverablePolicy, String> {
    match s.to_lowercase().as_str() {
        "drop" => Ok(UndeliverablePolicy::Drop),
        "warn" => Ok(UndeliverablePolicy::Warn),
        "reject" => Ok(UndeliverablePolicy::Reject),
        other => Err(format!("unknown policy '{}' (drop, warn, reject)", other)),
    }
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings = self.settings()?;
        match &self.command {
            Command::Ask {
                question,
                docs,
                timeout,
                trace,
            } => cmd_ask(&settings, question, docs, *timeout, *trace).await,
            Command::Ingest { paths, timeout } => cmd_ingest(&settings, paths, *timeout).await,
            Command::Search { query, k } => cmd_search(&settings, query, *k).await,
            Command::Stats => cmd_stats(&settings).await,
            Command::Config => cmd_config(&settings),
        }
    }

    /// Settings file values with command-line overrides applied.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = load_settings_or_default();
        if let Some(store) = &self.store {
            settings.store.dir = Some(store.clone());
        }
        if let Some(provider) = &self.provider {
            settings.generation.provider = provider.clone();
        }
        if let Some(embedder) = &self.embedder {
            settings.embedding.provider = embedder.clone();
        }
        if let Some(policy) = self.undeliverable {
            settings.bus.undeliverable = policy;
        }
        validate_settings(&settings)?;
        Ok(settings)
    }
}

// Command implementations

async fn cmd_ask(
    settings: &Settings,
    question: &str,
    docs: &[PathBuf],
    timeout: Option<u64>,
    trace: bool,
) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let timeout = timeout.map(Duration::from_secs);

    // Ingest first so the search sees the new documents.
    for doc in docs {
        pipeline
            .ingest(doc, timeout)
            .await
            .with_context(|| format!("Failed to ingest {}", doc.display()))?;
        println!("Ingested {}", doc.display());
    }

    let answer = pipeline.ask(question, Vec::new(), timeout).await;
    if trace {
        let trace_id = match &answer {
            Ok(answer) => Some(answer.trace_id.clone()),
            Err(crate::error::Error::Failed { trace_id, .. }) => Some(trace_id.clone()),
            Err(_) => None,
        };
        if let Some(trace_id) = trace_id {
            let hops = pipeline.journal().for_trace(&trace_id);
            eprintln!("{}", serde_json::to_string_pretty(&hops)?);
        }
    }
    pipeline.shutdown();

    let answer = answer?;
    println!("{}", answer.answer);
    if !answer.source_chunks.is_empty() {
        println!("\nSources:");
        for (i, chunk) in answer.source_chunks.iter().enumerate() {
            println!("  [{}] {}", i + 1, truncate(chunk, 160));
        }
    }
    Ok(())
}

async fn cmd_ingest(settings: &Settings, paths: &[PathBuf], timeout: Option<u64>) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let timeout = timeout.map(Duration::from_secs);

    let mut failed = 0;
    for path in paths {
        let before = pipeline.store().len();
        match pipeline.ingest(path, timeout).await {
            Ok(()) => println!(
                "Ingested {} ({} fragments)",
                path.display(),
                pipeline.store().len() - before
            ),
            Err(e) => {
                failed += 1;
                eprintln!("Failed to ingest {}: {}", path.display(), e);
            }
        }
    }
    pipeline.shutdown();

    if failed > 0 {
        anyhow::bail!("{} of {} documents failed", failed, paths.len());
    }
    Ok(())
}

async fn cmd_search(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let store = VectorStore::open(&settings.store, create_embedder(settings))?;
    let hits = store
        .search(query, k.unwrap_or(settings.pipeline.top_k))
        .await?;

    if hits.is_empty() {
        println!("No fragments found.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            truncate(&hit.fragment.text, 160),
            hit.fragment.source
        );
    }
    Ok(())
}

async fn cmd_stats(settings: &Settings) -> Result<()> {
    let store = VectorStore::open(&settings.store, create_embedder(settings))?;
    let location = settings
        .store
        .dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(memory)".to_string());

    println!("Store:     {}", location);
    println!("Dimension: {}", store.dimension());
    println!("Fragments: {}", store.len());
    println!("Vectors:   {}", store.vector_count());
    println!("Generator: {}", generator_status(create_provider(settings).as_ref()).await);

    let sources = store.sources();
    println!("Sources:   {}", sources.len());
    for source in sources {
        println!("  {}", source);
    }
    Ok(())
}

/// Provider name, model and whether it answers right now.
async fn generator_status(provider: &dyn Provider) -> String {
    let state = if provider.is_available().await {
        "available"
    } else {
        "unreachable"
    };
    match provider.default_model() {
        Some(model) => format!("{} {} ({})", provider.name(), model, state),
        None => format!("{} ({})", provider.name(), state),
    }
}

fn cmd_config(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_docs() {
        let commands = Commands::try_parse_from([
            "docrelay",
            "ask",
            "What is the capital of France?",
            "--doc",
            "geo.txt",
            "-d",
            "notes.md",
            "--trace",
        ])
        .unwrap();

        match commands.command {
            Command::Ask {
                question,
                docs,
                trace,
                timeout,
            } => {
                assert_eq!(question, "What is the capital of France?");
                assert_eq!(docs, vec![PathBuf::from("geo.txt"), PathBuf::from("notes.md")]);
                assert!(trace);
                assert_eq!(timeout, None);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_global_overrides() {
        let commands = Commands::try_parse_from([
            "docrelay",
            "search",
            "capital",
            "-k",
            "5",
            "--store",
            "/tmp/db",
            "--undeliverable",
            "reject",
        ])
        .unwrap();

        assert_eq!(commands.store, Some(PathBuf::from("/tmp/db")));
        assert_eq!(commands.undeliverable, Some(UndeliverablePolicy::Reject));
        assert!(matches!(commands.command, Command::Search { k: Some(5), .. }));
    }

    #[test]
    fn test_ingest_requires_paths() {
        assert!(Commands::try_parse_from(["docrelay", "ingest"]).is_err());
        assert!(Commands::try_parse_from(["docrelay", "ask", "q", "--undeliverable", "loud"]).is_err());
    }

    #[tokio::test]
    async fn test_generator_status() {
        use crate::providers::extractive::ExtractiveProvider;
        use crate::providers::ollama::OllamaProvider;

        assert_eq!(
            generator_status(&ExtractiveProvider::new()).await,
            "extractive (available)"
        );

        // Nothing listens on port 9 of the loopback interface.
        let offline = OllamaProvider::new(
            Some("http://127.0.0.1:9".to_string()),
            Some("llama3".to_string()),
        );
        assert_eq!(generator_status(&offline).await, "ollama llama3 (unreachable)");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}

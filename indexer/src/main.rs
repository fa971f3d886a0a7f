use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corpus::persist::{list_versions, StorePaths};
use corpus::tokenizer::Analyzer;
use corpus::{recover, Checkpoint, CorpusConfig, OnlineCorpus, Version, Vocabulary};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(default)]
    title: Option<String>,
    body: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Feed documents into a versioned corpus store and inspect its checkpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize text/JSON/JSONL files and add them to the store in batches
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Store root directory
        #[arg(long)]
        root: String,
        /// Number of most recent versions to keep
        #[arg(long, default_value_t = 5)]
        retention: usize,
        /// Checkpoint on every n-th batch
        #[arg(long, default_value_t = 1)]
        checkpoint_interval: usize,
        /// Documents per add_documents call
        #[arg(long, default_value_t = 256)]
        batch_size: usize,
        /// Keep stopwords and skip stemming
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// List published versions
    Versions {
        #[arg(long)]
        root: String,
    },
    /// Print vocabulary statistics as JSON
    Stats {
        #[arg(long)]
        root: String,
        /// Read a specific version instead of the latest
        #[arg(long)]
        version: Option<Version>,
        /// Report a single word instead of the whole corpus
        #[arg(long)]
        word: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, root, retention, checkpoint_interval, batch_size, raw } => {
            let config = CorpusConfig::new(root).with_retention(retention).with_checkpoint_interval(checkpoint_interval);
            let analyzer = if raw { Analyzer::raw() } else { Analyzer::default() };
            ingest(Path::new(&input), config, analyzer, batch_size)
        }
        Commands::Versions { root } => print_versions(Path::new(&root)),
        Commands::Stats { root, version, word } => print_stats(Path::new(&root), version, word.as_deref()),
    }
}

fn ingest(input: &Path, config: CorpusConfig, analyzer: Analyzer, batch_size: usize) -> Result<()> {
    let mut store = OnlineCorpus::open(config)?;
    let batch_size = batch_size.max(1);
    let mut batch: Vec<Vec<String>> = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    for file in collect_files(input) {
        for text in read_texts(&file).with_context(|| format!("reading {}", file.display()))? {
            batch.push(analyzer.tokens(&text));
            if batch.len() == batch_size {
                total += flush(&mut store, &mut batch)?;
            }
        }
    }
    if !batch.is_empty() {
        total += flush(&mut store, &mut batch)?;
    }
    store.commit()?;

    tracing::info!(documents = total, version = store.version(), tokens = store.vocabulary().len(), "ingest complete");
    Ok(())
}

fn flush(store: &mut OnlineCorpus, batch: &mut Vec<Vec<String>>) -> Result<usize> {
    let commit = store.add_documents(batch.drain(..))?;
    for warning in &commit.warnings {
        tracing::warn!(%warning, "retention");
    }
    Ok(commit.documents)
}

/// Input files in a stable order. Directories are walked recursively for .txt, .json and .jsonl.
fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("txt" | "json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn extension(p: &Path) -> Option<&str> { p.extension().and_then(|s| s.to_str()) }

fn read_texts(file: &Path) -> Result<Vec<String>> {
    match extension(file) {
        Some("jsonl") => {
            let reader = BufReader::new(File::open(file)?);
            let mut texts = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() { continue; }
                let doc: InputDoc = serde_json::from_str(&line)?;
                texts.push(doc_text(doc));
            }
            Ok(texts)
        }
        Some("json") => {
            let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
            match json {
                serde_json::Value::Array(arr) => arr
                    .into_iter()
                    .map(|v| -> Result<String> { Ok(doc_text(serde_json::from_value(v)?)) })
                    .collect(),
                serde_json::Value::Object(_) => Ok(vec![doc_text(serde_json::from_value(json)?)]),
                _ => Ok(Vec::new()),
            }
        }
        _ => {
            let bytes = fs::read(file)?;
            Ok(vec![String::from_utf8_lossy(&bytes).into_owned()])
        }
    }
}

fn doc_text(doc: InputDoc) -> String {
    match doc.title {
        Some(title) => format!("{title}\n{}", doc.body),
        None => doc.body,
    }
}

fn print_versions(root: &Path) -> Result<()> {
    let paths = StorePaths::new(root);
    for version in list_versions(root)? {
        let created = fs::metadata(paths.version_dir(version))
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| time::OffsetDateTime::from(t).format(&time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_default();
        println!("{version}\t{created}");
    }
    Ok(())
}

fn load_vocabulary(root: &Path, version: Option<Version>) -> Result<(Version, Vocabulary)> {
    Ok(match version {
        Some(v) => (v, Checkpoint::open(root, v)?.vocabulary().clone()),
        None => {
            let recovered = recover(root)?;
            (recovered.version, recovered.vocabulary)
        }
    })
}

fn print_stats(root: &Path, version: Option<Version>, word: Option<&str>) -> Result<()> {
    let (version, vocab) = load_vocabulary(root, version)?;
    let out = match word {
        Some(w) => serde_json::json!({ "version": version, "word": w, "stats": vocab.word_statistics(w) }),
        None => serde_json::json!({ "version": version, "stats": vocab.statistics() }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_all_input_kinds() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "plain text file").unwrap();
        fs::write(dir.path().join("b.jsonl"), "{\"body\": \"one\"}\n\n{\"title\": \"T\", \"body\": \"two\"}\n").unwrap();
        fs::write(dir.path().join("c.json"), "[{\"body\": \"three\"}, {\"body\": \"four\"}]").unwrap();
        fs::write(dir.path().join("d.md"), "ignored").unwrap();

        let files = collect_files(dir.path());
        assert_eq!(files.len(), 3);
        let texts: Vec<String> = files.iter().flat_map(|f| read_texts(f).unwrap()).collect();
        assert_eq!(texts, vec!["plain text file", "one", "T\ntwo", "three", "four"]);
    }

    #[test]
    fn latin1_bytes_are_decoded_lossily() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("latin.txt");
        fs::write(&file, [b'c', b'a', b'f', 0xe9]).unwrap();
        let texts = read_texts(&file).unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("caf"));
    }

    #[test]
    fn ingest_batches_into_versions() {
        let input = tempdir().unwrap();
        let store = tempdir().unwrap();
        for i in 0..5 {
            fs::write(input.path().join(format!("{i}.txt")), format!("hello world number{i}")).unwrap();
        }
        ingest(input.path(), CorpusConfig::new(store.path()), Analyzer::raw(), 2).unwrap();

        let (version, vocab) = load_vocabulary(store.path(), None).unwrap();
        assert_eq!(version, 3);
        assert_eq!(vocab.num_docs(), 5);
        assert_eq!(vocab.word_statistics("hello").unwrap().doc_count, 5);
        let (_, first) = load_vocabulary(store.path(), Some(1)).unwrap();
        assert_eq!(first.num_docs(), 2);
    }
}

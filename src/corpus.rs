//! Corpus construction and the process-wide corpus cache.
//!
//! [`build_corpus`] scans the flat document directory, dispatches each
//! recognized file to its extractor, and concatenates the results into a
//! single normalized text with per-document section markers. A bad file is
//! logged and skipped; it never aborts the batch. A directory yielding no
//! text at all is fatal ([`EmptyCorpusError`]): the chat surface must not
//! come up over an empty knowledge base.
//!
//! [`CorpusStore`] owns the built corpus (and its retriever) as an
//! explicitly versioned resource: readers take cheap `Arc` snapshots,
//! `refresh()` rebuilds wholesale under a writer lock.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::retrieval::Retriever;

/// Packaging and manifest artifacts that would otherwise match a recognized
/// extension (a stray `requirements.txt` is not office knowledge).
pub const EXCLUDED_FILENAMES: &[&str] = &[
    "requirements.txt",
    "requirements-dev.txt",
    "robots.txt",
    "CMakeLists.txt",
    "packages.txt",
];

/// The full normalized text extracted from all ingested documents, plus the
/// bookkeeping of which files made it in. Read-only downstream.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub text: String,
    /// Successfully processed filenames, in ingestion order.
    pub files: Vec<String>,
    /// Files that failed extraction: (filename, cause).
    pub skipped: Vec<(String, String)>,
    pub built_at: DateTime<Utc>,
}

/// No file in the directory yielded any text. Fatal to the user-facing flow.
#[derive(Debug)]
pub struct EmptyCorpusError {
    pub dir: PathBuf,
    pub expected: Vec<&'static str>,
}

impl std::fmt::Display for EmptyCorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<String> = self.expected.iter().map(|e| format!("*.{}", e)).collect();
        write!(
            f,
            "no readable documents in {} (expected {})",
            self.dir.display(),
            patterns.join(", ")
        )
    }
}

impl std::error::Error for EmptyCorpusError {}

/// Scan the document directory and build the corpus.
///
/// Files are taken in filename order for determinism. Hidden files, the
/// built-in manifest exclusions, configured exclude globs, and unrecognized
/// extensions are all skipped silently; extraction failures are skipped
/// loudly (warning on stderr, recorded in `skipped`).
pub fn build_corpus(config: &Config, registry: &ExtractorRegistry) -> Result<Corpus> {
    let dir = &config.documents.dir;
    if !dir.is_dir() {
        anyhow::bail!("document directory does not exist: {}", dir.display());
    }

    let exclude_set = build_globset(&config.documents.exclude_globs)?;

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    let mut text = String::new();
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    let mut has_content = false;

    for path in &paths {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }
        if EXCLUDED_FILENAMES.contains(&name.as_str()) || exclude_set.is_match(&name) {
            continue;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if registry.find(&ext).is_none() {
            continue;
        }

        match registry.extract(path) {
            Ok(extracted) => {
                has_content |= !extracted.trim().is_empty();
                text.push_str(&format!("===== {} =====\n", name));
                text.push_str(&extracted);
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push('\n');
                files.push(name);
            }
            Err(e) => {
                eprintln!("warning: skipped {}: {}", name, e);
                skipped.push((name, e.to_string()));
            }
        }
    }

    // A success list of files that all contributed blank text (e.g. HWP
    // documents without a preview stream) is still an unusable corpus.
    if files.is_empty() || !has_content {
        return Err(EmptyCorpusError {
            dir: dir.clone(),
            expected: registry.recognized_extensions(),
        }
        .into());
    }

    Ok(Corpus {
        text,
        files,
        skipped,
        built_at: Utc::now(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

// ============ Versioned corpus cache ============

/// One immutable corpus version and the retriever built over it.
#[derive(Clone)]
pub struct Snapshot {
    pub version: u64,
    pub corpus: Arc<Corpus>,
    pub retriever: Arc<Retriever>,
}

/// Process-wide owner of the current corpus version. Expensive ingestion and
/// indexing run once, not per query; `refresh()` is the explicit operator
/// path for picking up document changes.
pub struct CorpusStore {
    inner: RwLock<Snapshot>,
}

impl CorpusStore {
    /// Build version 1. Fails fast (including on an empty corpus) so the
    /// caller can refuse to expose the chat surface.
    pub async fn initialize(config: &Config, registry: &ExtractorRegistry) -> Result<Self> {
        let corpus = build_corpus(config, registry)?;
        let retriever = Retriever::build(config, &corpus).await?;
        Ok(Self {
            inner: RwLock::new(Snapshot {
                version: 1,
                corpus: Arc::new(corpus),
                retriever: Arc::new(retriever),
            }),
        })
    }

    /// Cheap read of the current version. Queries hold the returned `Arc`s,
    /// not the lock, so a refresh never waits on a slow synthesis call.
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    /// Stop-the-world rebuild: the writer lock is held for the whole
    /// re-ingestion and re-indexing, so no query observes a half-built
    /// version. On failure the previous version stays current.
    pub async fn refresh(
        &self,
        config: &Config,
        registry: &ExtractorRegistry,
    ) -> Result<Snapshot> {
        let mut guard = self.inner.write().await;
        let corpus = build_corpus(config, registry)?;
        let retriever = Retriever::build(config, &corpus).await?;
        let next = Snapshot {
            version: guard.version + 1,
            corpus: Arc::new(corpus),
            retriever: Arc::new(retriever),
        };
        *guard = next.clone();
        Ok(next)
    }
}

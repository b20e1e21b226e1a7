//! # CLI Command Implementations
//!
//! Each subcommand of `d0s` lives in its own file with an `Args` struct
//! derived with `clap` and an `execute` function calling into the `d0s`
//! library.

use std::path::PathBuf;

use anyhow::{Context, Result};

use d0s::defaults::default_cache_root;
use d0s::error::Error;
use d0s::repository::SourceFetcher;
use d0s::source::{ManifestSource, Reference, Target};
use d0s::suggestions;

pub mod cache;
pub mod plan;
pub mod tree;

/// Fetcher rooted at `cache_root`, or the platform cache directory
pub fn fetcher(cache_root: Option<PathBuf>) -> SourceFetcher {
    SourceFetcher::new(cache_root.unwrap_or_else(default_cache_root))
}

/// Interpret a `--manifest` value: a git reference or a local path
pub fn manifest_source(raw: &str) -> Result<ManifestSource> {
    if raw.starts_with("git+") {
        let reference = Reference::parse(raw)?;
        if let Target::Remote(remote) = reference.target {
            return Ok(ManifestSource::Remote(remote));
        }
    }
    ManifestSource::local(raw).with_context(|| format!("Invalid manifest path {}", raw))
}

/// Attach hints to the library errors a user usually fixes by hand
pub fn explain(error: Error, source: &ManifestSource) -> anyhow::Error {
    match error {
        Error::NotFound { path, .. } if path == source.to_string() => {
            suggestions::manifest_not_found(&path)
        }
        Error::CyclicExtends { cycle } => suggestions::cycle_detected(&cycle),
        other => other.into(),
    }
}

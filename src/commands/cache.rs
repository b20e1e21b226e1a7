//! # Cache Command Implementation
//!
//! Manages the on-disk cache of git checkouts.
//!
//! ## Subcommands
//!
//! - **`list`**: Show every cached checkout with its ref and fetch time
//! - **`refresh`**: Bring one checkout, or all of them, up to date
//! - **`clean`**: Remove every cached checkout

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;

use super::fetcher;
use d0s::cache::{CacheEntry, CacheKey};
use d0s::output::{emoji, OutputConfig};
use d0s::repository::SourceFetcher;
use d0s::suggestions;

/// Manage the checkout cache
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// The root directory for the checkout cache.
    ///
    /// Defaults to the system cache directory (e.g. `~/.cache/d0s` on Linux).
    #[arg(long, value_name = "DIR", env = "D0S_CACHE", global = true)]
    pub cache_root: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List cached checkouts
    List(ListArgs),
    /// Re-fetch cached checkouts from their remotes
    Refresh(RefreshArgs),
    /// Remove every cached checkout
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Repository URL to refresh; every cached checkout when omitted
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Ref of the checkout to refresh; the default branch when omitted
    #[arg(long = "ref", value_name = "REF", requires = "url")]
    pub r#ref: Option<String>,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Show what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the `cache` command.
pub fn execute(args: CacheArgs, output: &OutputConfig) -> Result<()> {
    let fetcher = fetcher(args.cache_root);
    match args.command {
        CacheSubcommand::List(list_args) => execute_list(&fetcher, list_args, output),
        CacheSubcommand::Refresh(refresh_args) => execute_refresh(&fetcher, refresh_args, output),
        CacheSubcommand::Clean(clean_args) => execute_clean(&fetcher, clean_args, output),
    }
}

fn execute_list(fetcher: &SourceFetcher, args: ListArgs, output: &OutputConfig) -> Result<()> {
    let entries = fetcher.cache().list().context("Failed to read the cache")?;

    if args.json {
        let items: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "url": entry.marker.url,
                    "ref": entry.marker.r#ref,
                    "resolved_ref": entry.marker.resolved_ref,
                    "fetched_at": entry.marker.fetched_at,
                    "path": entry.path.display().to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No cached checkouts in {}", fetcher.cache().root().display());
        return Ok(());
    }

    println!(
        "{} {} cached checkouts in {}",
        emoji(output, "📦", "[cache]"),
        entries.len(),
        fetcher.cache().root().display()
    );
    for entry in &entries {
        println!("{}", format_entry(entry, SystemTime::now()));
    }
    Ok(())
}

/// One line per slot: `url @ ref (resolved, fetched 3h ago)`
fn format_entry(entry: &CacheEntry, now: SystemTime) -> String {
    let requested = entry.marker.r#ref.as_deref().unwrap_or("default branch");
    let fetched = UNIX_EPOCH + Duration::from_secs(entry.marker.fetched_at);
    let age = now
        .duration_since(fetched)
        .map(format_age)
        .unwrap_or_else(|_| "just now".to_string());
    format!(
        "  {} @ {} ({}, fetched {})",
        entry.marker.url, requested, entry.marker.resolved_ref, age
    )
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn execute_refresh(fetcher: &SourceFetcher, args: RefreshArgs, output: &OutputConfig) -> Result<()> {
    let refreshed = match args.url {
        Some(url) => {
            let key = CacheKey::new(&url, args.r#ref.as_deref());
            let cached = fetcher.cache().list()?;
            if !cached.iter().any(|entry| entry.marker.key() == key) {
                let known: Vec<String> = cached.iter().map(|e| e.marker.url.clone()).collect();
                return Err(suggestions::cache_key_not_found(&url, &known).into());
            }
            fetcher
                .refresh(&key)
                .with_context(|| format!("Failed to refresh {}", url))?;
            vec![key]
        }
        None => fetcher.refresh_all().context("Failed to refresh the cache")?,
    };

    println!(
        "{} Refreshed {} checkouts",
        emoji(output, "🔄", "[refresh]"),
        refreshed.len()
    );
    Ok(())
}

fn execute_clean(fetcher: &SourceFetcher, args: CleanArgs, output: &OutputConfig) -> Result<()> {
    if args.dry_run {
        let entries = fetcher.cache().list()?;
        println!("Would remove {} cached checkouts:", entries.len());
        for entry in &entries {
            println!("  {}", entry.path.display());
        }
        return Ok(());
    }

    let removed = fetcher.cache().clean().context("Failed to clean the cache")?;
    println!(
        "{} Removed {} cached checkouts from {}",
        emoji(output, "🧹", "[clean]"),
        removed,
        fetcher.cache().root().display()
    );
    Ok(())
}

//! Thin wrappers around the system `git` command.
//!
//! Shelling out to `git` picks up whatever authentication the user already
//! has: SSH keys and agents, credential helpers, tokens in `~/.gitconfig`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::path::encode_url_path;

/// Run `git <args>` in `dir`, returning stdout on success
fn run_git(dir: &Path, url: &str, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), dir.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            url: url.to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            url: url.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Map a failed `git fetch` onto the fetch error taxonomy
fn classify_fetch_error(url: &str, ref_name: &str, stderr: &str) -> Error {
    if stderr.contains("couldn't find remote ref")
        || stderr.contains("not our ref")
        || stderr.contains("unadvertised object")
    {
        return Error::RefNotFound {
            url: url.to_string(),
            r#ref: ref_name.to_string(),
        };
    }

    let hint = if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        Some(
            "make sure you have access to the repository: add your SSH key to ssh-agent, \
             or configure git credentials for https"
                .to_string(),
        )
    } else {
        None
    };

    Error::Fetch {
        url: url.to_string(),
        r#ref: ref_name.to_string(),
        message: stderr.to_string(),
        hint,
    }
}

/// Read the remote's default branch from `git remote show origin`
pub fn default_branch(repo_dir: &Path, url: &str) -> Result<String> {
    let stdout = run_git(repo_dir, url, &["remote", "show", "origin"]).map_err(|e| match e {
        Error::GitCommand { stderr, .. } => classify_fetch_error(url, "HEAD", &stderr),
        other => other,
    })?;
    parse_head_branch(&stdout).ok_or_else(|| Error::Fetch {
        url: url.to_string(),
        r#ref: "HEAD".to_string(),
        message: "could not determine the default branch".to_string(),
        hint: Some("pin the reference to a branch or tag with @ref".to_string()),
    })
}

/// Pull the branch name out of the `HEAD branch: <name>` line
pub fn parse_head_branch(remote_show: &str) -> Option<String> {
    remote_show.lines().find_map(|line| {
        line.trim()
            .strip_prefix("HEAD branch:")
            .map(str::trim)
            .filter(|branch| !branch.is_empty() && *branch != "(unknown)")
            .map(str::to_string)
    })
}

/// Fetch `ref_name` into an existing repository at depth 1
fn fetch_ref(repo_dir: &Path, url: &str, ref_name: &str) -> Result<()> {
    run_git(repo_dir, url, &["fetch", "--depth=1", "origin", ref_name])
        .map(|_| ())
        .map_err(|e| match e {
            Error::GitCommand { stderr, .. } => classify_fetch_error(url, ref_name, &stderr),
            other => other,
        })
}

/// Shallow checkout of `url` at `ref_name` into `target_dir`.
///
/// With no ref the remote's default branch is used. Returns the ref that was
/// checked out.
pub fn checkout_shallow(url: &str, ref_name: Option<&str>, target_dir: &Path) -> Result<String> {
    if target_dir.exists() {
        fs::remove_dir_all(target_dir)?;
    }
    fs::create_dir_all(target_dir)?;

    run_git(target_dir, url, &["init", "--quiet"])?;
    run_git(target_dir, url, &["remote", "add", "origin", url])?;

    let ref_name = match ref_name {
        Some(r) => r.to_string(),
        None => default_branch(target_dir, url)?,
    };

    fetch_ref(target_dir, url, &ref_name)?;
    run_git(target_dir, url, &["checkout", "--quiet", "--detach", "FETCH_HEAD"])?;

    Ok(ref_name)
}

/// Bring an existing checkout up to date with the remote ref
pub fn update_checkout(url: &str, ref_name: &str, repo_dir: &Path) -> Result<()> {
    fetch_ref(repo_dir, url, ref_name)?;
    run_git(repo_dir, url, &["reset", "--quiet", "--hard", "FETCH_HEAD"])?;
    Ok(())
}

/// Stable cache slot for a (url, ref) pair.
///
/// The directory name keeps a readable prefix from the repository name and ref
/// and is made unique by a SHA-256 digest of both.
pub fn url_to_cache_path(cache_root: &Path, url: &str, ref_name: Option<&str>) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0u8]);
    hasher.update(ref_name.unwrap_or("").as_bytes());
    let digest = hex::encode(hasher.finalize());

    let repo_name = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', ':'])
        .next()
        .unwrap_or("repo");
    let label = format!("{}-{}", repo_name, ref_name.unwrap_or("HEAD"));

    cache_root.join(format!("{}-{}", encode_url_path(&label), &digest[..16]))
}

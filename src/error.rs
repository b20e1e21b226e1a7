//! # Error Handling
//!
//! This module defines the centralized error type for `d0s`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! mode of manifest resolution, from fetching a remote base manifest to
//! rendering a compose template.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries the manifest source, app
//!   name and field (where they apply) so a message is actionable without
//!   re-running in a debug mode.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Errors that are independent of each other (name collisions, parse errors in
//! separate apps of one manifest, failures of sibling apps) are gathered into
//! `Error::Multiple` so they can be reported together.

use thiserror::Error;

/// Main error type for d0s operations
#[derive(Error, Debug)]
pub enum Error {
    /// A local file or directory referenced by a manifest does not exist.
    #[error("Not found: {path} ({context})")]
    NotFound { path: String, context: String },

    /// A remote source could not be fetched.
    #[error("Fetch error for {url}@{r#ref}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Fetch {
        url: String,
        r#ref: String,
        message: String,
        /// Optional hint for how to resolve the fetch issue
        hint: Option<String>,
    },

    /// The requested ref does not exist in the remote repository.
    #[error("Ref not found: {url}@{r#ref}")]
    RefNotFound { url: String, r#ref: String },

    /// A git command failed for a reason other than a missing ref.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// A command run on a deployment host exited non-zero.
    #[error("Command failed on {host} (exit {status}): {command} - {stderr}")]
    RemoteCommand {
        host: String,
        command: String,
        status: i32,
        stderr: String,
    },

    /// Two raw app names normalise to the same canonical name.
    #[error("Duplicate app name in {manifest}: {first} and {second} both normalise to {canonical}")]
    DuplicateName {
        manifest: String,
        canonical: String,
        first: String,
        second: String,
    },

    /// A name could not be normalised.
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// An app declares a `type` tag that is not a known app kind.
    #[error("Unknown app type {type_name:?} for app {app} in {manifest} (expected App, RepoApp or MountedApp)")]
    UnknownAppType {
        manifest: String,
        app: String,
        type_name: String,
    },

    /// The manifest document is structurally invalid.
    #[error("Manifest parse error in {manifest}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ManifestParse {
        manifest: String,
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// A field value is not valid for the app it appears in.
    #[error("Invalid field {field} for app {app} in {manifest}: {message}")]
    InvalidField {
        manifest: String,
        app: String,
        field: String,
        message: String,
    },

    /// A manifest reference string could not be parsed.
    #[error("Invalid manifest reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    /// The `extends` target manifest or app could not be found.
    #[error("Cannot resolve extends {reference} for app {app}: {message}")]
    UnresolvedExtends {
        app: String,
        reference: String,
        message: String,
    },

    /// An `extends` chain loops back on itself.
    #[error("Cyclic extends detected: {cycle}")]
    CyclicExtends { cycle: String },

    /// A manifest used as a base defines a host.
    #[error("Base manifest {manifest} (extended by app {app}) cannot define a host")]
    BaseDefinesHost { manifest: String, app: String },

    /// The top-level manifest has no host to deploy to.
    #[error("Manifest {manifest} does not define a host")]
    MissingHost { manifest: String },

    /// A required env file is missing.
    #[error("Env file not found for app {app}: {path}")]
    EnvFileNotFound { app: String, path: String },

    /// An env file exists but could not be parsed.
    #[error("Env file {path} could not be read: {message}")]
    EnvFile { path: String, message: String },

    /// A compose template failed to render.
    #[error("Template render error for app {app} ({path}): {message}")]
    TemplateRender {
        app: String,
        path: String,
        message: String,
    },

    /// User compose_context tried to set a key the renderer owns.
    #[error("compose_context key {key:?} of app {app} is reserved")]
    ReservedContextKey { app: String, key: String },

    /// A fetch cache slot is unusable.
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// An extends chain with no links reached a phase that needs its leaf.
    #[error("Extends chain is empty")]
    EmptyChain,

    /// Resolution was cancelled through a cancellation token.
    #[error("Resolution cancelled")]
    Cancelled,

    /// Several independent errors, reported together.
    #[error("{} errors:\n{}", .0.len(), .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Collapse a list of errors: none is `Ok`, one is itself, more is `Multiple`.
    pub fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }

    /// Whether this error is (or only contains) duplicate name errors.
    pub fn is_duplicate_name(&self) -> bool {
        match self {
            Error::DuplicateName { .. } => true,
            Error::Multiple(errors) => errors.iter().all(Error::is_duplicate_name),
            _ => false,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! # d0s
//!
//! Resolves docker0s deployment manifests into concrete, ready-to-deploy app
//! definitions. A manifest names a host and a set of apps; each app may extend
//! a base app from the same manifest, a local path, or a git repository, and
//! inherits its compose file, assets, environment and template context.
//!
//! ## Quick Example
//!
//! ```
//! use d0s::manifest::Manifest;
//! use d0s::source::ManifestSource;
//!
//! let yaml = br#"
//! host:
//!   name: example.com
//! apps:
//!   Website:
//!     extends: git+https://github.com/radiac/docker0s-manifests.git#traefik
//!     env:
//!       DOMAIN: example.com
//! "#;
//! let source = ManifestSource::local("/srv/d0s-manifest.yml").unwrap();
//! let manifest = Manifest::parse(yaml, source).unwrap();
//! assert_eq!(manifest.len(), 1);
//! assert!(manifest.get("website").is_some());
//! ```
//!
//! ## Core Concepts
//!
//! - **Manifests (`manifest`)**: The YAML document listing a host and its
//!   apps, parsed into typed [`app::AppDefinition`]s.
//! - **References (`source`)**: Where a base app or file lives, either on
//!   disk or inside a git repository at a ref and subpath.
//! - **Fetching (`repository`, `git`, `cache`)**: Shallow git checkouts kept
//!   in a shared on-disk cache, one slot per repository and ref.
//! - **Phases (`phases`)**: The pipeline turning a manifest into a
//!   [`phases::DeploymentPlan`].
//!
//! ## Execution Flow
//!
//! The main entry point is [`phases::orchestrator::assemble`]:
//!
//! 1.  **Discovery**: Follow each app's `extends` chain, loading base
//!     manifests from disk or git.
//! 2.  **Ordering**: Group apps so same-manifest bases resolve first.
//! 3.  **Merge**: Fold each chain into one app: type, compose file, assets,
//!     template context and hooks.
//! 4.  **Environment**: Fold env files and inline env, leaf winning.
//! 5.  **Render**: Render compose templates with every app's context.
//! 6.  **Write**: Stage the plan as files for the host.

pub mod app;
pub mod cache;
pub mod cancel;
pub mod defaults;
pub mod env;
pub mod error;
pub mod filesystem;
pub mod git;
pub mod hooks;
pub mod host;
pub mod manifest;
pub mod names;
pub mod output;
pub mod path;
pub mod phases;
pub mod repository;
pub mod source;
pub mod suggestions;

#[cfg(test)]
mod names_proptest;

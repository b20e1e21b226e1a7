//! Implementation of the phases of manifest resolution.
//!
//! ## Overview
//!
//! Resolving a manifest into a deployment plan follows these phases:
//! 1. Discovery - Walk each app's `extends` chain, loading base manifests
//!    (local or from git checkouts) with per-run memoisation and cycle checks
//! 2. Ordering - Group apps into levels so same-manifest bases come first
//! 3. Merging - Flatten each chain into effective fields, anchoring every path
//!    to the manifest that wrote it
//! 4. Environment - Fold env files and inline env across the whole chain
//! 5. Rendering - Render templated compose files with the cross-app context
//! 6. Writing - Lay the plan out as per-app files, in memory or on disk
//!
//! [`orchestrator::assemble`] runs phases 1-5; writing is left to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::app::{AppDefinition, ComposeContext, ResolvedKind};
use crate::env::EnvMap;
use crate::hooks::HookRegistry;
use crate::host::HostDefinition;
use crate::manifest::Manifest;
use crate::names::CanonicalName;
use crate::source::{ManifestSource, PathOrigin};

pub mod discovery;
pub mod environment;
pub mod merge;
pub mod orchestrator;
pub mod ordering;
pub mod render;
pub mod write;

pub use discovery as phase1;
pub use ordering as phase2;
pub use merge as phase3;
pub use environment as phase4;
pub use render as phase5;
pub use write as phase6;

/// One app definition in an extends chain, with the directories its paths
/// resolve against
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub manifest: Arc<Manifest>,
    pub app: AppDefinition,
    pub origin: PathOrigin,
}

impl ChainLink {
    /// `source::Name` label used in diagnostics
    pub fn label(&self) -> String {
        format!("{}::{}", self.manifest.source, self.app.raw_name)
    }
}

/// Extends chain of one app, root base first and the app itself last
pub type Chain = Arc<Vec<ChainLink>>;

/// Compose file chosen for an app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSource {
    pub source: ManifestSource,
    pub content: String,
    /// Whether `content` must be rendered before use
    pub is_template: bool,
}

/// One asset file and where it lands under the app's assets directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub source: ManifestSource,
    /// POSIX path relative to the assets directory
    pub target: String,
}

/// Where one link of the chain came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub source: ManifestSource,
    pub raw_name: String,
}

impl fmt::Display for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.source, self.raw_name)
    }
}

/// An app after inheritance, environment and template resolution
#[derive(Debug, Clone)]
pub struct ResolvedApp {
    pub name: CanonicalName,
    pub raw_name: String,
    pub kind: ResolvedKind,
    /// Manifest that declared the app
    pub manifest: ManifestSource,
    /// Root base first, the app itself last
    pub chain: Vec<ChainEntry>,
    pub compose: ComposeSource,
    /// Final compose file content, rendered when the source is a template
    pub rendered_compose: String,
    pub assets: Vec<AssetFile>,
    pub env: EnvMap,
    pub compose_context: ComposeContext,
    pub set_project_name: bool,
    /// Manifest that supplied each inherited field
    pub provenance: BTreeMap<&'static str, ManifestSource>,
    pub hooks: HookRegistry,
}

impl ResolvedApp {
    #[cfg(test)]
    pub(crate) fn for_tests(raw_name: &str) -> ResolvedApp {
        let source = ManifestSource::Local(std::path::PathBuf::from("/test/d0s-manifest.yml"));
        ResolvedApp {
            name: crate::names::normalize(raw_name).unwrap(),
            raw_name: raw_name.to_string(),
            kind: ResolvedKind::App,
            manifest: source.clone(),
            chain: vec![ChainEntry {
                source: source.clone(),
                raw_name: raw_name.to_string(),
            }],
            compose: ComposeSource {
                source,
                content: String::new(),
                is_template: false,
            },
            rendered_compose: String::new(),
            assets: Vec::new(),
            env: EnvMap::new(),
            compose_context: ComposeContext::new(),
            set_project_name: false,
            provenance: BTreeMap::new(),
            hooks: HookRegistry::default(),
        }
    }
}

/// Everything needed to deploy one manifest to its host
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub host: HostDefinition,
    /// Apps with same-manifest bases before their dependents
    pub apps: Vec<ResolvedApp>,
}

impl DeploymentPlan {
    pub fn get(&self, name: &str) -> Option<&ResolvedApp> {
        self.apps.iter().find(|app| app.name.as_str() == name)
    }
}

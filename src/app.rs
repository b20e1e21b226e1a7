//! # App Definitions
//!
//! An [`AppDefinition`] is one app exactly as a manifest declared it, before
//! any inheritance is applied. Every field a manifest may leave out is an
//! `Option` here, so the merge phase can tell "not set" apart from "set to
//! the default" and inherit accordingly.
//!
//! Definitions come from either front-end: the YAML parser in
//! [`crate::manifest`] or the builder API below.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::defaults;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::hooks::{Hook, HookPoint, HookRegistry};
use crate::names::{normalize, CanonicalName};
use crate::source::{Reference, RemoteRef};

/// Compose template context as written in a manifest
pub type ComposeContext = BTreeMap<String, Value>;

/// The app kinds a manifest can declare with `type:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppKind {
    /// Self-contained compose file
    App,
    /// Repository cloned onto the host; the compose file is written into it
    Repo {
        repo: Option<RemoteRef>,
        repo_compose: Option<String>,
    },
    /// Repository the containers mount, cloned by the host's own tooling
    Mounted { repo: Option<String> },
}

impl AppKind {
    pub const TYPE_NAMES: &'static [&'static str] = &["App", "RepoApp", "MountedApp"];

    /// Kind for a `type:` tag, with kind fields unset
    pub fn from_type_name(type_name: &str) -> Option<AppKind> {
        match type_name {
            "App" => Some(AppKind::App),
            "RepoApp" => Some(AppKind::Repo {
                repo: None,
                repo_compose: None,
            }),
            "MountedApp" => Some(AppKind::Mounted { repo: None }),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AppKind::App => "App",
            AppKind::Repo { .. } => "RepoApp",
            AppKind::Mounted { .. } => "MountedApp",
        }
    }

    /// Overlay `self` (the child's declaration) onto `base`.
    ///
    /// Matching kinds merge field by field; a different kind replaces the
    /// base outright.
    pub fn overlay(&self, base: &AppKind) -> AppKind {
        match (self, base) {
            (
                AppKind::Repo { repo, repo_compose },
                AppKind::Repo {
                    repo: base_repo,
                    repo_compose: base_compose,
                },
            ) => AppKind::Repo {
                repo: repo.clone().or_else(|| base_repo.clone()),
                repo_compose: repo_compose.clone().or_else(|| base_compose.clone()),
            },
            (AppKind::Mounted { repo }, AppKind::Mounted { repo: base_repo }) => AppKind::Mounted {
                repo: repo.clone().or_else(|| base_repo.clone()),
            },
            (child, _) => child.clone(),
        }
    }
}

/// Fully specified app kind, after inheritance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKind {
    App,
    Repo { repo: RemoteRef, repo_compose: String },
    Mounted { repo: String },
}

impl ResolvedKind {
    /// Check that kind-specific required fields are present
    pub fn from_kind(kind: &AppKind, manifest: &str, app: &str) -> Result<ResolvedKind> {
        let missing = |field: &str| Error::InvalidField {
            manifest: manifest.to_string(),
            app: app.to_string(),
            field: field.to_string(),
            message: format!("{} requires a {}", kind.type_name(), field),
        };
        Ok(match kind {
            AppKind::App => ResolvedKind::App,
            AppKind::Repo { repo, repo_compose } => ResolvedKind::Repo {
                repo: repo.clone().ok_or_else(|| missing("repo"))?,
                repo_compose: repo_compose
                    .clone()
                    .unwrap_or_else(|| defaults::REPO_COMPOSE.to_string()),
            },
            AppKind::Mounted { repo } => ResolvedKind::Mounted {
                repo: repo.clone().ok_or_else(|| missing("repo"))?,
            },
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ResolvedKind::App => "App",
            ResolvedKind::Repo { .. } => "RepoApp",
            ResolvedKind::Mounted { .. } => "MountedApp",
        }
    }
}

/// One entry of an app's `env_file` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFileRef {
    pub path: String,
    /// Missing optional files are skipped instead of failing
    pub optional: bool,
}

impl EnvFileRef {
    pub fn required(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            optional: false,
        }
    }

    pub fn optional(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            optional: true,
        }
    }
}

/// An app as declared by one manifest
#[derive(Clone)]
pub struct AppDefinition {
    /// Name as written
    pub raw_name: String,
    pub name: CanonicalName,
    /// `None` when the manifest gave no `type:`; the base's kind then applies
    pub kind: Option<AppKind>,
    pub extends: Option<Reference>,
    /// App directory, relative to the manifest
    pub path: Option<String>,
    pub compose: Option<String>,
    pub assets: Option<Vec<String>>,
    pub env_files: Vec<EnvFileRef>,
    pub env: EnvMap,
    pub compose_context: ComposeContext,
    pub set_project_name: Option<bool>,
    pub hooks: HookRegistry,
}

impl fmt::Debug for AppDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDefinition")
            .field("raw_name", &self.raw_name)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extends", &self.extends.as_ref().map(|r| r.original.as_str()))
            .field("compose", &self.compose)
            .field("env_files", &self.env_files)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl AppDefinition {
    /// Start building an app in code
    pub fn builder(raw_name: &str) -> AppBuilder {
        AppBuilder::new(raw_name)
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.as_ref().map(AppKind::type_name).unwrap_or("App")
    }
}

/// Builder for code-defined apps.
///
/// ```
/// use d0s::app::AppDefinition;
///
/// let app = AppDefinition::builder("Website")
///     .extends("../base::Website")
///     .env("DOMAIN", "example.com")
///     .context("replicas", 3)
///     .build()
///     .unwrap();
/// assert_eq!(app.name.as_str(), "website");
/// ```
pub struct AppBuilder {
    raw_name: String,
    type_name: Option<String>,
    extends: Option<String>,
    path: Option<String>,
    compose: Option<String>,
    assets: Option<Vec<String>>,
    env_files: Vec<EnvFileRef>,
    env: EnvMap,
    compose_context: ComposeContext,
    set_project_name: Option<bool>,
    repo: Option<String>,
    repo_compose: Option<String>,
    hooks: HookRegistry,
}

impl AppBuilder {
    fn new(raw_name: &str) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            type_name: None,
            extends: None,
            path: None,
            compose: None,
            assets: None,
            env_files: Vec::new(),
            env: EnvMap::new(),
            compose_context: ComposeContext::new(),
            set_project_name: None,
            repo: None,
            repo_compose: None,
            hooks: HookRegistry::default(),
        }
    }

    /// Declare the kind by its manifest tag (`App`, `RepoApp`, `MountedApp`)
    pub fn kind(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn extends(mut self, reference: &str) -> Self {
        self.extends = Some(reference.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn compose(mut self, compose: &str) -> Self {
        self.compose = Some(compose.to_string());
        self
    }

    pub fn asset(mut self, asset: &str) -> Self {
        self.assets.get_or_insert_with(Vec::new).push(asset.to_string());
        self
    }

    pub fn env_file(mut self, path: &str) -> Self {
        self.env_files.push(EnvFileRef::required(path));
        self
    }

    pub fn optional_env_file(mut self, path: &str) -> Self {
        self.env_files.push(EnvFileRef::optional(path));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), Some(value.into()));
        self
    }

    /// Env key passed through without a value
    pub fn env_key(mut self, key: &str) -> Self {
        self.env.insert(key.to_string(), None);
        self
    }

    pub fn context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.compose_context.insert(key.to_string(), value.into());
        self
    }

    pub fn set_project_name(mut self, enabled: bool) -> Self {
        self.set_project_name = Some(enabled);
        self
    }

    pub fn repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.to_string());
        self
    }

    pub fn repo_compose(mut self, path: &str) -> Self {
        self.repo_compose = Some(path.to_string());
        self
    }

    /// Register a hook to run after the kind's default behaviour
    pub fn hook(mut self, point: HookPoint, hook: impl Hook + 'static) -> Self {
        self.hooks.register(point, hook);
        self
    }

    /// Replace the asset list; an empty list clears inherited assets
    pub fn assets(mut self, assets: Vec<String>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn env_file_ref(mut self, env_file: EnvFileRef) -> Self {
        self.env_files.push(env_file);
        self
    }

    pub fn env_entry(mut self, key: &str, value: Option<String>) -> Self {
        self.env.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Result<AppDefinition> {
        self.build_for("<code>")
    }

    /// Build, naming `manifest` in any error
    pub fn build_for(self, manifest: &str) -> Result<AppDefinition> {
        let name = normalize(&self.raw_name)?;
        let field_error = |field: &str, message: String| Error::InvalidField {
            manifest: manifest.to_string(),
            app: self.raw_name.clone(),
            field: field.to_string(),
            message,
        };

        let declared = match self.type_name.as_deref() {
            Some(type_name) => Some(AppKind::from_type_name(type_name).ok_or_else(|| {
                Error::UnknownAppType {
                    manifest: manifest.to_string(),
                    app: self.raw_name.clone(),
                    type_name: type_name.to_string(),
                }
            })?),
            None => None,
        };

        let kind = match (declared, self.repo.as_deref()) {
            (Some(AppKind::Repo { .. }), repo) => Some(AppKind::Repo {
                repo: repo.map(RemoteRef::parse_repo).transpose()?,
                repo_compose: self.repo_compose.clone(),
            }),
            (Some(AppKind::Mounted { .. }), repo) => {
                if self.repo_compose.is_some() {
                    return Err(field_error("repo_compose", "only valid for RepoApp".to_string()));
                }
                Some(AppKind::Mounted {
                    repo: repo.map(str::to_string),
                })
            }
            (other, None) if self.repo_compose.is_none() => other,
            (other, _) => {
                let type_name = other.as_ref().map(AppKind::type_name).unwrap_or("App");
                let field = if self.repo.is_some() { "repo" } else { "repo_compose" };
                return Err(field_error(field, format!("not valid for {}", type_name)));
            }
        };

        let extends = self.extends.as_deref().map(Reference::parse).transpose()?;
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                return Err(field_error("env", format!("invalid variable name {:?}", key)));
            }
        }

        Ok(AppDefinition {
            raw_name: self.raw_name,
            name,
            kind,
            extends,
            path: self.path,
            compose: self.compose,
            assets: self.assets,
            env_files: self.env_files,
            env: self.env,
            compose_context: self.compose_context,
            set_project_name: self.set_project_name,
            hooks: self.hooks,
        })
    }
}

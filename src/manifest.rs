//! # Manifest Parsing
//!
//! A manifest is a YAML document with an `apps` mapping and an optional
//! `host`:
//!
//! ```yaml
//! host:
//!   name: example.com
//!   user: deploy
//! apps:
//!   Website:
//!     extends: git+https://github.com/radiac/docker0s-manifests@main#traefik
//!     env:
//!       DOMAIN: example.com
//! ```
//!
//! Parsing never stops at the first bad app: every app is checked and all
//! independent problems (unknown fields, unknown types, name collisions) are
//! reported together as one [`Error::Multiple`].
//!
//! Code-defined manifests are built with [`Manifest::builder`] and go through
//! the same name checks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::app::{AppDefinition, ComposeContext, EnvFileRef};
use crate::cancel::CancellationToken;
use crate::defaults::{MANIFEST_FILENAMES, UNSUPPORTED_MANIFEST_FILENAMES};
use crate::env::value_from_yaml;
use crate::error::{Error, Result};
use crate::host::HostDefinition;
use crate::names::{normalize, CanonicalName};
use crate::repository::SourceFetcher;
use crate::source::ManifestSource;
use crate::suggestions::did_you_mean;

const ROOT_KEYS: &[&str] = &["apps", "host"];

const APP_FIELDS: &[&str] = &[
    "type",
    "extends",
    "path",
    "compose",
    "assets",
    "env_file",
    "env",
    "compose_context",
    "set_project_name",
    "repo",
    "repo_compose",
];

static UNKNOWN_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"unknown field `(?P<field>[^`]+)`").expect("static unknown field pattern is valid")
});

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvFile {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        optional: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvFiles {
    One(String),
    Many(Vec<RawEnvFile>),
}

/// One entry of `apps:` as written
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawApp {
    #[serde(rename = "type")]
    type_name: Option<String>,
    extends: Option<String>,
    path: Option<String>,
    compose: Option<String>,
    assets: Option<OneOrMany>,
    env_file: Option<RawEnvFiles>,
    env: Option<serde_yaml::Mapping>,
    compose_context: Option<ComposeContext>,
    set_project_name: Option<bool>,
    repo: Option<String>,
    repo_compose: Option<String>,
}

impl RawApp {
    fn into_definition(self, raw_name: &str, manifest: &str) -> Result<AppDefinition> {
        let mut builder = AppDefinition::builder(raw_name);
        if let Some(type_name) = &self.type_name {
            builder = builder.kind(type_name);
        }
        if let Some(extends) = &self.extends {
            builder = builder.extends(extends);
        }
        if let Some(path) = &self.path {
            builder = builder.path(path);
        }
        if let Some(compose) = &self.compose {
            builder = builder.compose(compose);
        }
        match self.assets {
            Some(OneOrMany::One(asset)) => builder = builder.assets(vec![asset]),
            Some(OneOrMany::Many(assets)) => builder = builder.assets(assets),
            None => {}
        }
        let env_files = match self.env_file {
            Some(RawEnvFiles::One(path)) => vec![EnvFileRef::required(path)],
            Some(RawEnvFiles::Many(files)) => files
                .into_iter()
                .map(|file| match file {
                    RawEnvFile::Path(path) => EnvFileRef::required(path),
                    RawEnvFile::Detailed { path, optional } => EnvFileRef { path, optional },
                })
                .collect(),
            None => Vec::new(),
        };
        for env_file in env_files {
            builder = builder.env_file_ref(env_file);
        }
        for (key, value) in self.env.unwrap_or_default() {
            let invalid = |message: String| Error::InvalidField {
                manifest: manifest.to_string(),
                app: raw_name.to_string(),
                field: "env".to_string(),
                message,
            };
            let key = match key {
                serde_yaml::Value::String(key) => key,
                other => return Err(invalid(format!("variable names must be strings, found {:?}", other))),
            };
            let value = value_from_yaml(&value).map_err(|e| invalid(format!("{}: {}", key, e)))?;
            builder = builder.env_entry(&key, value);
        }
        for (key, value) in self.compose_context.unwrap_or_default() {
            builder = builder.context(&key, value);
        }
        if let Some(enabled) = self.set_project_name {
            builder = builder.set_project_name(enabled);
        }
        if let Some(repo) = &self.repo {
            builder = builder.repo(repo);
        }
        if let Some(repo_compose) = &self.repo_compose {
            builder = builder.repo_compose(repo_compose);
        }
        builder.build_for(manifest)
    }
}

/// A parsed manifest
#[derive(Debug)]
pub struct Manifest {
    /// Where the manifest was read from; relative paths in it resolve here
    pub source: ManifestSource,
    pub host: Option<HostDefinition>,
    apps: Vec<AppDefinition>,
    index: HashMap<CanonicalName, usize>,
}

impl Manifest {
    fn empty(source: ManifestSource) -> Self {
        Self {
            source,
            host: None,
            apps: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add an app, recording a name collision instead of replacing
    fn insert(&mut self, app: AppDefinition, errors: &mut Vec<Error>) {
        if let Some(&existing) = self.index.get(&app.name) {
            errors.push(Error::DuplicateName {
                manifest: self.source.to_string(),
                canonical: app.name.to_string(),
                first: self.apps[existing].raw_name.clone(),
                second: app.raw_name,
            });
            return;
        }
        self.index.insert(app.name.clone(), self.apps.len());
        self.apps.push(app);
    }

    /// Parse YAML manifest content read from `source`
    pub fn parse(bytes: &[u8], source: ManifestSource) -> Result<Manifest> {
        let label = source.to_string();
        let parse_error = |message: String, hint: Option<String>| Error::ManifestParse {
            manifest: label.clone(),
            message,
            hint,
        };

        let text = std::str::from_utf8(bytes)
            .map_err(|e| parse_error(format!("manifest is not valid UTF-8: {}", e), None))?;
        let document: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string(), None))?;

        let root = match document {
            serde_yaml::Value::Mapping(root) => root,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => return Err(parse_error("expected a mapping at the top level".to_string(), None)),
        };

        let mut manifest = Manifest::empty(source);
        let mut errors = Vec::new();
        let mut apps = serde_yaml::Mapping::new();

        for (key, value) in root {
            match key.as_str() {
                Some("apps") => match value {
                    serde_yaml::Value::Mapping(mapping) => apps = mapping,
                    serde_yaml::Value::Null => {}
                    _ => errors.push(parse_error("apps must be a mapping of app names".to_string(), None)),
                },
                Some("host") => match serde_yaml::from_value::<HostDefinition>(value) {
                    Ok(host) => manifest.host = Some(host),
                    Err(e) => errors.push(parse_error(format!("host: {}", e), None)),
                },
                Some(other) => errors.push(parse_error(
                    format!("unknown top-level key {:?}", other),
                    did_you_mean(other, ROOT_KEYS),
                )),
                None => errors.push(parse_error(format!("top-level keys must be strings, found {:?}", key), None)),
            }
        }

        for (key, value) in apps {
            let Some(raw_name) = key.as_str() else {
                errors.push(parse_error(format!("app names must be strings, found {:?}", key), None));
                continue;
            };
            let raw_app = match value {
                serde_yaml::Value::Null => Ok(RawApp::default()),
                value => serde_yaml::from_value::<RawApp>(value),
            };
            let raw_app = match raw_app {
                Ok(raw_app) => raw_app,
                Err(e) => {
                    let message = e.to_string();
                    let hint = UNKNOWN_FIELD
                        .captures(&message)
                        .and_then(|caps| did_you_mean(&caps["field"], APP_FIELDS));
                    errors.push(parse_error(format!("app {}: {}", raw_name, message), hint));
                    continue;
                }
            };
            match raw_app.into_definition(raw_name, &label) {
                Ok(app) => manifest.insert(app, &mut errors),
                Err(e) => errors.push(e),
            }
        }

        Error::collect(errors)?;
        debug!("Parsed manifest {} with {} apps", label, manifest.apps.len());
        Ok(manifest)
    }

    /// Start building a manifest in code
    pub fn builder(source: ManifestSource) -> ManifestBuilder {
        ManifestBuilder {
            source,
            host: None,
            apps: Vec::new(),
        }
    }

    /// Look up an app by any spelling of its name
    pub fn get(&self, raw_name: &str) -> Option<&AppDefinition> {
        let name = normalize(raw_name).ok()?;
        self.get_canonical(&name)
    }

    pub fn get_canonical(&self, name: &CanonicalName) -> Option<&AppDefinition> {
        self.index.get(name).map(|&i| &self.apps[i])
    }

    /// Apps in declaration order
    pub fn apps(&self) -> &[AppDefinition] {
        &self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Builder for code-defined manifests
pub struct ManifestBuilder {
    source: ManifestSource,
    host: Option<HostDefinition>,
    apps: Vec<AppDefinition>,
}

impl ManifestBuilder {
    pub fn host(mut self, host: HostDefinition) -> Self {
        self.host = Some(host);
        self
    }

    pub fn app(mut self, app: AppDefinition) -> Self {
        self.apps.push(app);
        self
    }

    /// Finish, reporting every name collision
    pub fn build(self) -> Result<Manifest> {
        let mut manifest = Manifest::empty(self.source);
        manifest.host = self.host;
        let mut errors = Vec::new();
        for app in self.apps {
            manifest.insert(app, &mut errors);
        }
        Error::collect(errors)?;
        Ok(manifest)
    }
}

fn unsupported_format(source: &ManifestSource) -> Error {
    Error::ManifestParse {
        manifest: source.to_string(),
        message: "Python manifests are not supported".to_string(),
        hint: Some("convert the manifest to d0s-manifest.yml".to_string()),
    }
}

fn is_unsupported(name: &str) -> bool {
    UNSUPPORTED_MANIFEST_FILENAMES.contains(&name) || name.ends_with(".py")
}

/// Find the manifest file a source refers to.
///
/// A file is used as-is. A directory is searched for each of
/// [`MANIFEST_FILENAMES`] in order; the first that exists wins.
pub fn locate(
    fetcher: &SourceFetcher,
    source: &ManifestSource,
    cancel: &CancellationToken,
) -> Result<ManifestSource> {
    let path = fetcher.materialize(source, cancel)?;

    if path.is_file() {
        if source.file_name().is_some_and(|name| is_unsupported(&name)) {
            return Err(unsupported_format(source));
        }
        return Ok(source.clone());
    }

    if path.is_dir() {
        for filename in MANIFEST_FILENAMES {
            if path.join(filename).is_file() {
                return source.join(filename);
            }
        }
        if let Some(filename) = UNSUPPORTED_MANIFEST_FILENAMES
            .iter()
            .find(|filename| path.join(filename).is_file())
        {
            return Err(unsupported_format(&source.join(filename)?));
        }
        return Err(Error::NotFound {
            path: source.to_string(),
            context: format!("no manifest found, looked for {}", MANIFEST_FILENAMES.join(", ")),
        });
    }

    Err(Error::NotFound {
        path: source.to_string(),
        context: "manifest does not exist".to_string(),
    })
}

/// Locate, fetch and parse a manifest
pub fn load(
    fetcher: &SourceFetcher,
    source: &ManifestSource,
    cancel: &CancellationToken,
) -> Result<Manifest> {
    let located = locate(fetcher, source, cancel)?;
    debug!("Loading manifest {}", located);
    let bytes = fetcher.fetch(&located, cancel)?;
    Manifest::parse(&bytes, located)
}

/// Parse a local manifest file without a fetcher
pub fn load_file(path: &Path) -> Result<Manifest> {
    let source = ManifestSource::local(path)?;
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound {
            path: path.display().to_string(),
            context: "manifest does not exist".to_string(),
        },
        _ => Error::Io(e),
    })?;
    Manifest::parse(&bytes, source)
}

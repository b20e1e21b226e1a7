//! Phase 1: Discovery
//!
//! This is the first phase of the `d0s` resolution pipeline. It turns each
//! app into its complete `extends` chain: the app itself, its base, the base's
//! base, and so on up to an app that extends nothing.
//!
//! ## Process
//!
//! 1.  **Anchoring**: An app's `extends` reference is anchored to the
//!     directory of the manifest that wrote it (or to its app directory for
//!     `app://` references), so relative references hold however deep the
//!     chain goes and whether the manifest is local or in a git checkout.
//!
//! 2.  **Loading**: The referenced manifest is located, fetched through the
//!     [`SourceFetcher`] and parsed. Each manifest is loaded once per run.
//!     A manifest loaded as a base may not define a host.
//!
//! 3.  **Cycle Detection**: The `(manifest, app)` pairs on the current path
//!     are tracked; meeting one again fails with `CyclicExtends` before any
//!     further recursion.
//!
//! 4.  **Memoisation**: Finished chains are memoised per `(manifest, app)`,
//!     so apps sharing a base walk it once.

use std::sync::Arc;

use log::debug;

use super::{Chain, ChainLink};
use crate::cache::MemoCache;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::manifest::{self, Manifest};
use crate::names::{normalize, CanonicalName};
use crate::repository::SourceFetcher;
use crate::source::{ManifestSource, PathOrigin};

type ChainKey = (ManifestSource, CanonicalName);

/// Resolves extends chains for one run
pub struct Resolver<'a> {
    fetcher: &'a SourceFetcher,
    cancel: &'a CancellationToken,
    /// Manifest being deployed; it is the only one allowed a host
    root: Option<ManifestSource>,
    manifests: MemoCache<ManifestSource, Arc<Manifest>>,
    chains: MemoCache<ChainKey, Chain>,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a SourceFetcher, cancel: &'a CancellationToken) -> Self {
        Self {
            fetcher,
            cancel,
            root: None,
            manifests: MemoCache::new(),
            chains: MemoCache::new(),
        }
    }

    /// Make `manifest` the manifest being deployed
    pub fn with_root(mut self, manifest: &Arc<Manifest>) -> Result<Self> {
        self.root = Some(manifest.source.clone());
        self.manifests
            .get_or_process(manifest.source.clone(), || Ok(manifest.clone()))?;
        Ok(self)
    }

    pub fn fetcher(&self) -> &SourceFetcher {
        self.fetcher
    }

    pub fn cancel(&self) -> &CancellationToken {
        self.cancel
    }

    /// Load a manifest once per run, by the source it was referenced as
    pub fn load(&self, source: &ManifestSource) -> Result<Arc<Manifest>> {
        self.manifests.get_or_process(source.clone(), || {
            let manifest = manifest::load(self.fetcher, source, self.cancel)?;
            Ok(Arc::new(manifest))
        })
    }

    /// Chain for the app `name` of `manifest`, root base first
    pub fn chain(&self, manifest: &Arc<Manifest>, name: &CanonicalName) -> Result<Chain> {
        self.chain_guarded(manifest, name, &mut Vec::new())
    }

    fn chain_guarded(
        &self,
        manifest: &Arc<Manifest>,
        name: &CanonicalName,
        path: &mut Vec<ChainKey>,
    ) -> Result<Chain> {
        self.cancel.check()?;
        let key: ChainKey = (manifest.source.clone(), name.clone());

        if let Some(start) = path.iter().position(|seen| *seen == key) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(&key))
                .map(|(source, name)| format!("{}::{}", source, name))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::CyclicExtends { cycle });
        }

        if let Some(chain) = self.chains.get(&key)? {
            return Ok(chain);
        }

        path.push(key.clone());
        let result = self.build_chain(manifest, name, path);
        path.pop();

        let chain = result?;
        self.chains.get_or_process(key, || Ok(chain))
    }

    fn build_chain(
        &self,
        manifest: &Arc<Manifest>,
        name: &CanonicalName,
        path: &mut Vec<ChainKey>,
    ) -> Result<Chain> {
        let app = manifest.get_canonical(name).ok_or_else(|| Error::NotFound {
            path: format!("{}::{}", manifest.source, name),
            context: "no such app".to_string(),
        })?;
        let origin = PathOrigin::for_app(&manifest.source, app.path.as_deref())?;

        let mut links = match &app.extends {
            None => Vec::new(),
            Some(reference) => {
                let unresolved = |message: String| Error::UnresolvedExtends {
                    app: format!("{}::{}", manifest.source, app.raw_name),
                    reference: reference.original.clone(),
                    message,
                };

                let base_manifest = match reference.anchor(&origin)? {
                    None => manifest.clone(),
                    Some(source) => {
                        debug!("{} extends {}", app.raw_name, source);
                        let base = self.load(&source).map_err(|e| match e {
                            Error::NotFound { path, context } => {
                                unresolved(format!("{}: {}", path, context))
                            }
                            other => other,
                        })?;
                        if base.host.is_some() && self.root.as_ref() != Some(&base.source) {
                            return Err(Error::BaseDefinesHost {
                                manifest: base.source.to_string(),
                                app: app.raw_name.clone(),
                            });
                        }
                        base
                    }
                };

                let base_raw = reference.app.as_deref().unwrap_or(&app.raw_name);
                let base_name = normalize(base_raw)?;
                if base_manifest.get_canonical(&base_name).is_none() {
                    return Err(unresolved(format!(
                        "manifest {} has no app {}",
                        base_manifest.source, base_raw
                    )));
                }

                self.chain_guarded(&base_manifest, &base_name, path)?
                    .as_ref()
                    .clone()
            }
        };

        links.push(ChainLink {
            manifest: manifest.clone(),
            app: app.clone(),
            origin,
        });
        Ok(Arc::new(links))
    }

    /// Number of distinct manifests loaded so far
    pub fn manifests_loaded(&self) -> Result<usize> {
        self.manifests.len()
    }
}

/// Executes Phase 1 of the pipeline for every app of `manifest`.
///
/// Chains are returned in declaration order. Every app is attempted; the
/// errors of all failing apps are reported together.
pub fn execute(resolver: &Resolver<'_>, manifest: &Arc<Manifest>) -> Result<Vec<Chain>> {
    let mut chains = Vec::new();
    let mut errors = Vec::new();
    for app in manifest.apps() {
        match resolver.chain(manifest, &app.name) {
            Ok(chain) => chains.push(chain),
            Err(e) => errors.push(e),
        }
    }
    Error::collect(errors)?;
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::GitOperations;
    use crate::source::{Protocol, RemoteRef};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Mock git operations that copy a fixture directory into each checkout
    struct FixtureGitOperations {
        fixture: PathBuf,
        calls: Arc<Mutex<Vec<String>>>,
    }

    fn copy_tree(from: &Path, to: &Path) {
        fs::create_dir_all(to).unwrap();
        for entry in fs::read_dir(from).unwrap() {
            let entry = entry.unwrap();
            let target = to.join(entry.file_name());
            if entry.path().is_dir() {
                copy_tree(&entry.path(), &target);
            } else {
                fs::copy(entry.path(), target).unwrap();
            }
        }
    }

    impl GitOperations for FixtureGitOperations {
        fn checkout(&self, url: &str, ref_name: Option<&str>, target_dir: &Path) -> Result<String> {
            self.calls.lock().unwrap().push(url.to_string());
            copy_tree(&self.fixture, target_dir);
            fs::create_dir_all(target_dir.join(".git")).unwrap();
            Ok(ref_name.unwrap_or("main").to_string())
        }

        fn update(&self, _url: &str, _ref_name: &str, _repo_dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn names(chain: &Chain) -> Vec<String> {
        chain.iter().map(|link| link.label()).collect()
    }

    fn root_manifest(temp: &TempDir, rel: &str) -> Arc<Manifest> {
        Arc::new(manifest::load_file(&temp.path().join(rel)).unwrap())
    }

    #[test]
    fn test_chain_through_local_bases() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "base/d0s-manifest.yml", "apps:\n  Web:\n    extends: ../core::Server\n");
        write(temp.path(), "core/d0s-manifest.yml", "apps:\n  server: {}\n");
        write(
            temp.path(),
            "leaf/d0s-manifest.yml",
            "host:\n  name: example.com\napps:\n  web:\n    extends: ../base\n",
        );

        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let leaf = root_manifest(&temp, "leaf/d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&leaf).unwrap();

        let chain = resolver.chain(&leaf, &normalize("web").unwrap()).unwrap();
        let labels = names(&chain);
        assert_eq!(labels.len(), 3);
        assert!(labels[0].ends_with("core/d0s-manifest.yml::server"));
        assert!(labels[1].ends_with("base/d0s-manifest.yml::Web"));
        assert!(labels[2].ends_with("leaf/d0s-manifest.yml::web"));
    }

    #[test]
    fn test_same_manifest_extends() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "d0s-manifest.yml",
            "apps:\n  base: {}\n  web:\n    extends: '::Base'\n",
        );
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();

        let chains = execute(&resolver, &manifest).unwrap();
        assert_eq!(chains[0].len(), 1);
        assert_eq!(chains[1].len(), 2);
        assert_eq!(chains[1][0].app.raw_name, "base");
    }

    #[test]
    fn test_cycle_detected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a/d0s-manifest.yml", "apps:\n  web:\n    extends: ../b\n");
        write(temp.path(), "b/d0s-manifest.yml", "apps:\n  web:\n    extends: ../a\n");
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "a/d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();

        let err = resolver.chain(&manifest, &normalize("web").unwrap()).unwrap_err();
        match err {
            Error::CyclicExtends { cycle } => {
                assert_eq!(cycle.matches(" -> ").count(), 2);
                assert!(cycle.contains("a/d0s-manifest.yml::web"));
                assert!(cycle.contains("b/d0s-manifest.yml::web"));
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_extends_is_a_cycle() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "d0s-manifest.yml", "apps:\n  web:\n    extends: '::web'\n");
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();
        assert!(matches!(
            resolver.chain(&manifest, &normalize("web").unwrap()),
            Err(Error::CyclicExtends { .. })
        ));
    }

    #[test]
    fn test_unresolved_extends() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "base/d0s-manifest.yml", "apps:\n  other: {}\n");
        write(
            temp.path(),
            "d0s-manifest.yml",
            "apps:\n  web:\n    extends: base\n  api:\n    extends: missing\n",
        );
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();

        match execute(&resolver, &manifest).unwrap_err() {
            Error::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].to_string().contains("has no app web"));
                assert!(matches!(errors[1], Error::UnresolvedExtends { .. }));
            }
            other => panic!("expected two errors, got {:?}", other),
        }
    }

    #[test]
    fn test_base_with_host_rejected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "base/d0s-manifest.yml", "host:\n  name: a\napps:\n  web: {}\n");
        write(temp.path(), "d0s-manifest.yml", "apps:\n  web:\n    extends: base\n");
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();
        assert!(matches!(
            resolver.chain(&manifest, &normalize("web").unwrap()),
            Err(Error::BaseDefinesHost { .. })
        ));
    }

    #[test]
    fn test_remote_base_relative_extends_stay_in_checkout() {
        let temp = TempDir::new().unwrap();
        let fixture = temp.path().join("fixture");
        write(&fixture, "traefik/d0s-manifest.yml", "apps:\n  proxy:\n    extends: ../common::Base\n");
        write(&fixture, "common/d0s-manifest.yml", "apps:\n  base: {}\n");

        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = SourceFetcher::with_operations(
            Box::new(FixtureGitOperations {
                fixture,
                calls: calls.clone(),
            }),
            temp.path().join("cache"),
        );
        write(
            temp.path(),
            "d0s-manifest.yml",
            "apps:\n  proxy:\n    extends: git+https://github.com/radiac/apps@v1#traefik\n  \
             other:\n    extends: git+https://github.com/radiac/apps@v1#traefik::Proxy\n",
        );
        let cancel = CancellationToken::new();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();

        let chains = execute(&resolver, &manifest).unwrap();
        let base = &chains[0][0].manifest.source;
        assert_eq!(
            base,
            &ManifestSource::Remote(RemoteRef {
                protocol: Protocol::Https,
                repo: "https://github.com/radiac/apps".to_string(),
                r#ref: Some("v1".to_string()),
                path: Some("common/d0s-manifest.yml".to_string()),
            })
        );
        assert_eq!(chains[1].len(), 3);
        assert_eq!(calls.lock().unwrap().len(), 1);
        // root, traefik, common
        assert_eq!(resolver.manifests_loaded().unwrap(), 3);
    }

    #[test]
    fn test_cancelled_resolution() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "d0s-manifest.yml", "apps:\n  web: {}\n");
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let manifest = root_manifest(&temp, "d0s-manifest.yml");
        let resolver = Resolver::new(&fetcher, &cancel).with_root(&manifest).unwrap();
        assert!(matches!(
            resolver.chain(&manifest, &normalize("web").unwrap()),
            Err(Error::Cancelled)
        ));
    }
}

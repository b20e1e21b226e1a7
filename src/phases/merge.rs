//! Phase 3: Merging
//!
//! Flattens an extends chain into one app. Walking from the root base to the
//! app itself, each field takes the value of the last link that set it:
//!
//! - `type` and kind fields: a link declaring the same kind fills in only the
//!   kind fields it sets; a different kind replaces the base's.
//! - `compose`, `assets`, `set_project_name`: replaced outright.
//! - `compose_context`: merged key by key, recursing into nested mappings,
//!   so a child overrides only the keys it names.
//! - hooks: concatenated, root base first.
//!
//! Every path is resolved against the link that wrote it, never against the
//! app at the end of the chain. Environment is left to phase 4, which needs
//! the whole chain rather than the merged result.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use serde_json::Value;
use walkdir::WalkDir;

use super::{AssetFile, ChainEntry, ChainLink, ComposeSource, ResolvedApp};
use crate::app::{AppKind, ComposeContext, ResolvedKind};
use crate::cancel::CancellationToken;
use crate::defaults::{COMPOSE_FILENAMES, TEMPLATE_EXTENSIONS};
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::repository::SourceFetcher;
use crate::source::{ManifestSource, PathOrigin};

/// Merge `child` into `base` key by key; nested mappings merge recursively
pub fn merge_context(base: &mut ComposeContext, child: &ComposeContext) {
    for (key, value) in child {
        match (base.get_mut(key), value) {
            (Some(Value::Object(base_map)), Value::Object(child_map)) => {
                merge_json_object(base_map, child_map)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_json_object(base: &mut serde_json::Map<String, Value>, child: &serde_json::Map<String, Value>) {
    for (key, value) in child {
        match (base.get_mut(key), value) {
            (Some(Value::Object(base_map)), Value::Object(child_map)) => {
                merge_json_object(base_map, child_map)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Whether a compose file name marks a template
pub fn is_template(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn posix_relative(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn read_text(fetcher: &SourceFetcher, source: &ManifestSource, cancel: &CancellationToken) -> Result<String> {
    let bytes = fetcher.fetch(source, cancel)?;
    String::from_utf8(bytes).map_err(|_| Error::NotFound {
        path: source.to_string(),
        context: "file is not valid UTF-8 text".to_string(),
    })
}

/// Pick the compose file: the nearest explicit `compose`, else the first
/// default filename found in an app directory, nearest link first
fn find_compose(
    leaf: &ChainLink,
    chain: &[ChainLink],
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<(ManifestSource, ManifestSource)> {
    if let Some(link) = chain.iter().rev().find(|link| link.app.compose.is_some()) {
        let raw = link.app.compose.as_deref().unwrap_or_default();
        return Ok((link.origin.resolve(raw)?, link.manifest.source.clone()));
    }

    for link in chain.iter().rev() {
        for filename in COMPOSE_FILENAMES {
            let candidate = link.origin.app_dir.join(filename)?;
            if fetcher.materialize(&candidate, cancel)?.is_file() {
                return Ok((candidate, link.manifest.source.clone()));
            }
        }
    }

    Err(Error::NotFound {
        path: leaf.origin.app_dir.to_string(),
        context: format!(
            "no compose file for app {}, looked for {}",
            leaf.app.raw_name,
            COMPOSE_FILENAMES.join(", ")
        ),
    })
}

/// Expand one `assets` entry: a file, a directory (recursively), or a glob
fn expand_asset(
    origin: &PathOrigin,
    raw: &str,
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<Vec<AssetFile>> {
    let mut files = Vec::new();

    if is_glob(raw) {
        // Everything up to the first component with a wildcard is the base
        let (base_raw, pattern) = match raw.split('/').position(is_glob) {
            Some(0) | None => (".".to_string(), raw.to_string()),
            Some(n) => {
                let parts: Vec<&str> = raw.split('/').collect();
                (parts[..n].join("/"), parts[n..].join("/"))
            }
        };
        let base = origin.resolve(&base_raw)?;
        let base_path = fetcher.materialize(&base, cancel)?;
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&base_path.to_string_lossy()),
            pattern
        );
        for entry in glob::glob(&full)? {
            let path = entry.map_err(|e| Error::Io(e.into()))?;
            if !path.is_file() {
                continue;
            }
            if let Some(relative) = posix_relative(&path, &base_path) {
                files.push(AssetFile {
                    source: base.join(&relative)?,
                    target: relative,
                });
            }
        }
        return Ok(files);
    }

    let source = origin.resolve(raw)?;
    let path = fetcher.materialize(&source, cancel)?;
    let name = source.file_name().unwrap_or_default();

    if path.is_file() {
        files.push(AssetFile { source, target: name });
    } else if path.is_dir() {
        for entry in WalkDir::new(&path).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(relative) = posix_relative(entry.path(), &path) {
                files.push(AssetFile {
                    source: source.join(&relative)?,
                    target: format!("{}/{}", name, relative),
                });
            }
        }
    } else {
        return Err(Error::NotFound {
            path: source.to_string(),
            context: "asset does not exist".to_string(),
        });
    }
    Ok(files)
}

/// Executes Phase 3: merge an extends chain into a resolved app.
///
/// The result has an empty environment and unrendered compose content; the
/// later phases fill those in.
pub fn execute(
    chain: &[ChainLink],
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<ResolvedApp> {
    let leaf = chain.last().ok_or(Error::EmptyChain)?;
    let mut provenance: BTreeMap<&'static str, ManifestSource> = BTreeMap::new();

    let mut kind: Option<AppKind> = None;
    let mut context = ComposeContext::new();
    let mut hooks = HookRegistry::default();
    let mut set_project_name = None;
    for link in chain {
        let app = &link.app;
        if let Some(declared) = &app.kind {
            kind = Some(match &kind {
                Some(base) => declared.overlay(base),
                None => declared.clone(),
            });
            provenance.insert("type", link.manifest.source.clone());
        }
        if !app.compose_context.is_empty() {
            merge_context(&mut context, &app.compose_context);
            provenance.insert("compose_context", link.manifest.source.clone());
        }
        if app.set_project_name.is_some() {
            set_project_name = app.set_project_name;
            provenance.insert("set_project_name", link.manifest.source.clone());
        }
        hooks.extend(&app.hooks);
    }
    let kind = ResolvedKind::from_kind(
        &kind.unwrap_or(AppKind::App),
        &leaf.manifest.source.to_string(),
        &leaf.app.raw_name,
    )?;

    let (compose_source, compose_from) = find_compose(leaf, chain, fetcher, cancel)?;
    provenance.insert("compose", compose_from);
    let content = read_text(fetcher, &compose_source, cancel)?;
    let compose = ComposeSource {
        is_template: compose_source.file_name().is_some_and(|name| is_template(&name)),
        source: compose_source,
        content,
    };

    let mut assets = Vec::new();
    if let Some(link) = chain.iter().rev().find(|link| link.app.assets.is_some()) {
        for raw in link.app.assets.iter().flatten() {
            assets.extend(expand_asset(&link.origin, raw, fetcher, cancel)?);
        }
        provenance.insert("assets", link.manifest.source.clone());
    }

    debug!(
        "Merged {} from {} links ({} assets)",
        leaf.app.raw_name,
        chain.len(),
        assets.len()
    );

    Ok(ResolvedApp {
        name: leaf.app.name.clone(),
        raw_name: leaf.app.raw_name.clone(),
        kind,
        manifest: leaf.manifest.source.clone(),
        chain: chain
            .iter()
            .map(|link| ChainEntry {
                source: link.manifest.source.clone(),
                raw_name: link.app.raw_name.clone(),
            })
            .collect(),
        rendered_compose: compose.content.clone(),
        compose,
        assets,
        env: EnvMap::new(),
        compose_context: context,
        set_project_name: set_project_name.unwrap_or(false),
        provenance,
        hooks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{hook_fn, HookPoint};
    use crate::manifest::Manifest;
    use crate::app::AppDefinition;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(value: Value) -> ComposeContext {
        serde_json::from_value(value).unwrap()
    }

    fn link(dir: &Path, app: AppDefinition) -> ChainLink {
        let source = ManifestSource::local(dir.join("d0s-manifest.yml")).unwrap();
        let manifest = Arc::new(Manifest::builder(source.clone()).app(app.clone()).build().unwrap());
        ChainLink {
            origin: PathOrigin::for_app(&source, app.path.as_deref()).unwrap(),
            manifest,
            app,
        }
    }

    fn setup() -> (TempDir, SourceFetcher, CancellationToken) {
        let temp = TempDir::new().unwrap();
        let fetcher = SourceFetcher::new(temp.path().join("cache"));
        (temp, fetcher, CancellationToken::new())
    }

    #[test]
    fn test_context_merge_is_per_key() {
        let mut base = context(json!({"x": 1, "y": 2}));
        merge_context(&mut base, &context(json!({"y": 9, "z": 3})));
        assert_eq!(base, context(json!({"x": 1, "y": 9, "z": 3})));
    }

    #[test]
    fn test_context_merge_recurses() {
        let mut base = context(json!({"labels": {"a": 1, "b": {"c": 2, "d": 3}}, "list": [1, 2]}));
        merge_context(
            &mut base,
            &context(json!({"labels": {"b": {"d": 4}}, "list": [3]})),
        );
        assert_eq!(
            base,
            context(json!({"labels": {"a": 1, "b": {"c": 2, "d": 4}}, "list": [3]}))
        );
    }

    #[test]
    fn test_is_template() {
        assert!(is_template("docker-compose.jinja2"));
        assert!(is_template("docker-compose.j2"));
        assert!(is_template("compose.tera"));
        assert!(!is_template("docker-compose.yml"));
    }

    #[test]
    fn test_compose_resolves_against_writing_manifest() {
        let (temp, fetcher, cancel) = setup();
        let base_dir = temp.path().join("base");
        let leaf_dir = temp.path().join("leaf");
        fs::create_dir_all(&base_dir).unwrap();
        fs::create_dir_all(&leaf_dir).unwrap();
        fs::write(base_dir.join("compose.jinja2"), "replicas: {{ replicas }}\n").unwrap();

        let chain = vec![
            link(
                &base_dir,
                AppDefinition::builder("api")
                    .compose("compose.jinja2")
                    .context("replicas", 1)
                    .build()
                    .unwrap(),
            ),
            link(
                &leaf_dir,
                AppDefinition::builder("api").context("replicas", 3).build().unwrap(),
            ),
        ];
        let app = execute(&chain, &fetcher, &cancel).unwrap();
        assert_eq!(
            app.compose.source,
            ManifestSource::local(base_dir.join("compose.jinja2")).unwrap()
        );
        assert!(app.compose.is_template);
        assert_eq!(app.compose_context["replicas"], json!(3));
        assert_eq!(app.chain.len(), 2);
        assert_eq!(
            app.provenance["compose"],
            ManifestSource::local(base_dir.join("d0s-manifest.yml")).unwrap()
        );
    }

    #[test]
    fn test_default_compose_search() {
        let (temp, fetcher, cancel) = setup();
        fs::write(temp.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        fs::write(temp.path().join("docker-compose.yaml"), "ignored\n").unwrap();
        let chain = vec![link(temp.path(), AppDefinition::builder("web").build().unwrap())];
        let app = execute(&chain, &fetcher, &cancel).unwrap();
        assert_eq!(app.compose.content, "services: {}\n");
        assert!(!app.compose.is_template);
        assert_eq!(app.rendered_compose, app.compose.content);
    }

    #[test]
    fn test_missing_compose() {
        let (temp, fetcher, cancel) = setup();
        let chain = vec![link(temp.path(), AppDefinition::builder("web").build().unwrap())];
        let err = execute(&chain, &fetcher, &cancel).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(err.to_string().contains("no compose file for app web"));
    }

    #[test]
    fn test_assets_expand() {
        let (temp, fetcher, cancel) = setup();
        let root = temp.path();
        fs::write(root.join("docker-compose.yml"), "").unwrap();
        fs::create_dir_all(root.join("web/static/css")).unwrap();
        fs::write(root.join("web/static/css/site.css"), "").unwrap();
        fs::write(root.join("web/static/index.html"), "").unwrap();
        fs::write(root.join("web/nginx.conf"), "").unwrap();
        fs::create_dir_all(root.join("web/conf.d")).unwrap();
        fs::write(root.join("web/conf.d/a.conf"), "").unwrap();
        fs::write(root.join("web/conf.d/b.txt"), "").unwrap();

        let chain = vec![link(
            root,
            AppDefinition::builder("web")
                .path("web")
                .compose("docker-compose.yml")
                .asset("app://static")
                .asset("app://nginx.conf")
                .asset("web/conf.d/*.conf")
                .build()
                .unwrap(),
        )];
        let app = execute(&chain, &fetcher, &cancel).unwrap();
        let targets: Vec<&str> = app.assets.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["static/css/site.css", "static/index.html", "nginx.conf", "a.conf"]
        );
        assert_eq!(
            app.assets[3].source,
            ManifestSource::local(root.join("web/conf.d/a.conf")).unwrap()
        );
    }

    #[test]
    fn test_asset_glob_under_bracketed_dir() {
        let (temp, fetcher, cancel) = setup();
        let root = temp.path().join("site[1]");
        fs::create_dir_all(root.join("conf.d")).unwrap();
        fs::write(root.join("docker-compose.yml"), "").unwrap();
        fs::write(root.join("conf.d/a.conf"), "").unwrap();
        // `site[1]` read as a pattern would match this directory instead
        fs::create_dir_all(temp.path().join("site1/conf.d")).unwrap();
        fs::write(temp.path().join("site1/conf.d/decoy.conf"), "").unwrap();

        let chain = vec![link(
            &root,
            AppDefinition::builder("web").asset("conf.d/*.conf").build().unwrap(),
        )];
        let app = execute(&chain, &fetcher, &cancel).unwrap();
        let targets: Vec<&str> = app.assets.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, vec!["a.conf"]);
        assert_eq!(
            app.assets[0].source,
            ManifestSource::local(root.join("conf.d/a.conf")).unwrap()
        );
    }

    #[test]
    fn test_empty_chain() {
        let (_temp, fetcher, cancel) = setup();
        assert!(matches!(
            execute(&[], &fetcher, &cancel),
            Err(Error::EmptyChain)
        ));
    }

    #[test]
    fn test_missing_asset() {
        let (temp, fetcher, cancel) = setup();
        fs::write(temp.path().join("docker-compose.yml"), "").unwrap();
        let chain = vec![link(
            temp.path(),
            AppDefinition::builder("web").asset("nope").build().unwrap(),
        )];
        assert!(matches!(
            execute(&chain, &fetcher, &cancel),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_kind_and_hooks_inherit() {
        let (temp, fetcher, cancel) = setup();
        fs::write(temp.path().join("docker-compose.yml"), "").unwrap();
        let chain = vec![
            link(
                temp.path(),
                AppDefinition::builder("site")
                    .kind("RepoApp")
                    .repo("git+https://github.com/radiac/site@main")
                    .hook(HookPoint::BeforeDeploy, hook_fn(|_| Ok(())))
                    .build()
                    .unwrap(),
            ),
            link(
                temp.path(),
                AppDefinition::builder("site")
                    .kind("RepoApp")
                    .repo_compose("deploy/compose.yml")
                    .hook(HookPoint::AfterDeploy, hook_fn(|_| Ok(())))
                    .build()
                    .unwrap(),
            ),
        ];
        let app = execute(&chain, &fetcher, &cancel).unwrap();
        match &app.kind {
            ResolvedKind::Repo { repo, repo_compose } => {
                assert_eq!(repo.r#ref.as_deref(), Some("main"));
                assert_eq!(repo_compose, "deploy/compose.yml");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(app.hooks.len(), 2);
        assert_eq!(app.hooks.for_point(HookPoint::BeforeDeploy).count(), 1);
    }

    #[test]
    fn test_set_project_name_default() {
        let (temp, fetcher, cancel) = setup();
        fs::write(temp.path().join("docker-compose.yml"), "").unwrap();
        let chain = vec![
            link(temp.path(), AppDefinition::builder("web").set_project_name(true).build().unwrap()),
            link(temp.path(), AppDefinition::builder("web").build().unwrap()),
        ];
        assert!(execute(&chain, &fetcher, &cancel).unwrap().set_project_name);
    }
}

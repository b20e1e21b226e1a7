//! # Manifest Sources and References
//!
//! A [`ManifestSource`] says where a manifest (or any file a manifest names)
//! lives: on the local filesystem, or inside a git repository pinned to a ref.
//! A [`Reference`] is the parsed form of a reference string as written in a
//! manifest, before it has been anchored to the manifest that contains it.
//!
//! ## Reference syntax
//!
//! ```text
//! path/to/manifest-or-dir[::AppName]
//! ::AppName                                          (same manifest)
//! git+ssh://git@host:owner/repo[@ref][#subpath][::AppName]
//! git+https://host/owner/repo[@ref][#subpath][::AppName]
//! ```
//!
//! Relative paths are anchored to the directory of the manifest that wrote
//! them. When that manifest came from a git checkout the anchored path stays a
//! remote source inside the same repository and ref, so anchoring holds through
//! any depth of `extends`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::defaults::APP_PATH_PREFIX;
use crate::error::{Error, Result};
use crate::path::{join_within, normalize_path, posix_parent};

static GIT_SSH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        // repo: git@github.com:username/repo
        r"^git\+ssh://(?P<repo>.+?:.+?)",
        // ref: a tag, branch or commit
        r"(@(?P<ref>.+?))?",
        // path: a file or dir within the repo
        r"(#(?P<path>.+?))?",
        // name: the name of the app in the manifest
        r"(::(?P<name>.+?))?$",
    ))
    .expect("static ssh pattern is valid")
});

static GIT_HTTPS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^git\+(?P<repo>https://.+?)",
        r"(@(?P<ref>.+?))?",
        r"(#(?P<path>.+?))?",
        r"(::(?P<name>.+?))?$",
    ))
    .expect("static https pattern is valid")
});

/// Transport used to reach a remote repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ssh,
    Https,
}

impl Protocol {
    fn scheme(self) -> &'static str {
        match self {
            Protocol::Ssh => "git+ssh://",
            Protocol::Https => "git+",
        }
    }
}

/// A location inside a remote git repository, pinned to a ref
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef {
    pub protocol: Protocol,
    /// Clone URL as given to `git` (`git@host:owner/repo` or `https://...`)
    pub repo: String,
    /// Branch, tag or commit. `None` means the remote's default branch.
    pub r#ref: Option<String>,
    /// Repository-relative path. `None` means the repository root.
    pub path: Option<String>,
}

impl RemoteRef {
    /// Parse a `git+` repository URL as used by `RepoApp.repo`, which must not
    /// carry a subpath or app name.
    pub fn parse_repo(raw: &str) -> Result<RemoteRef> {
        let reference = Reference::parse(raw)?;
        match reference.target {
            Target::Remote(remote) if remote.path.is_none() && reference.app.is_none() => {
                Ok(remote)
            }
            Target::Remote(_) => Err(Error::InvalidReference {
                reference: raw.to_string(),
                message: "a repository URL cannot have a #path or ::name".to_string(),
            }),
            _ => Err(Error::InvalidReference {
                reference: raw.to_string(),
                message: "expected a git+ssh:// or git+https:// repository URL".to_string(),
            }),
        }
    }

    /// The same repository and ref, at a different repository-relative path
    pub fn with_path(&self, path: Option<String>) -> RemoteRef {
        RemoteRef {
            path: path.filter(|p| !p.is_empty()),
            ..self.clone()
        }
    }

    /// Display label for the ref, `HEAD` when following the default branch
    pub fn ref_label(&self) -> &str {
        self.r#ref.as_deref().unwrap_or("HEAD")
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.protocol.scheme(), self.repo)?;
        if let Some(r) = &self.r#ref {
            write!(f, "@{}", r)?;
        }
        if let Some(p) = &self.path {
            write!(f, "#{}", p)?;
        }
        Ok(())
    }
}

/// Where a manifest or manifest-relative file lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManifestSource {
    /// Absolute, lexically normalised local path
    Local(PathBuf),
    /// Path inside a remote repository checkout
    Remote(RemoteRef),
}

impl ManifestSource {
    /// Build a local source, resolving relative paths against the current
    /// working directory.
    pub fn local<P: AsRef<Path>>(path: P) -> Result<ManifestSource> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(ManifestSource::Local(normalize_path(&absolute)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ManifestSource::Remote(_))
    }

    /// The directory containing this source, for anchoring relative paths
    pub fn dir(&self) -> ManifestSource {
        match self {
            ManifestSource::Local(path) => ManifestSource::Local(
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone()),
            ),
            ManifestSource::Remote(remote) => {
                let parent = remote.path.as_deref().map(posix_parent).map(str::to_string);
                ManifestSource::Remote(remote.with_path(parent))
            }
        }
    }

    /// Resolve `relative` against this source, which is taken to be a
    /// directory. Absolute local paths are returned as-is; remote sources
    /// refuse to leave the repository.
    pub fn join(&self, relative: &str) -> Result<ManifestSource> {
        match self {
            ManifestSource::Local(dir) => {
                let joined = dir.join(relative);
                Ok(ManifestSource::Local(normalize_path(&joined)))
            }
            ManifestSource::Remote(remote) => {
                if Path::new(relative).is_absolute() {
                    return Err(Error::InvalidReference {
                        reference: relative.to_string(),
                        message: format!("absolute path used inside remote manifest {}", remote),
                    });
                }
                let base = remote.path.as_deref().unwrap_or("");
                let joined = join_within(base, relative)?;
                Ok(ManifestSource::Remote(remote.with_path(Some(joined))))
            }
        }
    }

    /// Whether `other` lies at or below this source (same repository and
    /// ref for remote sources)
    pub fn contains(&self, other: &ManifestSource) -> bool {
        match (self, other) {
            (ManifestSource::Local(dir), ManifestSource::Local(path)) => path.starts_with(dir),
            (ManifestSource::Remote(dir), ManifestSource::Remote(path)) => {
                if dir.repo != path.repo || dir.r#ref != path.r#ref {
                    return false;
                }
                match (dir.path.as_deref(), path.path.as_deref()) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(d), Some(p)) => p == d || p.starts_with(&format!("{}/", d)),
                }
            }
            _ => false,
        }
    }

    /// Final path component, used to detect templates and manifest formats
    pub fn file_name(&self) -> Option<String> {
        match self {
            ManifestSource::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            ManifestSource::Remote(remote) => remote
                .path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestSource::Local(path) => write!(f, "{}", path.display()),
            ManifestSource::Remote(remote) => write!(f, "{}", remote),
        }
    }
}

/// What a reference points at, before anchoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `::Name` on its own: another app in the manifest that wrote it
    SameManifest,
    /// Local path, relative to the writing manifest unless absolute
    Path(String),
    /// Remote repository location
    Remote(RemoteRef),
}

/// A parsed reference string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference as written
    pub original: String,
    pub target: Target,
    /// Optional app name selector from the `::Name` suffix
    pub app: Option<String>,
}

impl Reference {
    /// Parse a reference string.
    ///
    /// ```
    /// use d0s::source::{Reference, Target};
    ///
    /// let reference = Reference::parse("git+ssh://git@github.com:radiac/apps@v1#traefik::Proxy").unwrap();
    /// let Target::Remote(remote) = &reference.target else { panic!() };
    /// assert_eq!(remote.repo, "git@github.com:radiac/apps");
    /// assert_eq!(remote.r#ref.as_deref(), Some("v1"));
    /// assert_eq!(remote.path.as_deref(), Some("traefik"));
    /// assert_eq!(reference.app.as_deref(), Some("Proxy"));
    /// ```
    pub fn parse(raw: &str) -> Result<Reference> {
        let invalid = |message: &str| Error::InvalidReference {
            reference: raw.to_string(),
            message: message.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(invalid("reference is empty"));
        }

        if raw.starts_with("git+") {
            let (pattern, protocol) = if raw.starts_with("git+ssh://") {
                (&*GIT_SSH_PATTERN, Protocol::Ssh)
            } else if raw.starts_with("git+https://") {
                (&*GIT_HTTPS_PATTERN, Protocol::Https)
            } else {
                return Err(invalid("unsupported git protocol, use git+ssh:// or git+https://"));
            };

            let captures = pattern
                .captures(raw)
                .ok_or_else(|| invalid("unrecognised git URL format"))?;
            let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
            let repo = group("repo").ok_or_else(|| invalid("missing repository"))?;
            if protocol == Protocol::Https {
                url::Url::parse(&repo)?;
            }

            let path = match group("path") {
                Some(p) => {
                    let joined = join_within("", &p)?;
                    Some(joined).filter(|p| !p.is_empty())
                }
                None => None,
            };

            return Ok(Reference {
                original: raw.to_string(),
                target: Target::Remote(RemoteRef {
                    protocol,
                    repo,
                    r#ref: group("ref"),
                    path,
                }),
                app: group("name"),
            });
        }

        let (path, app) = match raw.rsplit_once("::") {
            Some((path, name)) => {
                if name.is_empty() {
                    return Err(invalid("empty app name after ::"));
                }
                (path, Some(name.to_string()))
            }
            None => (raw, None),
        };

        let target = if path.is_empty() {
            Target::SameManifest
        } else {
            Target::Path(path.to_string())
        };

        Ok(Reference {
            original: raw.to_string(),
            target,
            app,
        })
    }

    /// Anchor this reference to the manifest that wrote it.
    ///
    /// Returns `None` for same-manifest references.
    pub fn anchor(&self, origin: &PathOrigin) -> Result<Option<ManifestSource>> {
        match &self.target {
            Target::SameManifest => Ok(None),
            Target::Path(path) => origin.resolve(path).map(Some),
            Target::Remote(remote) => Ok(Some(ManifestSource::Remote(remote.clone()))),
        }
    }
}

/// Directories a path string written in a manifest is resolved against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathOrigin {
    /// Directory of the manifest containing the path string
    pub manifest_dir: ManifestSource,
    /// App directory, the target of `app://` paths
    pub app_dir: ManifestSource,
}

impl PathOrigin {
    /// Origin for an app defined in `manifest` with an optional `path` field
    pub fn for_app(manifest: &ManifestSource, app_path: Option<&str>) -> Result<PathOrigin> {
        let manifest_dir = manifest.dir();
        let app_dir = match app_path {
            Some(path) if !path.is_empty() => manifest_dir.join(path)?,
            _ => manifest_dir.clone(),
        };
        Ok(PathOrigin {
            manifest_dir,
            app_dir,
        })
    }

    /// Resolve a path string: `app://` paths against the app directory (and
    /// never outside it), anything else against the manifest directory.
    pub fn resolve(&self, raw: &str) -> Result<ManifestSource> {
        match raw.strip_prefix(APP_PATH_PREFIX) {
            Some(relative) => {
                let resolved = self.app_dir.join(relative.trim_start_matches('/'))?;
                if !self.app_dir.contains(&resolved) {
                    return Err(Error::InvalidReference {
                        reference: raw.to_string(),
                        message: format!("app:// path escapes the app directory {}", self.app_dir),
                    });
                }
                Ok(resolved)
            }
            None => self.manifest_dir.join(raw),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSH_URL: &str = "git+ssh://git@github.com:username/repo@branch#path/to/file";
    const HTTPS_URL: &str = "git+https://github.com/username/repo@branch#path/to/file";

    fn remote(reference: &Reference) -> &RemoteRef {
        match &reference.target {
            Target::Remote(remote) => remote,
            other => panic!("expected remote, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ssh() {
        let reference = Reference::parse(SSH_URL).unwrap();
        let r = remote(&reference);
        assert_eq!(r.protocol, Protocol::Ssh);
        assert_eq!(r.repo, "git@github.com:username/repo");
        assert_eq!(r.r#ref.as_deref(), Some("branch"));
        assert_eq!(r.path.as_deref(), Some("path/to/file"));
        assert_eq!(reference.app, None);
    }

    #[test]
    fn test_parse_https() {
        let reference = Reference::parse(HTTPS_URL).unwrap();
        let r = remote(&reference);
        assert_eq!(r.protocol, Protocol::Https);
        assert_eq!(r.repo, "https://github.com/username/repo");
        assert_eq!(r.r#ref.as_deref(), Some("branch"));
        assert_eq!(r.path.as_deref(), Some("path/to/file"));
    }

    #[test]
    fn test_parse_optional_parts() {
        let reference = Reference::parse("git+ssh://git@github.com:username/repo").unwrap();
        let r = remote(&reference);
        assert_eq!(r.repo, "git@github.com:username/repo");
        assert_eq!(r.r#ref, None);
        assert_eq!(r.path, None);

        let reference = Reference::parse("git+https://github.com/username/repo::Web").unwrap();
        let r = remote(&reference);
        assert_eq!(r.repo, "https://github.com/username/repo");
        assert_eq!(r.r#ref, None);
        assert_eq!(reference.app.as_deref(), Some("Web"));

        let reference =
            Reference::parse("git+https://github.com/username/repo#apps/web::Web").unwrap();
        let r = remote(&reference);
        assert_eq!(r.r#ref, None);
        assert_eq!(r.path.as_deref(), Some("apps/web"));
        assert_eq!(reference.app.as_deref(), Some("Web"));
    }

    #[test]
    fn test_parse_all_parts() {
        let reference =
            Reference::parse("git+ssh://git@github.com:username/repo@v1.2#apps/web/d0s-manifest.yml::Website")
                .unwrap();
        let r = remote(&reference);
        assert_eq!(r.repo, "git@github.com:username/repo");
        assert_eq!(r.r#ref.as_deref(), Some("v1.2"));
        assert_eq!(r.path.as_deref(), Some("apps/web/d0s-manifest.yml"));
        assert_eq!(reference.app.as_deref(), Some("Website"));
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(Reference::parse("git+ftp://example.com/repo").is_err());
        assert!(Reference::parse("git+ssh://no-colon-here").is_err());
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("base.yml::").is_err());
        assert!(Reference::parse("git+ssh://git@github.com:user/repo#../../escape").is_err());
    }

    #[test]
    fn test_parse_local() {
        let reference = Reference::parse("../base/d0s-manifest.yml").unwrap();
        assert_eq!(reference.target, Target::Path("../base/d0s-manifest.yml".to_string()));
        assert_eq!(reference.app, None);

        let reference = Reference::parse("app/foo.yml::bar").unwrap();
        assert_eq!(reference.target, Target::Path("app/foo.yml".to_string()));
        assert_eq!(reference.app.as_deref(), Some("bar"));

        let reference = Reference::parse("::other_app").unwrap();
        assert_eq!(reference.target, Target::SameManifest);
        assert_eq!(reference.app.as_deref(), Some("other_app"));
    }

    #[test]
    fn test_anchor_local() {
        let dir = PathOrigin::for_app(&ManifestSource::Local(PathBuf::from("/srv/leaf/d0s-manifest.yml")), None).unwrap();
        let reference = Reference::parse("../base").unwrap();
        assert_eq!(
            reference.anchor(&dir).unwrap(),
            Some(ManifestSource::Local(PathBuf::from("/srv/base")))
        );

        let reference = Reference::parse("/abs/base.yml").unwrap();
        assert_eq!(
            reference.anchor(&dir).unwrap(),
            Some(ManifestSource::Local(PathBuf::from("/abs/base.yml")))
        );

        assert_eq!(Reference::parse("::web").unwrap().anchor(&dir).unwrap(), None);
    }

    #[test]
    fn test_anchor_inside_remote() {
        let manifest = ManifestSource::Remote(RemoteRef {
            protocol: Protocol::Ssh,
            repo: "git@github.com:radiac/apps".to_string(),
            r#ref: Some("main".to_string()),
            path: Some("traefik/d0s-manifest.yml".to_string()),
        });
        let origin = PathOrigin::for_app(&manifest, None).unwrap();
        let dir = manifest.dir();
        let anchored = Reference::parse("../shared/d0s-manifest.yml")
            .unwrap()
            .anchor(&origin)
            .unwrap()
            .unwrap();
        match anchored {
            ManifestSource::Remote(r) => {
                assert_eq!(r.repo, "git@github.com:radiac/apps");
                assert_eq!(r.r#ref.as_deref(), Some("main"));
                assert_eq!(r.path.as_deref(), Some("shared/d0s-manifest.yml"));
            }
            other => panic!("expected remote, got {:?}", other),
        }

        assert!(dir.join("../../escape.env").is_err());
        assert!(dir.join("/etc/passwd").is_err());
    }

    #[test]
    fn test_app_paths() {
        let manifest = ManifestSource::Local(PathBuf::from("/srv/site/d0s-manifest.yml"));
        let origin = PathOrigin::for_app(&manifest, Some("web")).unwrap();
        assert_eq!(
            origin.resolve("app://docker-compose.yml").unwrap(),
            ManifestSource::Local(PathBuf::from("/srv/site/web/docker-compose.yml"))
        );
        assert_eq!(
            origin.resolve("shared.env").unwrap(),
            ManifestSource::Local(PathBuf::from("/srv/site/shared.env"))
        );
        assert!(origin.resolve("app://../escape.env").is_err());

        let origin = PathOrigin::for_app(&manifest, None).unwrap();
        assert_eq!(
            origin.resolve("app://assets").unwrap(),
            ManifestSource::Local(PathBuf::from("/srv/site/assets"))
        );
    }

    #[test]
    fn test_dir_of_top_level_remote_file() {
        let manifest = ManifestSource::Remote(RemoteRef {
            protocol: Protocol::Https,
            repo: "https://github.com/radiac/apps".to_string(),
            r#ref: None,
            path: Some("d0s-manifest.yml".to_string()),
        });
        match manifest.dir() {
            ManifestSource::Remote(r) => assert_eq!(r.path, None),
            other => panic!("expected remote, got {:?}", other),
        }
    }

    #[test]
    fn test_remote_equality_drives_keys() {
        let a = Reference::parse(SSH_URL).unwrap();
        let b = Reference::parse(SSH_URL).unwrap();
        let c = Reference::parse("git+ssh://git@github.com:username/repo@other#path/to/file").unwrap();
        assert_eq!(remote(&a), remote(&b));
        assert_ne!(remote(&a), remote(&c));
    }

    #[test]
    fn test_parse_repo() {
        let repo = RemoteRef::parse_repo("git+ssh://git@github.com:radiac/site@main").unwrap();
        assert_eq!(repo.repo, "git@github.com:radiac/site");
        assert!(RemoteRef::parse_repo("git+ssh://git@github.com:radiac/site#sub").is_err());
        assert!(RemoteRef::parse_repo("git+ssh://git@github.com:radiac/site::App").is_err());
        assert!(RemoteRef::parse_repo("./local").is_err());
    }

    #[test]
    fn test_contains() {
        let dir = ManifestSource::Local(PathBuf::from("/srv/app"));
        assert!(dir.contains(&ManifestSource::Local(PathBuf::from("/srv/app/assets/a.txt"))));
        assert!(!dir.contains(&ManifestSource::Local(PathBuf::from("/srv/other"))));
    }

    #[test]
    fn test_display_round_trips_remote() {
        let reference = Reference::parse(SSH_URL).unwrap();
        assert_eq!(remote(&reference).to_string(), SSH_URL);
        let reference = Reference::parse(HTTPS_URL).unwrap();
        assert_eq!(remote(&reference).to_string(), HTTPS_URL);
    }
}

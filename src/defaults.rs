//! Default values for d0s manifests and the fetch cache.
//!
//! This module provides centralized default values used across the library
//! and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Manifest filenames tried, in order, when a reference names a directory
pub const MANIFEST_FILENAMES: &[&str] = &["d0s-manifest.yml", "d0s-manifest.yaml"];

/// Manifest filenames recognised but not loadable by this tool
pub const UNSUPPORTED_MANIFEST_FILENAMES: &[&str] = &["d0s-manifest.py"];

/// Compose filenames tried, in order, when an app does not set `compose`
pub const COMPOSE_FILENAMES: &[&str] = &[
    "docker-compose.jinja2",
    "docker-compose.j2",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// File extensions that mark a compose file as a template
pub const TEMPLATE_EXTENSIONS: &[&str] = &["jinja2", "j2", "jinja", "tera"];

/// Compose file a `RepoApp` looks for inside its repository
pub const REPO_COMPOSE: &str = "docker-compose.docker0s.yml";

/// Prefix for paths relative to the app directory
pub const APP_PATH_PREFIX: &str = "app://";

pub const HOST_PORT: u16 = 22;
/// `{user}` is substituted with the host's login user
pub const HOST_HOME: &str = "/home/{user}/";
pub const HOST_ROOT_PATH: &str = "apps";
pub const HOST_COMPOSE_COMMAND: &str = "docker-compose";

/// Names of the files each app gets in its host directory
pub const COMPOSE_TARGET: &str = "docker-compose.yml";
pub const ENV_TARGET: &str = "env";
pub const ASSETS_DIR: &str = "assets";
pub const STORE_DIR: &str = "store";
pub const REPO_DIR: &str = "repo";

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/d0s` (XDG Base Directory)
/// - macOS: `~/Library/Caches/d0s`
/// - Windows: `{FOLDERID_LocalAppData}\d0s`
///
/// Falls back to `.d0s-cache` in the current directory if the platform cache
/// directory cannot be determined.
///
/// This can be overridden by the `--cache-root` CLI flag or the `D0S_CACHE`
/// environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("d0s"))
        .unwrap_or_else(|| PathBuf::from(".d0s-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root_returns_path() {
        let cache_root = default_cache_root();
        assert!(cache_root.ends_with("d0s") || cache_root.ends_with(".d0s-cache"));
    }

    #[test]
    fn test_default_cache_root_is_absolute_or_fallback() {
        let cache_root = default_cache_root();
        assert!(
            cache_root.is_absolute() || cache_root.starts_with(".d0s-cache"),
            "Expected absolute path or fallback, got: {:?}",
            cache_root
        );
    }

    #[test]
    fn test_compose_search_prefers_templates() {
        assert_eq!(COMPOSE_FILENAMES[0], "docker-compose.jinja2");
        assert!(COMPOSE_FILENAMES.iter().position(|f| *f == "docker-compose.yml")
            > COMPOSE_FILENAMES.iter().position(|f| *f == "docker-compose.j2"));
    }
}

//! Phase 4: Environment
//!
//! Builds an app's flat environment from its whole extends chain. Sources are
//! applied from the lowest precedence to the highest, later ones overwriting
//! earlier keys:
//!
//! 1. project variables, when `set_project_name` is on
//! 2. for each link, root base first:
//!    - its env files, in the order listed
//!    - its inline `env`
//!
//! So a key from the app's own env file beats the same key from any base's
//! inline `env`, and the app's inline `env` beats everything.

use log::debug;

use super::ChainLink;
use crate::cancel::CancellationToken;
use crate::defaults::{ASSETS_DIR, ENV_TARGET, STORE_DIR};
use crate::env::{read_env_file, EnvMap};
use crate::error::{Error, Result};
use crate::host::{posix_join, HostDefinition};
use crate::names::CanonicalName;
use crate::repository::SourceFetcher;

/// Variables describing where an app lives on the host
pub fn project_vars(name: &CanonicalName, host: &HostDefinition) -> EnvMap {
    let app_path = host.app_path(name);
    let mut env = EnvMap::new();
    env.insert("COMPOSE_PROJECT_NAME".to_string(), Some(name.to_string()));
    env.insert("ENV_FILE".to_string(), Some(posix_join(&app_path, ENV_TARGET)));
    env.insert("ASSETS_PATH".to_string(), Some(posix_join(&app_path, ASSETS_DIR)));
    env.insert("STORE_PATH".to_string(), Some(posix_join(&app_path, STORE_DIR)));
    env
}

/// Executes Phase 4: fold env files and inline env across `chain`
pub fn execute(
    chain: &[ChainLink],
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<EnvMap> {
    let mut env = EnvMap::new();
    let Some(leaf) = chain.last() else {
        return Ok(env);
    };

    for link in chain {
        for env_file in &link.app.env_files {
            let source = link.origin.resolve(&env_file.path)?;
            let path = fetcher.materialize(&source, cancel)?;
            if !path.is_file() {
                if env_file.optional {
                    debug!("Skipping missing optional env file {}", source);
                    continue;
                }
                return Err(Error::EnvFileNotFound {
                    app: format!("{} (declared by {})", leaf.app.raw_name, link.label()),
                    path: source.to_string(),
                });
            }
            for (key, value) in read_env_file(&path)? {
                env.insert(key, value);
            }
        }
        env.extend(link.app.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    Ok(env)
}

/// Put `project` underneath `env`
pub fn with_project_vars(env: EnvMap, project: EnvMap) -> EnvMap {
    let mut merged = project;
    merged.extend(env);
    merged
}

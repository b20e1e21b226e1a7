//! Phase 6: Writing
//!
//! Lays a deployment plan out as files. Each app gets a directory named after
//! its canonical name, relative to the host's app root:
//!
//! ```text
//! <name>/docker-compose.yml        rendered compose (App, MountedApp)
//! <name>/repo/<repo_compose>      rendered compose (RepoApp)
//! <name>/env                      resolved environment
//! <name>/assets/...               asset files
//! <name>/store/                   persistent data, always created
//! ```
//!
//! [`stage`] builds this tree in memory; [`execute`] writes a staged tree
//! below a local directory. Copying it to the host is left to the caller.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::{DeploymentPlan, ResolvedApp};
use crate::app::ResolvedKind;
use crate::cancel::CancellationToken;
use crate::defaults::{ASSETS_DIR, COMPOSE_TARGET, ENV_TARGET, REPO_DIR, STORE_DIR};
use crate::env::dump_env;
use crate::error::Result;
use crate::filesystem::{Entry, File, MemoryFS};
use crate::host::{posix_join, HostDefinition};
use crate::path::join_within;
use crate::repository::SourceFetcher;

/// Compose file path of an app, relative to its app directory
pub fn compose_target(app: &ResolvedApp) -> Result<String> {
    match &app.kind {
        ResolvedKind::Repo { repo_compose, .. } => join_within(REPO_DIR, repo_compose),
        _ => Ok(COMPOSE_TARGET.to_string()),
    }
}

/// Compose command for an app on its host
pub fn compose_command(app: &ResolvedApp, host: &HostDefinition, cmd: &str) -> Result<String> {
    let app_path = host.app_path(&app.name);
    Ok(host.compose_invocation(
        &posix_join(&app_path, &compose_target(app)?),
        &posix_join(&app_path, ENV_TARGET),
        cmd,
    ))
}

/// Stage every file of `plan` in memory
pub fn stage(
    plan: &DeploymentPlan,
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<MemoryFS> {
    let mut staged = MemoryFS::new();
    for app in &plan.apps {
        let dir = app.name.as_str();
        let at = |rel: &str| join_within(dir, rel);

        staged.add_file_string(&at(&compose_target(app)?)?, &app.rendered_compose)?;
        staged.add_file_string(&at(ENV_TARGET)?, &dump_env(&app.env))?;
        staged.add_dir(&at(STORE_DIR)?)?;
        for asset in &app.assets {
            let content = fetcher.fetch(&asset.source, cancel)?;
            staged.add_file(&at(&join_within(ASSETS_DIR, &asset.target)?)?, File::new(content))?;
        }
        debug!("Staged {} ({} assets)", app.name, app.assets.len());
    }
    Ok(staged)
}

/// Executes Phase 6: write a staged tree below `output_path`
pub fn execute(staged: &MemoryFS, output_path: &Path) -> Result<()> {
    for (relative_path, entry) in staged.entries() {
        let full_path = output_path.join(relative_path);
        match entry {
            Entry::Dir => fs::create_dir_all(&full_path)?,
            Entry::File(file) => {
                if let Some(parent) = full_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full_path, &file.content)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&full_path, fs::Permissions::from_mode(file.permissions))?;
                }
            }
        }
    }
    info!("Wrote {} entries to {}", staged.len(), output_path.display());
    Ok(())
}

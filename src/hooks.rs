//! # Lifecycle Hooks
//!
//! Apps can attach behaviour to fixed points of a deployment. For each point
//! the app kind's default body runs first, then every hook registered on the
//! app's extends chain, base manifests first and in registration order within
//! one app.
//!
//! Commands never run here directly: they go through a [`RemoteExecutor`],
//! the boundary to whatever transport reaches the host.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::app::ResolvedKind;
use crate::error::{Error, Result};
use crate::host::{shell_quote, HostDefinition};
use crate::phases::ResolvedApp;

/// Points in a deployment where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeDeploy,
    AfterDeploy,
}

/// Output of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on a host
pub trait RemoteExecutor: Send + Sync {
    fn exec(&self, host: &HostDefinition, command: &str) -> Result<ExecResult>;
}

/// What a hook can see and do
pub struct HookContext<'a> {
    pub app: &'a ResolvedApp,
    pub host: &'a HostDefinition,
    pub executor: &'a dyn RemoteExecutor,
}

impl HookContext<'_> {
    /// Run a command on the host, failing on a non-zero exit
    pub fn exec(&self, command: &str) -> Result<ExecResult> {
        let result = self.executor.exec(self.host, command)?;
        if !result.success() {
            return Err(Error::RemoteCommand {
                host: self.host.to_string(),
                command: command.to_string(),
                status: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

/// Behaviour attached to a hook point
pub trait Hook: Send + Sync {
    fn run(&self, ctx: &HookContext<'_>) -> Result<()>;
}

impl<F> Hook for F
where
    F: Fn(&HookContext<'_>) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &HookContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// Pin a closure's signature so it can be registered as a [`Hook`]
pub fn hook_fn<F>(f: F) -> F
where
    F: Fn(&HookContext<'_>) -> Result<()> + Send + Sync,
{
    f
}

/// Ordered hooks of one app
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<(HookPoint, Arc<dyn Hook>)>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(point, _)| point))
            .finish()
    }
}

impl HookRegistry {
    pub fn register(&mut self, point: HookPoint, hook: impl Hook + 'static) {
        self.hooks.push((point, Arc::new(hook)));
    }

    /// Append another registry's hooks after this one's
    pub fn extend(&mut self, other: &HookRegistry) {
        self.hooks.extend(other.hooks.iter().cloned());
    }

    pub fn for_point(&self, point: HookPoint) -> impl Iterator<Item = &Arc<dyn Hook>> {
        self.hooks
            .iter()
            .filter(move |(p, _)| *p == point)
            .map(|(_, hook)| hook)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Shell script that clones or updates a repository at `path` on the host
pub fn repo_sync_script(url: &str, r#ref: Option<&str>, path: &str) -> String {
    let path = shell_quote(path);
    let fetch_ref = shell_quote(r#ref.unwrap_or("HEAD"));
    format!(
        "if [ ! -d {path}/.git ]; then mkdir -p {path} && git -C {path} init --quiet && git -C {path} remote add origin {url}; fi && \
         git -C {path} fetch --depth=1 origin {fetch_ref} && \
         git -C {path} checkout --quiet --detach FETCH_HEAD",
        path = path,
        url = shell_quote(url),
        fetch_ref = fetch_ref,
    )
}

fn run_default(point: HookPoint, ctx: &HookContext<'_>) -> Result<()> {
    match (&ctx.app.kind, point) {
        (ResolvedKind::Repo { repo, .. }, HookPoint::BeforeDeploy) => {
            let path = crate::host::posix_join(
                &ctx.host.app_path(&ctx.app.name),
                crate::defaults::REPO_DIR,
            );
            info!("Syncing {} into {} on {}", repo, path, ctx.host);
            ctx.exec(&repo_sync_script(&repo.repo, repo.r#ref.as_deref(), &path))?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Run the default body and then the registered hooks for one point
pub fn run_hooks(
    point: HookPoint,
    app: &ResolvedApp,
    host: &HostDefinition,
    executor: &dyn RemoteExecutor,
) -> Result<()> {
    let ctx = HookContext {
        app,
        host,
        executor,
    };
    run_default(point, &ctx)?;
    for hook in app.hooks.for_point(point) {
        debug!("Running {:?} hook for {}", point, app.name);
        hook.run(&ctx)?;
    }
    Ok(())
}

//! Orchestrator for complete manifest resolution
//!
//! This module coordinates the phases to provide a clean API for turning a
//! manifest into a [`DeploymentPlan`].

use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;

use super::{discovery, environment, merge, ordering, render, DeploymentPlan, ResolvedApp};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::manifest::{self, Manifest};
use crate::repository::SourceFetcher;
use crate::source::ManifestSource;

/// Assemble the deployment plan for a manifest (Phases 1-5)
///
/// 1. Check the manifest has a host to deploy to
/// 2. Group apps into levels, same-manifest bases first
/// 3. For each level, resolve its apps in parallel: discover the extends
///    chain, merge it, and fold its environment
/// 4. Render compose templates once every app is known
///
/// Apps within a level do not cancel each other: every failure of a level is
/// reported together, and later levels are not started. Cancelling `cancel`
/// stops work at the next fetch or chain step.
pub fn assemble(
    manifest: Arc<Manifest>,
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<DeploymentPlan> {
    let host = manifest.host.clone().ok_or_else(|| Error::MissingHost {
        manifest: manifest.source.to_string(),
    })?;

    let order = ordering::execute(&manifest)?;
    let resolver = discovery::Resolver::new(fetcher, cancel).with_root(&manifest)?;

    let mut apps: Vec<ResolvedApp> = Vec::with_capacity(order.len());
    for (depth, level) in order.levels.iter().enumerate() {
        cancel.check()?;
        debug!("Resolving level {} ({} apps)", depth, level.len());

        let results: Vec<Result<ResolvedApp>> = level
            .par_iter()
            .map(|name| {
                let chain = resolver.chain(&manifest, name)?;
                let mut app = merge::execute(&chain, fetcher, cancel)?;
                let env = environment::execute(&chain, fetcher, cancel)?;
                app.env = if app.set_project_name {
                    environment::with_project_vars(env, environment::project_vars(&app.name, &host))
                } else {
                    env
                };
                Ok(app)
            })
            .collect();

        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(app) => apps.push(app),
                Err(e) => errors.push(e),
            }
        }
        Error::collect(errors)?;
    }

    cancel.check()?;
    render::execute(&mut apps, &host)?;

    info!(
        "Resolved {} apps from {} for {}",
        apps.len(),
        manifest.source,
        host
    );
    Ok(DeploymentPlan { host, apps })
}

/// Load the manifest at `source` and assemble its plan
pub fn assemble_source(
    source: &ManifestSource,
    fetcher: &SourceFetcher,
    cancel: &CancellationToken,
) -> Result<DeploymentPlan> {
    let manifest = manifest::load(fetcher, source, cancel)?;
    assemble(Arc::new(manifest), fetcher, cancel)
}

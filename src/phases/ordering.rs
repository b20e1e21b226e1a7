//! Phase 2: Ordering
//!
//! Apps of one manifest may extend each other (`extends: ::Base`). This phase
//! groups the manifest's apps into levels so that every such base sits in an
//! earlier level than the apps extending it. Apps within a level share no
//! ancestry inside the manifest and can be resolved in parallel.
//!
//! Bases in other manifests do not take part: discovery resolves those
//! recursively, base before derived.
//!
//! Levels keep declaration order, so the plan is the same on every run.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::names::{normalize, CanonicalName};
use crate::source::{PathOrigin, Target};

/// Apps of one manifest, grouped so bases come before dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOrder {
    pub levels: Vec<Vec<CanonicalName>>,
}

impl ResolutionOrder {
    /// All apps, level by level
    pub fn flatten(&self) -> impl Iterator<Item = &CanonicalName> {
        self.levels.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// The app of `manifest` that `app` extends, if it is in the same manifest
fn local_base(manifest: &Manifest, app: &crate::app::AppDefinition) -> Result<Option<CanonicalName>> {
    let Some(reference) = &app.extends else {
        return Ok(None);
    };
    let same_manifest = match &reference.target {
        Target::SameManifest => true,
        Target::Remote(_) => false,
        Target::Path(_) => {
            let origin = PathOrigin::for_app(&manifest.source, app.path.as_deref())?;
            match reference.anchor(&origin)? {
                Some(anchored) => anchored == manifest.source || anchored == manifest.source.dir(),
                None => true,
            }
        }
    };
    if !same_manifest {
        return Ok(None);
    }
    let name = normalize(reference.app.as_deref().unwrap_or(&app.raw_name))?;
    Ok(manifest.get_canonical(&name).map(|base| base.name.clone()))
}

/// Report the loop reached by following bases from the first unresolved app.
///
/// Apps that only extend into the loop are left out.
fn cycle_error(
    manifest: &Manifest,
    bases: &HashMap<CanonicalName, CanonicalName>,
    done: &HashSet<CanonicalName>,
) -> Error {
    let mut path: Vec<&CanonicalName> = Vec::new();
    let mut current = manifest
        .apps()
        .iter()
        .map(|app| &app.name)
        .find(|name| !done.contains(*name));
    while let Some(name) = current {
        if let Some(pos) = path.iter().position(|seen| *seen == name) {
            path = path.split_off(pos);
            break;
        }
        path.push(name);
        current = bases.get(name);
    }

    let mut names: Vec<&str> = path
        .iter()
        .map(|name| {
            manifest
                .get_canonical(name)
                .map_or(name.as_str(), |app| app.raw_name.as_str())
        })
        .collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    Error::CyclicExtends {
        cycle: format!("{}: {}", manifest.source, names.join(" -> ")),
    }
}

/// Executes Phase 2: group the apps of `manifest` into dependency levels.
///
/// Fails with `CyclicExtends` if same-manifest bases form a loop.
pub fn execute(manifest: &Manifest) -> Result<ResolutionOrder> {
    let mut bases: HashMap<CanonicalName, CanonicalName> = HashMap::new();
    for app in manifest.apps() {
        if let Some(base) = local_base(manifest, app)? {
            bases.insert(app.name.clone(), base);
        }
    }

    let mut done: HashSet<CanonicalName> = HashSet::new();
    let mut levels = Vec::new();
    while done.len() < manifest.len() {
        let level: Vec<CanonicalName> = manifest
            .apps()
            .iter()
            .filter(|app| !done.contains(&app.name))
            .filter(|app| bases.get(&app.name).map_or(true, |base| done.contains(base)))
            .map(|app| app.name.clone())
            .collect();

        if level.is_empty() {
            return Err(cycle_error(manifest, &bases, &done));
        }

        done.extend(level.iter().cloned());
        levels.push(level);
    }

    Ok(ResolutionOrder { levels })
}

//! # Plan Command Implementation
//!
//! Resolves a manifest into its deployment plan. By default a summary of each
//! app is printed; `--json` prints the full plan as JSON and `--output`
//! writes the per-app files the host would receive into a local directory.
//!
//! Nothing is sent to the host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use serde_json::{json, Map, Value};

use super::{explain, fetcher, manifest_source};
use crate::commands::tree::chain_label;
use d0s::cancel::CancellationToken;
use d0s::output::{emoji, OutputConfig};
use d0s::phases::{orchestrator, write, DeploymentPlan, ResolvedApp};

/// Resolve a manifest and show or write its deployment plan
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Manifest file, directory, or git reference.
    #[arg(
        short,
        long,
        value_name = "MANIFEST",
        env = "D0S_MANIFEST",
        default_value = "."
    )]
    pub manifest: String,

    /// Write the staged app directories here instead of printing a summary.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Print the full plan as JSON.
    #[arg(long)]
    pub json: bool,

    /// Bring every cached checkout up to date before resolving.
    #[arg(long)]
    pub refresh: bool,

    /// The root directory for the checkout cache.
    ///
    /// Defaults to the system cache directory (e.g. `~/.cache/d0s` on Linux).
    #[arg(long, value_name = "DIR", env = "D0S_CACHE")]
    pub cache_root: Option<PathBuf>,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, output: &OutputConfig) -> Result<()> {
    let fetcher = fetcher(args.cache_root);
    let cancel = CancellationToken::new();

    if args.refresh {
        let refreshed = fetcher.refresh_all().context("Failed to refresh the cache")?;
        info!("Refreshed {} cached checkouts", refreshed.len());
    }

    let source = manifest_source(&args.manifest)?;
    let plan = orchestrator::assemble_source(&source, &fetcher, &cancel)
        .map_err(|e| explain(e, &source))
        .with_context(|| format!("Failed to resolve {}", source))?;

    if let Some(dir) = &args.output {
        let staged = write::stage(&plan, &fetcher, &cancel)?;
        write::execute(&staged, dir)
            .with_context(|| format!("Failed to write plan to {}", dir.display()))?;
        if !args.json {
            println!(
                "{} Wrote {} apps to {}",
                emoji(output, "✅", "[OK]"),
                plan.apps.len(),
                dir.display()
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan)?)?);
    } else if args.output.is_none() {
        print_summary(&plan, output)?;
    }
    Ok(())
}

fn print_summary(plan: &DeploymentPlan, output: &OutputConfig) -> Result<()> {
    println!("{} {}", emoji(output, "🖥️ ", "[host]"), output.heading(&plan.host.to_string()));
    for app in &plan.apps {
        let kind = format!("({})", app.kind.type_name());
        println!(
            "{} {} {}",
            emoji(output, "📦", "[app]"),
            output.heading(app.name.as_str()),
            output.detail(&kind)
        );
        println!("    path:    {}", plan.host.app_path(&app.name));
        println!("    extends: {}", chain_label(app));
        let template = if app.compose.is_template { " (template)" } else { "" };
        println!("    compose: {}{}", app.compose.source, template);
        println!("    env:     {} variables", app.env.len());
        if !app.assets.is_empty() {
            println!("    assets:  {} files", app.assets.len());
        }
        println!("    up:      {}", write::compose_command(app, &plan.host, "up -d")?);
    }
    Ok(())
}

fn app_json(app: &ResolvedApp, plan: &DeploymentPlan) -> Result<Value> {
    let env: Map<String, Value> = app
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().map(Value::String).unwrap_or(Value::Null)))
        .collect();
    let provenance: Map<String, Value> = app
        .provenance
        .iter()
        .map(|(field, source)| (field.to_string(), Value::String(source.to_string())))
        .collect();
    let target = write::compose_target(app)?;

    Ok(json!({
        "name": app.name,
        "raw_name": app.raw_name,
        "type": app.kind.type_name(),
        "manifest": app.manifest.to_string(),
        "chain": app.chain.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "path": plan.host.app_path(&app.name),
        "compose": {
            "source": app.compose.source.to_string(),
            "template": app.compose.is_template,
            "target": target,
            "content": app.rendered_compose,
        },
        "assets": app.assets.iter().map(|a| json!({
            "source": a.source.to_string(),
            "target": a.target,
        })).collect::<Vec<_>>(),
        "env": env,
        "compose_context": app.compose_context,
        "set_project_name": app.set_project_name,
        "provenance": provenance,
    }))
}

/// The whole plan as a JSON document
pub fn plan_json(plan: &DeploymentPlan) -> Result<Value> {
    let apps = plan
        .apps
        .iter()
        .map(|app| app_json(app, plan))
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({
        "host": plan.host,
        "apps": apps,
    }))
}

//! Phase 5: Rendering
//!
//! Compose files ending in a template extension are rendered with Tera. The
//! context an app's template sees is:
//!
//! | key       | value                                                       |
//! |-----------|-------------------------------------------------------------|
//! | `host`    | the host definition                                         |
//! | `env`     | the app's own resolved environment                          |
//! | `apps`    | every app of the manifest, by snake_case and PascalCase name, each with its `compose_context` keys and its `env` |
//! | `d0s`     | reserved, always null                                       |
//! | `globals` | reserved, always null                                       |
//! | *other*   | the app's merged `compose_context`                          |
//!
//! Undefined variables are errors, never empty strings.

use log::debug;
use rayon::prelude::*;
use serde_json::{Map, Value};
use tera::{Context, Tera};

use super::ResolvedApp;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::host::HostDefinition;

/// Context keys owned by the renderer
pub const RESERVED_KEYS: &[&str] = &["host", "env", "apps", "d0s", "globals"];

fn env_value(env: &EnvMap) -> Value {
    Value::Object(
        env.iter()
            .map(|(k, v)| (k.clone(), v.clone().map(Value::String).unwrap_or(Value::Null)))
            .collect(),
    )
}

/// The `apps` view shared by every template of one manifest
pub fn apps_view(apps: &[ResolvedApp]) -> Value {
    let mut view = Map::new();
    for app in apps {
        let mut entry: Map<String, Value> = app
            .compose_context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entry.insert("env".to_string(), env_value(&app.env));
        let entry = Value::Object(entry);
        view.insert(app.name.to_pascal(), entry.clone());
        view.insert(app.name.to_string(), entry);
    }
    Value::Object(view)
}

/// Full template context for one app
pub fn build_context(app: &ResolvedApp, host: &HostDefinition, apps: &Value) -> Result<Value> {
    let mut context = Map::new();
    for (key, value) in &app.compose_context {
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(Error::ReservedContextKey {
                app: app.raw_name.clone(),
                key: key.clone(),
            });
        }
        context.insert(key.clone(), value.clone());
    }
    context.insert("host".to_string(), serde_json::to_value(host)?);
    context.insert("env".to_string(), env_value(&app.env));
    context.insert("apps".to_string(), apps.clone());
    context.insert("d0s".to_string(), Value::Null);
    context.insert("globals".to_string(), Value::Null);
    Ok(Value::Object(context))
}

/// Flatten a Tera error and its sources into one readable message
pub fn format_tera_error(error: &tera::Error) -> String {
    let mut messages = Vec::new();
    let mut current: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = current {
        let cleaned = err
            .to_string()
            .replace("while rendering '__tera_one_off'", "")
            .replace("Failed to render '__tera_one_off'", "")
            .replace("Failed to parse '__tera_one_off'", "syntax error")
            .replace("'__tera_one_off'", "template")
            .trim()
            .to_string();
        if !cleaned.is_empty() {
            messages.push(cleaned);
        }
        current = err.source();
    }

    if messages.is_empty() {
        "template rendering failed".to_string()
    } else {
        messages.join(": ")
    }
}

/// Render one template against a JSON context
pub fn render_template(app: &str, path: &str, template: &str, context: Value) -> Result<String> {
    let render_error = |message: String| Error::TemplateRender {
        app: app.to_string(),
        path: path.to_string(),
        message,
    };
    let context = Context::from_value(context).map_err(|e| render_error(format_tera_error(&e)))?;
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.render_str(template, &context)
        .map_err(|e| render_error(format_tera_error(&e)))
}

/// Executes Phase 5: render the compose templates of every app.
///
/// Each template sees every app's context, so this runs only once all apps
/// are merged. Failures of all apps are reported together.
pub fn execute(apps: &mut [ResolvedApp], host: &HostDefinition) -> Result<()> {
    let view = apps_view(apps);

    let rendered: Vec<Result<Option<String>>> = apps
        .par_iter()
        .map(|app| {
            let context = build_context(app, host, &view)?;
            if !app.compose.is_template {
                return Ok(None);
            }
            debug!("Rendering {} for {}", app.compose.source, app.name);
            render_template(
                &app.raw_name,
                &app.compose.source.to_string(),
                &app.compose.content,
                context,
            )
            .map(Some)
        })
        .collect();

    let mut errors = Vec::new();
    for (app, result) in apps.iter_mut().zip(rendered) {
        match result {
            Ok(Some(content)) => app.rendered_compose = content,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }
    Error::collect(errors)
}

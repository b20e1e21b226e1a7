//! # Console Output
//!
//! Colour and emoji decisions for the `d0s` binary. Honours:
//! - `--color=never|always|auto`
//! - `NO_COLOR` (any value, see https://no-color.org/)
//! - `CLICOLOR=0` and `CLICOLOR_FORCE=1`
//! - `TERM=dumb`

use std::env;

use console::{style, StyledObject};

/// Whether the binary may use colour and emoji
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Build from the `--color` flag, consulting the environment for `auto`
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    pub fn without_color() -> Self {
        Self { use_color: false }
    }

    /// Bold text, or the plain text when colour is off
    pub fn heading<'a>(&self, text: &'a str) -> StyledObject<&'a str> {
        style(text).bold().force_styling(self.use_color)
    }

    /// Dimmed text for secondary details
    pub fn detail<'a>(&self, text: &'a str) -> StyledObject<&'a str> {
        style(text).dim().force_styling(self.use_color)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// `emoji` when colour is on, otherwise `plain`
pub fn emoji<'a>(config: &OutputConfig, emoji: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji
    } else {
        plain
    }
}

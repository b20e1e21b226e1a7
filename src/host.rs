//! The host a manifest deploys to

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::names::CanonicalName;

fn default_port() -> u16 {
    defaults::HOST_PORT
}

fn default_home() -> String {
    defaults::HOST_HOME.to_string()
}

fn default_root_path() -> String {
    defaults::HOST_ROOT_PATH.to_string()
}

fn default_compose_command() -> String {
    defaults::HOST_COMPOSE_COMMAND.to_string()
}

/// Connection details and directory layout of the deployment host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostDefinition {
    /// Hostname or address
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user. When unset the transport's default user applies.
    #[serde(default)]
    pub user: Option<String>,

    /// Home directory; `{user}` is replaced with the login user
    #[serde(default = "default_home")]
    pub home: String,

    /// Working directory for apps, absolute or relative to `home`
    #[serde(default = "default_root_path")]
    pub root_path: String,

    #[serde(default = "default_compose_command")]
    pub compose_command: String,
}

impl HostDefinition {
    /// Host with every optional field at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: default_port(),
            user: None,
            home: default_home(),
            root_path: default_root_path(),
            compose_command: default_compose_command(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn home(mut self, home: impl Into<String>) -> Self {
        self.home = home.into();
        self
    }

    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn compose_command(mut self, command: impl Into<String>) -> Self {
        self.compose_command = command.into();
        self
    }

    /// Home directory with `{user}` substituted.
    ///
    /// Without a user a templated home cannot be known, so paths are left
    /// relative to the login directory.
    pub fn home_dir(&self) -> String {
        match &self.user {
            Some(user) => self.home.replace("{user}", user),
            None if self.home.contains("{user}") => String::new(),
            None => self.home.clone(),
        }
    }

    /// Working directory holding every app
    pub fn root_dir(&self) -> String {
        posix_join(&self.home_dir(), &self.root_path)
    }

    /// Directory for one app on the host
    pub fn app_path(&self, app: &CanonicalName) -> String {
        posix_join(&self.root_dir(), app.as_str())
    }

    /// Shell command running `cmd` through the host's compose command
    pub fn compose_invocation(&self, compose: &str, env: &str, cmd: &str) -> String {
        format!(
            "{} --file {} --env-file {} {}",
            self.compose_command,
            shell_quote(compose),
            shell_quote(env),
            cmd
        )
    }
}

impl fmt::Display for HostDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Join POSIX paths; an absolute right-hand side replaces the left
pub fn posix_join(base: &str, path: &str) -> String {
    if path.starts_with('/') || base.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Quote a word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

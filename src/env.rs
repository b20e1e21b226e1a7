//! Reading and writing env files
//!
//! Env values are `Option<String>`: `None` is a key passed through to compose
//! without a value.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Flat environment, sorted by key
pub type EnvMap = BTreeMap<String, Option<String>>;

/// Read one env file in file order. Later duplicates win when the result is
/// collected into an [`EnvMap`].
pub fn read_env_file(path: &Path) -> Result<Vec<(String, Option<String>)>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| Error::EnvFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for item in iter {
        let (key, value) = item.map_err(|e| Error::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        entries.push((key, Some(value)));
    }
    Ok(entries)
}

/// Convert a YAML scalar from an inline `env:` mapping into an env value
pub fn value_from_yaml(value: &serde_yaml::Value) -> std::result::Result<Option<String>, String> {
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::String(s) => Ok(Some(s.clone())),
        serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
        serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("expected a string, number, bool or null, found {:?}", other)),
    }
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '$' | '\\' | '`'))
}

/// Quote a value so env readers take it literally.
///
/// Single quotes disable `$` substitution. Values holding a single quote, a
/// backslash or a newline fall back to double quotes with `\\`, `"`, `$`
/// and newlines escaped.
fn quote_value(value: &str) -> String {
    if !value.contains(['\'', '\\', '\n']) {
        return format!("'{}'", value);
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Serialise an environment as env file content.
///
/// ```
/// use d0s::env::{dump_env, EnvMap};
///
/// let mut env = EnvMap::new();
/// env.insert("DOMAIN".to_string(), Some("example.com".to_string()));
/// env.insert("GREETING".to_string(), Some("hello world".to_string()));
/// env.insert("PASSTHROUGH".to_string(), None);
/// assert_eq!(dump_env(&env), "DOMAIN=example.com\nGREETING='hello world'\nPASSTHROUGH");
/// ```
pub fn dump_env(env: &EnvMap) -> String {
    env.iter()
        .map(|(key, value)| match value {
            None => key.clone(),
            Some(v) if needs_quotes(v) => format!("{}={}", key, quote_value(v)),
            Some(v) => format!("{}={}", key, v),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_env_file_keeps_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.env");
        fs::write(&path, "# comment\nA=1\nB=\"two words\"\nA=3\n").unwrap();

        let entries = read_env_file(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                ("A".to_string(), Some("1".to_string())),
                ("B".to_string(), Some("two words".to_string())),
                ("A".to_string(), Some("3".to_string())),
            ]
        );
        let env: EnvMap = entries.into_iter().collect();
        assert_eq!(env["A"].as_deref(), Some("3"));
    }

    #[test]
    fn test_read_missing_env_file() {
        let temp = TempDir::new().unwrap();
        let result = read_env_file(&temp.path().join("missing.env"));
        assert!(matches!(result, Err(Error::EnvFile { .. })));
    }

    #[test]
    fn test_value_from_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("[x, 3, true, null, [1]]").unwrap();
        let items = yaml.as_sequence().unwrap();
        assert_eq!(value_from_yaml(&items[0]).unwrap().as_deref(), Some("x"));
        assert_eq!(value_from_yaml(&items[1]).unwrap().as_deref(), Some("3"));
        assert_eq!(value_from_yaml(&items[2]).unwrap().as_deref(), Some("true"));
        assert_eq!(value_from_yaml(&items[3]).unwrap(), None);
        assert!(value_from_yaml(&items[4]).is_err());
    }

    #[test]
    fn test_dump_env_plain_value() {
        let mut env = EnvMap::new();
        env.insert("DOMAIN".to_string(), Some("x".to_string()));
        assert_eq!(dump_env(&env), "DOMAIN=x");
    }

    #[test]
    fn test_dump_env_quoting() {
        let mut env = EnvMap::new();
        env.insert("Q".to_string(), Some(r#"say "hi""#.to_string()));
        env.insert("N".to_string(), Some("a\nb".to_string()));
        env.insert("P".to_string(), Some("pa$word".to_string()));
        env.insert("S".to_string(), Some("it's $HOME".to_string()));
        assert_eq!(
            dump_env(&env),
            "N=\"a\\nb\"\nP='pa$word'\nQ='say \"hi\"'\nS=\"it's \\$HOME\""
        );
    }

    #[test]
    fn test_dump_env_reads_back() {
        let values = [
            "pa$word",
            "${HOME}/x",
            "it's",
            "it's $HOME",
            r#"say "hi""#,
            r"C:\temp\dir",
            r"trailing\",
            r#"back\slash "and" $dollar's"#,
            "a #hash",
            "two\nlines",
            "two\nlines with 'quote'",
            "tick`s",
            "plain",
        ];
        let env: EnvMap = values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("KEY_{}", i), Some(v.to_string())))
            .collect();

        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, dump_env(&env)).unwrap();

        let read: EnvMap = read_env_file(&path).unwrap().into_iter().collect();
        assert_eq!(read, env);
    }

    #[test]
    fn test_dump_env_is_sorted() {
        let mut env = EnvMap::new();
        env.insert("Z".to_string(), Some("1".to_string()));
        env.insert("A".to_string(), Some("2".to_string()));
        assert_eq!(dump_env(&env), "A=2\nZ=1");
        assert_eq!(dump_env(&EnvMap::new()), "");
    }
}

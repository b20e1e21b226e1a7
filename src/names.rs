//! App name normalisation
//!
//! Manifests may spell app names in PascalCase, camelCase, snake_case or
//! kebab-case. All spellings are folded into one canonical lowercase
//! `snake_case` form, which is what app lookups, `extends` selectors, template
//! `apps.*` keys and remote directory names use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator used to join word tokens in the canonical form
pub const SEPARATOR: char = '_';

/// A normalised app name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalName(String);

impl CanonicalName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// PascalCase rendering of the name, e.g. `website_example_com` ->
    /// `WebsiteExampleCom`
    pub fn to_pascal(&self) -> String {
        self.0
            .split(SEPARATOR)
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split a raw identifier into lowercase word tokens.
///
/// Characters outside `[A-Za-z0-9_\- ]` are dropped. Underscores, hyphens and
/// spaces separate words, and every uppercase letter starts a new word. Digits
/// stay attached to the word before them.
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in raw.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if ch.is_ascii_uppercase() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            current.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Normalise a raw app name into its canonical form.
///
/// ```
/// use d0s::names::normalize;
///
/// let canonical = normalize("WebsiteExampleCom").unwrap();
/// assert_eq!(canonical.as_str(), "website_example_com");
/// assert_eq!(normalize("website-example-com").unwrap(), canonical);
/// assert_eq!(normalize("websiteExampleCom").unwrap(), canonical);
/// ```
pub fn normalize(raw: &str) -> Result<CanonicalName> {
    let tokens = tokenize(raw);

    let starts_with_letter = tokens
        .first()
        .and_then(|token| token.chars().next())
        .is_some_and(|ch| ch.is_ascii_alphabetic());
    if !starts_with_letter {
        return Err(Error::InvalidName {
            name: raw.to_string(),
            reason: "names must start with a letter A-Z".to_string(),
        });
    }

    Ok(CanonicalName(tokens.join(&SEPARATOR.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize(raw).unwrap().to_string()
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(norm("One"), "one");
        assert_eq!(norm("TwoWords"), "two_words");
        assert_eq!(norm("HasThreeWords"), "has_three_words");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(norm("one"), "one");
        assert_eq!(norm("twoWords"), "two_words");
        assert_eq!(norm("hasThreeWords"), "has_three_words");
    }

    #[test]
    fn test_snake_and_kebab_case() {
        assert_eq!(norm("two_words"), "two_words");
        assert_eq!(norm("has_three_words"), "has_three_words");
        assert_eq!(norm("two-words"), "two_words");
        assert_eq!(norm("has-three-words"), "has_three_words");
    }

    #[test]
    fn test_mixed_and_rubbish() {
        assert_eq!(norm("one "), "one");
        assert_eq!(norm("one !"), "one");
        assert_eq!(norm("two words"), "two_words");
        assert_eq!(norm("has-three_words"), "has_three_words");
        assert_eq!(norm("this has-four_words"), "this_has_four_words");
        assert_eq!(norm("my--app__name"), "my_app_name");
    }

    #[test]
    fn test_digits_stay_with_word() {
        assert_eq!(norm("TestApp2"), "test_app2");
        assert_eq!(norm("test_app2"), "test_app2");
        assert_eq!(norm("testApp2"), "test_app2");
    }

    #[test]
    fn test_all_four_conventions_agree() {
        let variants = [
            "WebsiteExampleCom",
            "websiteExampleCom",
            "website_example_com",
            "website-example-com",
        ];
        for variant in variants {
            assert_eq!(norm(variant), "website_example_com", "variant {}", variant);
        }
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(normalize(""), Err(Error::InvalidName { .. })));
        assert!(matches!(normalize("!!!"), Err(Error::InvalidName { .. })));
        assert!(matches!(normalize("2fast"), Err(Error::InvalidName { .. })));
        assert!(matches!(normalize("_2fast"), Err(Error::InvalidName { .. })));
    }

    #[test]
    fn test_to_pascal() {
        assert_eq!(normalize("website-example-com").unwrap().to_pascal(), "WebsiteExampleCom");
        assert_eq!(normalize("test_app2").unwrap().to_pascal(), "TestApp2");
    }
}

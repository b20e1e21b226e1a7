//! Property-based tests for name normalisation.
//!
//! These tests use proptest to generate random identifiers and verify that
//! the normaliser's invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::names::{normalize, CanonicalName};
    use proptest::prelude::*;

    /// Word lists that are valid in every casing convention
    fn words() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z][a-z0-9]{0,6}", 1..5)
    }

    fn capitalise(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    fn pascal(words: &[String]) -> String {
        words.iter().map(|w| capitalise(w)).collect()
    }

    fn camel(words: &[String]) -> String {
        let mut out = words[0].clone();
        for word in &words[1..] {
            out.push_str(&capitalise(word));
        }
        out
    }

    proptest! {
        /// Property: all four casing conventions normalise to the same name
        #[test]
        fn casing_variants_are_equivalent(words in words()) {
            let snake = normalize(&words.join("_")).unwrap();
            prop_assert_eq!(&normalize(&words.join("-")).unwrap(), &snake);
            prop_assert_eq!(&normalize(&pascal(&words)).unwrap(), &snake);
            prop_assert_eq!(&normalize(&camel(&words)).unwrap(), &snake);
        }

        /// Property: normalising a canonical name is a no-op
        #[test]
        fn normalize_is_idempotent(raw in "[A-Za-z][A-Za-z0-9_ -]{0,24}") {
            let once: CanonicalName = normalize(&raw).unwrap();
            let twice = normalize(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }

        /// Property: canonical names only contain lowercase ASCII, digits and
        /// single separators
        #[test]
        fn canonical_form_is_lower_snake(raw in "[A-Za-z][A-Za-z0-9_ !-]{0,24}") {
            let name = normalize(&raw).unwrap();
            let s = name.as_str();
            prop_assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!s.contains("__"));
            prop_assert!(!s.starts_with('_') && !s.ends_with('_'));
        }
    }
}

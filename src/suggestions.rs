//! # Error Suggestions
//!
//! This module provides helper functions for generating helpful error
//! messages with hints and suggestions. Errors should tell users what went
//! wrong AND how to fix it.
//!
//! The library uses [`did_you_mean`] to attach hints to manifest parse
//! errors; the CLI uses the `anyhow` constructors below.

/// Generate an error for when no manifest can be found.
///
/// Includes hints about:
/// - The filenames searched for
/// - Using the -m/--manifest flag
/// - Using the D0S_MANIFEST environment variable
pub fn manifest_not_found(path: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "No manifest found at {path}\n\n\
         hint: Create a d0s-manifest.yml defining your apps and host\n\
         hint: Use -m/--manifest to specify a different path or git+ URL\n\
         hint: Set the D0S_MANIFEST environment variable"
    )
}

/// Generate an error for a cache refresh that matched nothing.
///
/// Suggests the closest cached URL when one is near `url`.
pub fn cache_key_not_found(url: &str, cached: &[String]) -> anyhow::Error {
    let candidates: Vec<&str> = cached.iter().map(String::as_str).collect();
    let similar = did_you_mean(url, &candidates)
        .map(|hint| format!("\nhint: {hint}"))
        .unwrap_or_default();
    anyhow::anyhow!(
        "No cached checkout for {url}\n\n\
         hint: Run 'd0s cache list' to see cached repositories\n\
         hint: Pass --ref exactly as written in the manifest, e.g. --ref main{similar}"
    )
}

/// Generate an error for a cycle detected in extends chains.
///
/// Includes hints about how to resolve the cycle.
pub fn cycle_detected(cycle: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Cyclic extends detected: {cycle}\n\n\
         hint: Remove one of the 'extends:' entries to break the cycle\n\
         hint: Use '::Name' to extend a differently named app instead of itself"
    )
}

/// A `did you mean` hint for a misspelt key, if one of `candidates` is close
pub fn did_you_mean(input: &str, candidates: &[&str]) -> Option<String> {
    find_similar(input, candidates).map(|s| format!("did you mean '{s}'?"))
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
pub fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut current = vec![0usize; b_len + 1];

    for i in 1..=a_len {
        current[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            current[j] = (prev[j] + 1).min(current[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b_len]
}

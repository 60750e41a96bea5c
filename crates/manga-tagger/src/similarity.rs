//! Fuzzy title similarity, scored in [0, 1].

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

/// Lowercase and replace everything but letters and digits with spaces
fn full_process(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b)
}

fn join(tokens: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    tokens
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set similarity
///
/// Word order and repeated words do not matter, and a title that is a
/// word subset of the other scores high. Punctuation and case are ignored.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = full_process(a);
    let b = full_process(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection = join(tokens_a.intersection(&tokens_b));
    let only_a = join(tokens_a.difference(&tokens_b));
    let only_b = join(tokens_b.difference(&tokens_a));

    let combined_a = format!("{} {}", intersection, only_a).trim().to_string();
    let combined_b = format!("{} {}", intersection, only_b).trim().to_string();

    [
        ratio(&intersection, &combined_a),
        ratio(&intersection, &combined_b),
        ratio(&combined_a, &combined_b),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

/// Best similarity of the shorter string against any equally long window of
/// the longer one; 1.0 when one contains the other
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if short.is_empty() {
        return 0.0;
    }
    if long.contains(short) {
        return 1.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    long_chars
        .windows(width)
        .map(|window| normalized_levenshtein(short, &window.iter().collect::<String>()))
        .fold(0.0, f64::max)
}

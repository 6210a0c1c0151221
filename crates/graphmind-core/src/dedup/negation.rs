//! Lexical negation gate (spec.md §4.3 step 7)
//!
//! Dense similarity cannot distinguish "likes coffee" from "doesn't
//! like coffee" — the negation gap between such pairs is near zero.
//! This is a pure lexical backstop applied only to `DUPLICATE` verdicts.

const NEGATION_TOKENS: &[&str] = &[
    "not", "no", "never", "nobody", "nothing", "neither", "nor", "don't", "doesn't", "didn't",
    "isn't", "aren't", "wasn't", "weren't", "won't", "wouldn't", "can't", "cannot", "shouldn't",
    "couldn't", "haven't", "hasn't", "hadn't",
];

/// Lowercase, strip punctuation (apostrophes inside contractions are
/// kept so `don't` stays one token), split on whitespace.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_negation(text: &str) -> bool {
    let tokens = tokenize(text);
    tokens.iter().any(|t| NEGATION_TOKENS.contains(&t.as_str()))
}

/// True iff exactly one of the two texts contains a negation token —
/// the condition that downgrades a `DUPLICATE` verdict to `insert`.
pub fn exactly_one_negates(text_a: &str, text_b: &str) -> bool {
    contains_negation(text_a) != contains_negation(text_b)
}

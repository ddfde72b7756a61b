use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MAX_TOKENS: usize = 40;
const MIN_TOKEN_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "would",
    "have", "has", "had", "not", "but", "you", "your", "our", "their", "they", "them", "its",
    "into", "onto", "over", "than", "then", "there", "here", "also", "can", "could", "should",
    "about", "after", "before", "each", "any", "all", "some", "more", "most", "such", "only",
    "own", "same", "very", "just", "which", "while", "who", "whom", "what", "when", "where",
    "why", "how", "been", "being", "does", "did", "doing", "per", "via",
];

/// Canonical view of a study plan used for exact and fuzzy matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFingerprint {
    /// SHA-256 of `normalized_text`, lowercase hex.
    pub hash: String,
    /// Significant terms, most frequent first.
    pub tokens: Vec<String>,
    pub normalized_text: String,
}

impl CaseFingerprint {
    pub fn of(text: &str) -> Self {
        let normalized_text = normalize(text);
        let tokens = significant_tokens(&normalized_text);
        let hash = content_hash(&normalized_text);
        Self {
            hash,
            tokens,
            normalized_text,
        }
    }
}

/// Lowercase and collapse every whitespace run to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '/')
}

fn significant_tokens(normalized: &str) -> Vec<String> {
    let cleaned: String = normalized
        .chars()
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();

    // (count, first position) per token
    let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in cleaned.split_whitespace().enumerate() {
        if token.chars().count() < MIN_TOKEN_LEN || STOP_WORDS.contains(&token) {
            continue;
        }
        stats
            .entry(token)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(&str, (usize, usize))> = stats.into_iter().collect();
    ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
        count_b.cmp(count_a).then(first_a.cmp(first_b))
    });
    ranked
        .into_iter()
        .take(MAX_TOKENS)
        .map(|(token, _)| token.to_string())
        .collect()
}

fn content_hash(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

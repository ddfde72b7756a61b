use std::collections::{BTreeSet, HashMap};

use super::fingerprint::CaseFingerprint;

/// Strategy scoring how alike two fingerprinted cases are, in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &CaseFingerprint, b: &CaseFingerprint) -> f64;
}

/// Weighted blend of token-set Jaccard and character sequence ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendedSimilarity {
    pub token_weight: f64,
    pub sequence_weight: f64,
}

impl Default for BlendedSimilarity {
    fn default() -> Self {
        Self {
            token_weight: 0.7,
            sequence_weight: 0.3,
        }
    }
}

impl Similarity for BlendedSimilarity {
    fn similarity(&self, a: &CaseFingerprint, b: &CaseFingerprint) -> f64 {
        let score = self.token_weight * jaccard(&a.tokens, &b.tokens)
            + self.sequence_weight * sequence_ratio(&a.normalized_text, &b.normalized_text);
        score.clamp(0.0, 1.0)
    }
}

/// `|A ∩ B| / |A ∪ B|`; two empty sets share nothing.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// `2 * M / T` over characters, where `M` counts characters in matching blocks
/// found by recursive longest-common-substring search and `T` is the combined length.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = SequenceMatcher::new(&a, &b).matched_len();
    2.0 * matched as f64 / total as f64
}

const AUTOJUNK_MIN_LEN: usize = 200;

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (index, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(index);
        }
        // Characters that are too common in long inputs are not used as match anchors.
        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular_limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular_limit);
        }
        Self { a, b, b2j }
    }

    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        let mut run_lengths: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_lengths = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let previous = if j > 0 {
                        run_lengths.get(&(j - 1)).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    let length = previous + 1;
                    next_lengths.insert(j, length);
                    if length > best_size {
                        best_i = i + 1 - length;
                        best_j = j + 1 - length;
                        best_size = length;
                    }
                }
            }
            run_lengths = next_lengths;
        }

        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }

    fn matched_len(&self) -> usize {
        let mut matched = 0;
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, size) = self.longest_match(alo, ahi, blo, bhi);
            if size == 0 {
                continue;
            }
            matched += size;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + size < ahi && j + size < bhi {
                pending.push((i + size, ahi, j + size, bhi));
            }
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn sequence_ratio_matches_known_values() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
        assert_eq!(sequence_ratio("abcd", "abcd"), 1.0);
        // "abcd" vs "bcde": matching block "bcd" -> 2*3/8
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        // "qabxcd" vs "abycdf": blocks "ab" and "cd" -> 2*4/12
        assert!((sequence_ratio("qabxcd", "abycdf") - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_over_token_sets() {
        assert_eq!(jaccard(&tokens(&["a", "b"]), &tokens(&["b", "a"])), 1.0);
        assert_eq!(jaccard(&tokens(&["a", "b"]), &tokens(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&[], &[]), 0.0);
    }

    #[test]
    fn blend_weights_tokens_over_sequence() {
        let a = CaseFingerprint::of("Major: Physics PHY101 PHY102 MA201");
        let b = CaseFingerprint::of("Major: Physics PHY101 PHY102 MA201");
        assert!((BlendedSimilarity::default().similarity(&a, &b) - 1.0).abs() < 1e-9);

        let c = CaseFingerprint::of("Minor: History HIS300 HIS301");
        let score = BlendedSimilarity::default().similarity(&a, &c);
        assert!(score < 0.5, "unrelated plans scored {score}");
    }

    #[test]
    fn long_inputs_extend_matches_through_common_characters() {
        let a = "major: computer science. fall: cs101 intro to programming, ma201 linear algebra, \
                 phy110 mechanics, cs150 discrete structures, ee210 circuits. spring: cs220 \
                 algorithms, cs230 systems, ma301 probability, his105 world history, cs240 databases.";
        assert!(a.len() >= AUTOJUNK_MIN_LEN);
        assert_eq!(sequence_ratio(a, a), 1.0);

        let b = format!("{a} quantum");
        let expected = 2.0 * a.len() as f64 / (a.len() + b.len()) as f64;
        assert!((sequence_ratio(a, &b) - expected).abs() < 1e-9);
    }
}

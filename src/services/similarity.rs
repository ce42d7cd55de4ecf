//! String similarity scoring
//!
//! Edit-distance based similarity used to rank autocomplete candidates.

/// Inputs are truncated to this many characters before computing an edit
/// distance, keeping the O(n*m) table bounded.
pub const MAX_DISTANCE_INPUT: usize = 256;

/// Similarity of `candidate` to `query` in `[0, 1]`.
///
/// Exact match scores 1.0, a prefix match 0.9 and a substring match 0.7.
/// Anything else falls back to `1 - distance / max_len`. Both inputs are
/// case-folded first.
pub fn similarity(candidate: &str, query: &str) -> f64 {
    let a = candidate.to_lowercase();
    let b = query.to_lowercase();

    if a == b {
        return 1.0;
    }
    if a.starts_with(&b) {
        return 0.9;
    }
    if a.contains(&b) {
        return 0.7;
    }

    let a: Vec<char> = a.chars().take(MAX_DISTANCE_INPUT).collect();
    let b: Vec<char> = b.chars().take(MAX_DISTANCE_INPUT).collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let distance = levenshtein_chars(&a, &b);
    1.0 - distance as f64 / longest as f64
}

/// Classic unit-cost Levenshtein distance over Unicode scalar values
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    levenshtein_chars(&a, &b)
}

fn levenshtein_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows of the DP table
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basic() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("flaw", "lawn"), 2);
        assert_eq!(levenshtein_distance("AAPL", "AAPL"), 0);
    }

    #[test]
    fn test_levenshtein_unicode() {
        assert_eq!(levenshtein_distance("café", "cafe"), 1);
    }

    #[test]
    fn test_similarity_tiers() {
        assert_eq!(similarity("AAPL", "aapl"), 1.0);
        assert_eq!(similarity("Smith IRA", "smith"), 0.9);
        assert_eq!(similarity("Smith IRA", "ira"), 0.7);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn test_similarity_edit_distance() {
        // one substitution over four characters
        let score = similarity("msft", "msfx");
        assert!((score - 0.75).abs() < 1e-9);

        let score = similarity("abc", "xyz");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_similarity_bounded_input() {
        let long = "x".repeat(10_000);
        let score = similarity(&long, "yyy");
        assert!((0.0..=1.0).contains(&score));
    }
}

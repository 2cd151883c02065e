//! Reference extraction and fuzzy matching between document identifiers
//!
//! Pure functions: given an invoice document text and a payment concept
//! text, decide whether they refer to the same document and how strongly.
//! Candidate tokens are the full normalized string plus every embedded
//! numeric run, with numeric ranges ("FACT 1234-1236") expanded so one
//! payment line can reference several invoices.

/// Candidate tokens shorter than this are discarded (avoids false
/// positives on short codes)
const MIN_TOKEN_LEN: usize = 3;

/// Minimum similarity score for two tokens to count as a reference match
pub const MATCH_THRESHOLD: f64 = 0.70;

/// Numeric ranges wider than this are not expanded; only the endpoints
/// are kept
const MAX_RANGE_SPAN: u64 = 10;

/// Extract candidate document-number tokens from free text
///
/// Returns, in order of discovery and without duplicates:
/// - the full string stripped of non-alphanumeric characters, uppercased;
/// - every embedded numeric run of length >= 3;
/// - the numbers covered by ranges such as `1234-1236`, `1000/1003` or
///   `1000 A 1003`, including abbreviated ends (`1234-36` covers
///   1234 through 1236).
pub fn extract_references(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut tokens = Vec::new();

    let full: String = upper.chars().filter(|c| c.is_alphanumeric()).collect();
    push_unique(&mut tokens, full);

    let runs = numeric_runs(&upper);
    for (run, _, _) in &runs {
        push_unique(&mut tokens, run.clone());
    }

    // Expand ranges between consecutive numeric runs
    for pair in runs.windows(2) {
        let (ref first, _, first_end) = pair[0];
        let (ref second, second_start, _) = pair[1];
        let separator = upper[first_end..second_start].trim_matches([' ', '.']);
        if !matches!(separator, "-" | "/" | "A") {
            continue;
        }
        for number in expand_range(first, second) {
            push_unique(&mut tokens, number);
        }
    }

    tokens
}

/// Similarity between two normalized tokens in [0, 1]
///
/// 1.0 on equality, 0.9 when one contains the other, otherwise a
/// normalized edit distance.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.9;
    }

    let distance = levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - distance as f64 / max_len as f64
}

/// Best pairwise similarity across two candidate token sets, as a match
///
/// `Some(score)` when the best score reaches [`MATCH_THRESHOLD`].
pub fn best_match(invoice_refs: &[String], payment_refs: &[String]) -> Option<f64> {
    let mut best = 0.0_f64;
    for inv in invoice_refs {
        for pay in payment_refs {
            let score = similarity(inv, pay);
            if score > best {
                best = score;
            }
        }
    }
    (best >= MATCH_THRESHOLD).then_some(best)
}

/// Do these two free-text strings refer to the same document?
pub fn reference_match(invoice_text: &str, payment_text: &str) -> Option<f64> {
    best_match(
        &extract_references(invoice_text),
        &extract_references(payment_text),
    )
}

fn push_unique(tokens: &mut Vec<String>, token: String) {
    if token.len() >= MIN_TOKEN_LEN && !tokens.contains(&token) {
        tokens.push(token);
    }
}

/// Digit runs with their byte offsets in the source string
fn numeric_runs(text: &str) -> Vec<(String, usize, usize)> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch.is_ascii_digit() {
            if current.is_empty() {
                start = idx;
            }
            current.push(ch);
        } else if !current.is_empty() {
            if current.len() >= MIN_TOKEN_LEN {
                runs.push((current.clone(), start, idx));
            }
            current.clear();
        }
    }
    if current.len() >= MIN_TOKEN_LEN {
        runs.push((current.clone(), start, text.len()));
    }
    runs
}

/// Numbers covered by a range written as two digit runs
///
/// A shorter end is treated as abbreviated ("1234-36" means 1234..=1236).
/// Descending or oversized spans yield nothing; the individual runs are
/// already tokens on their own.
fn expand_range(first: &str, second: &str) -> Vec<String> {
    let Ok(start) = first.parse::<u64>() else {
        return Vec::new();
    };
    let end_str = if second.len() < first.len() {
        format!("{}{}", &first[..first.len() - second.len()], second)
    } else {
        second.to_string()
    };
    let Ok(end) = end_str.parse::<u64>() else {
        return Vec::new();
    };

    if end <= start || end - start > MAX_RANGE_SPAN {
        return Vec::new();
    }
    (start..=end).map(|n| n.to_string()).collect()
}

/// Levenshtein edit distance over chars, two-row dynamic programming
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_full_token_and_numeric_runs() {
        let tokens = extract_references("FAC-2024-00123");
        assert!(tokens.contains(&"FAC202400123".to_string()));
        assert!(tokens.contains(&"2024".to_string()));
        assert!(tokens.contains(&"00123".to_string()));
    }

    #[test]
    fn rejects_short_tokens() {
        let tokens = extract_references("F 12");
        assert!(tokens.is_empty());
    }

    #[test]
    fn expands_invoice_ranges() {
        let tokens = extract_references("PAGO FACT 1234-1236");
        assert!(tokens.contains(&"1234".to_string()));
        assert!(tokens.contains(&"1235".to_string()));
        assert!(tokens.contains(&"1236".to_string()));
    }

    #[test]
    fn expands_abbreviated_range_ends() {
        let tokens = extract_references("FRA. 1234-36");
        assert!(tokens.contains(&"1235".to_string()));
        assert!(tokens.contains(&"1236".to_string()));
    }

    #[test]
    fn expands_spanish_a_separated_ranges() {
        let tokens = extract_references("FRA 1000 A 1003");
        assert!(tokens.contains(&"1001".to_string()));
        assert!(tokens.contains(&"1002".to_string()));
    }

    #[test]
    fn wide_ranges_keep_endpoints_only() {
        let tokens = extract_references("100-500");
        assert!(tokens.contains(&"100".to_string()));
        assert!(tokens.contains(&"500".to_string()));
        assert!(!tokens.contains(&"101".to_string()));
    }

    #[test]
    fn comma_separated_references_all_extracted() {
        let tokens = extract_references("FACT 123, 456, 789");
        assert!(tokens.contains(&"123".to_string()));
        assert!(tokens.contains(&"456".to_string()));
        assert!(tokens.contains(&"789".to_string()));
    }

    #[test]
    fn levenshtein_distance() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("abc", "abd"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn similarity_ladder() {
        assert_eq!(similarity("A337748", "A337748"), 1.0);
        assert_eq!(similarity("337748", "PAGOA337748"), 0.9);
        assert!(similarity("INV12345", "INV12346") > 0.8);
        assert!(similarity("ABC", "XYZ") < 0.1);
        assert_eq!(similarity("", "X"), 0.0);
    }

    #[test]
    fn matches_embedded_invoice_number() {
        let score = reference_match("FAC-2024-00123", "Pago fact. 2024-00123");
        assert!(score.is_some());
        assert!(score.unwrap() >= MATCH_THRESHOLD);
    }

    #[test]
    fn no_match_on_unrelated_text() {
        assert!(reference_match("FAC-9911", "Transferencia nomina").is_none());
    }
}

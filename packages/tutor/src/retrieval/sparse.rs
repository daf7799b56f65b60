//! Sparse-search query building: stopword removal, maritime synonym
//! expansion, and the rule-number boost.
//!
//! The tsquery uses the `simple` configuration so Vietnamese works without
//! a language-specific stemmer; recall comes from OR-joined tokens plus a
//! bidirectional vi↔en synonym table for the frequent maritime terms.

use crate::types::SparseResult;

/// Multiplier for rows matching a digit sequence from the query.
pub const NUMBER_BOOST_FACTOR: f32 = 2.0;

/// Stop words, Vietnamese and English.
const STOP_WORDS: &[&str] = &[
    "là", "gì", "về", "của", "và", "có", "được", "trong", "với", "cho", "từ", "này", "đó", "như",
    "thế", "nào", "tôi", "me", "the", "what", "is", "a", "an", "and", "or", "but", "in", "on",
    "at", "to", "for", "of", "with", "by", "how", "why", "when", "where", "which", "who", "about",
];

/// Bidirectional vi↔en synonyms for frequent maritime terms.
fn synonyms(word: &str) -> &'static [&'static str] {
    match word {
        "quy" => &["rule", "regulation"],
        "tắc" => &["rule", "regulation"],
        "rule" => &["quy", "tắc", "regulation", "điều"],
        "điều" => &["rule", "quy", "tắc", "regulation"],
        "cảnh" => &["look", "watch"],
        "giới" => &["out", "watch"],
        "look" => &["cảnh", "watch"],
        "out" => &["giới", "watch"],
        "lookout" => &["cảnh", "giới", "watch"],
        "tàu" => &["vessel", "ship"],
        "vessel" => &["tàu", "ship"],
        "ship" => &["tàu", "vessel"],
        "cắt" => &["crossing", "cross"],
        "hướng" => &["crossing", "direction"],
        "crossing" => &["cắt", "hướng"],
        "tầm" => &["visibility", "range"],
        "nhìn" => &["visibility", "sight"],
        "visibility" => &["tầm", "nhìn"],
        "đèn" => &["light", "lighting"],
        "light" => &["đèn", "lighting"],
        "âm" => &["sound", "signal"],
        "hiệu" => &["signal", "sound"],
        "sound" => &["âm", "hiệu"],
        "signal" => &["âm", "hiệu"],
        "neo" => &["anchor", "anchoring"],
        "anchor" => &["neo", "anchoring"],
        "mạn" => &["side", "starboard", "port"],
        "phải" => &["starboard"],
        "trái" => &["port"],
        "starboard" => &["mạn", "phải"],
        _ => &[],
    }
}

/// Build a tsquery string from a natural-language query.
///
/// Non-stopword tokens plus their synonyms, OR-joined. Falls back to the
/// escaped raw query when nothing meaningful survives filtering.
pub fn build_tsquery(query: &str) -> String {
    let words: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect();

    if words.is_empty() {
        return query.replace('\'', "''");
    }

    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for word in words.iter() {
        if seen.insert(word.clone()) {
            unique.push(word.clone());
        }
        for synonym in synonyms(word) {
            if seen.insert((*synonym).to_string()) {
                unique.push((*synonym).to_string());
            }
        }
    }

    unique
        .iter()
        .map(|w| w.replace('\'', "''"))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Extract digit sequences from a query for rule-number boosting.
pub fn extract_numbers(query: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for ch in query.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            numbers.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        numbers.push(current);
    }
    numbers
}

/// Apply the number boost and re-sort, then truncate to `limit`.
///
/// A row whose content or title contains any digit sequence from the
/// query gets its rank score multiplied by the boost factor once per
/// matching number.
pub fn apply_number_boost(
    mut results: Vec<SparseResult>,
    query: &str,
    limit: usize,
) -> Vec<SparseResult> {
    let numbers = extract_numbers(query);

    if !numbers.is_empty() {
        for result in results.iter_mut() {
            for number in &numbers {
                if result.content.contains(number.as_str())
                    || result.title.contains(number.as_str())
                {
                    result.score *= NUMBER_BOOST_FACTOR;
                }
            }
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tsquery_expands_synonyms() {
        let tsquery = build_tsquery("Rule 15 là gì");
        assert!(tsquery.contains("rule"));
        assert!(tsquery.contains("điều"));
        assert!(tsquery.contains("15"));
        // stop words removed
        assert!(!tsquery.split(" | ").any(|t| t == "là" || t == "gì"));
    }

    #[test]
    fn test_build_tsquery_bidirectional() {
        assert!(build_tsquery("vessel crossing").contains("tàu"));
        assert!(build_tsquery("tàu cắt hướng").contains("crossing"));
    }

    #[test]
    fn test_build_tsquery_escapes_quotes() {
        let tsquery = build_tsquery("ship's bell");
        assert!(!tsquery.contains("ship's"));
    }

    #[test]
    fn test_extract_numbers() {
        assert_eq!(extract_numbers("Rule 15 và Rule 13"), vec!["15", "13"]);
        assert!(extract_numbers("lookout").is_empty());
    }

    #[test]
    fn test_number_boost_reorders() {
        let results = vec![
            SparseResult::new("a", "quy định chung về hành trình", 1.0),
            SparseResult::new("b", "Rule 15: tình huống cắt hướng", 0.8),
        ];

        let boosted = apply_number_boost(results, "Rule 15 là gì?", 10);
        assert_eq!(boosted[0].chunk_id, "b");
        assert!((boosted[0].score - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_no_numbers_keeps_order() {
        let results = vec![
            SparseResult::new("a", "x", 1.0),
            SparseResult::new("b", "y", 0.8),
        ];
        let kept = apply_number_boost(results, "cảnh giới", 10);
        assert_eq!(kept[0].chunk_id, "a");
    }

    #[test]
    fn test_title_match_boosts() {
        let results = vec![SparseResult::new("a", "nội dung", 1.0).with_title("Điều 15")];
        let boosted = apply_number_boost(results, "điều 15", 10);
        assert!((boosted[0].score - 2.0).abs() < 1e-6);
    }
}

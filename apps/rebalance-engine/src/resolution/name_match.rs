//! Fuzzy company-name scoring.
//!
//! Names are normalized (uppercased, punctuation stripped, corporate
//! boilerplate dropped) and scored as an even blend of Jaro-Winkler string
//! similarity and token-set overlap. The blend keeps one-word reorderings
//! and legal-form drift ("Acme Corp" vs "ACME CORPORATION INC") from
//! tanking an otherwise obvious match.

use strsim::jaro_winkler;

/// Legal-form and boilerplate tokens carrying no identity signal.
const STOPWORDS: &[&str] = &[
    "INC", "INCORPORATED", "CORP", "CORPORATION", "PLC", "LTD", "LIMITED", "SA", "AG", "NV",
    "SE", "CO", "COMPANY", "GROUP", "HOLDINGS", "HOLDING", "THE",
];

/// Normalize a company name into comparable tokens.
#[must_use]
pub fn normalize_name(name: &str) -> Vec<String> {
    let cleaned: String = name
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .map(String::from)
        .collect();
    if tokens.is_empty() {
        // Everything was boilerplate; fall back to the raw tokens.
        cleaned.split_whitespace().map(String::from).collect()
    } else {
        tokens
    }
}

fn token_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.iter().filter(|t| b.contains(t)).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Score two company names in `[0.0, 1.0]`.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = normalize_name(a);
    let tokens_b = normalize_name(b);
    let joined_a = tokens_a.join(" ");
    let joined_b = tokens_b.join(" ");
    if joined_a.is_empty() || joined_b.is_empty() {
        return 0.0;
    }
    0.5 * jaro_winkler(&joined_a, &joined_b) + 0.5 * token_jaccard(&tokens_a, &tokens_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert!((name_similarity("Acme Widgets", "Acme Widgets") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn legal_form_drift_scores_high() {
        let score = name_similarity("Acme Widgets Inc", "ACME WIDGETS CORPORATION");
        assert!(score > 0.95, "got {score}");
    }

    #[test]
    fn unrelated_names_score_low() {
        let score = name_similarity("Acme Widgets", "Pacific Rail Freight");
        assert!(score < 0.5, "got {score}");
    }

    #[test]
    fn punctuation_is_ignored() {
        let score = name_similarity("Smith & Jones, Ltd.", "SMITH JONES");
        assert!(score > 0.95, "got {score}");
    }

    #[test]
    fn stopwords_are_dropped() {
        assert_eq!(normalize_name("The Acme Holdings Group Inc"), vec!["ACME"]);
    }

    #[test]
    fn all_stopword_names_still_compare() {
        // "The Company" normalizes to raw tokens rather than nothing.
        assert!(name_similarity("The Company", "THE COMPANY") > 0.99);
    }

    #[test]
    fn empty_name_scores_zero() {
        assert!((name_similarity("", "Acme") - 0.0).abs() < f64::EPSILON);
    }
}

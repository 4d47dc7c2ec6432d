/// Outcome of comparing one structured field between two activities.
///
/// `Wildcard` means at least one side is empty, which matches anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatch {
    Wildcard,
    Match,
    Mismatch,
}

impl FieldMatch {
    pub fn is_compatible(self) -> bool {
        !matches!(self, FieldMatch::Mismatch)
    }
}

fn populated(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Lowercase and collapse whitespace.
pub fn normalize_field(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn singularize(word: &str) -> &str {
    if word.chars().count() <= 3 {
        return word;
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return &word[..word.len() - 2];
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") && !word.ends_with("is")
    {
        return &word[..word.len() - 1];
    }
    word
}

/// Title normal form used for similarity: lowercase, punctuation
/// stripped, whitespace collapsed, simple plurals folded.
pub fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered
        .split_whitespace()
        .map(singularize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein ratio of two already-normalised strings, in [0, 1].
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

pub fn match_exact(a: Option<&str>, b: Option<&str>) -> FieldMatch {
    match (populated(a), populated(b)) {
        (Some(x), Some(y)) if normalize_field(x) == normalize_field(y) => FieldMatch::Match,
        (Some(_), Some(_)) => FieldMatch::Mismatch,
        _ => FieldMatch::Wildcard,
    }
}

pub fn match_fuzzy(a: Option<&str>, b: Option<&str>, threshold: f64) -> FieldMatch {
    match (populated(a), populated(b)) {
        (Some(x), Some(y)) => {
            let score = ratio(&normalize_field(x), &normalize_field(y));
            if score >= threshold {
                FieldMatch::Match
            } else {
                FieldMatch::Mismatch
            }
        }
        _ => FieldMatch::Wildcard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_similarity(a: &str, b: &str) -> f64 {
        ratio(&normalize_title(a), &normalize_title(b))
    }

    #[test]
    fn wildcard_when_either_side_is_empty() {
        assert_eq!(match_exact(None, Some("Auckland")), FieldMatch::Wildcard);
        assert_eq!(match_exact(Some("  "), Some("Auckland")), FieldMatch::Wildcard);
        assert_eq!(match_exact(None, None), FieldMatch::Wildcard);
        assert_eq!(match_fuzzy(Some("Zealandia"), None, 0.95), FieldMatch::Wildcard);
    }

    #[test]
    fn exact_match_ignores_case_and_spacing() {
        assert_eq!(
            match_exact(Some("New  Zealand"), Some("new zealand")),
            FieldMatch::Match
        );
        assert_eq!(
            match_exact(Some("Auckland"), Some("Wellington")),
            FieldMatch::Mismatch
        );
        assert!(!FieldMatch::Mismatch.is_compatible());
        assert!(FieldMatch::Wildcard.is_compatible());
    }

    #[test]
    fn fuzzy_match_respects_threshold() {
        assert_eq!(
            match_fuzzy(Some("Te Papa Museum"), Some("te papa museum"), 0.95),
            FieldMatch::Match
        );
        assert_eq!(
            match_fuzzy(Some("Te Papa Museum"), Some("Auckland Museum"), 0.95),
            FieldMatch::Mismatch
        );
    }

    #[test]
    fn title_normalisation_folds_case_spacing_and_plurals() {
        assert_eq!(normalize_title("  Pottery   Classes! "), "pottery class");
        assert_eq!(normalize_title("beaches"), "beach");
        assert_eq!(normalize_title("bikes"), "bike");
        assert_eq!(normalize_title("glass"), "glass");
        assert_eq!(normalize_title("bus"), "bus");
    }

    #[test]
    fn pottery_variants_are_near_identical() {
        for (a, b) in [
            ("pottery class", "Pottery Class"),
            ("pottery class", "pottery classes"),
            ("Pottery Class", "pottery classes"),
        ] {
            assert!(title_similarity(a, b) >= 0.95, "{a} vs {b}");
        }
        assert!(title_similarity("pottery class", "kayaking trip") < 0.5);
    }
}

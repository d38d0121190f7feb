//! Company-name normalisation.
//!
//! Two forms are derived from a raw name:
//!
//! - the *cleaned* name: uppercase, apostrophes dropped, anything other than
//!   letters, digits and `&` replaced by a space, whitespace collapsed. Leading
//!   footnote asterisks and trailing dots disappear here.
//! - the *normalised* name: the cleaned name with trailing legal-suffix words
//!   removed. Suffixes are only stripped from the end, so in
//!   `COMPANY X LIMITED` only `LIMITED` goes.

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing run of legal-form words, with any `&` glue between them.
static LEGAL_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[\s&]*\b(?:LIMITED|LTD|CO|COMPANY|INC|GHANA|PLC)\b)+[\s&]*$")
        .expect("Invalid legal suffix pattern")
});

/// Words that on their own indicate a header or total row.
const JUNK_WORDS: &[&str] = &["COMPANY", "TOTAL", "GRAND", "SUM", "NO", "NAN", "UNNAMED"];

/// Uppercase and strip punctuation, keeping `&`.
pub fn clean_name(raw: &str) -> String {
    let replaced: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() || c == '&' { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip trailing legal suffixes from an already cleaned name.
pub fn strip_legal_suffixes(cleaned: &str) -> String {
    let stripped = LEGAL_SUFFIX.replace(cleaned, "");
    stripped.trim_matches(|c: char| c == '&' || c.is_whitespace()).to_string()
}

/// Full normalisation used for clustering.
pub fn normalize_name(raw: &str) -> String {
    strip_legal_suffixes(&clean_name(raw))
}

/// Whether a raw company name is a header, total row or otherwise not a company.
///
/// Checked on both the cleaned and the normalised form, so `TOTAL LTD` is
/// junk like `TOTAL`.
pub fn is_junk_name(raw: &str) -> bool {
    let normalized = normalize_name(raw);
    only_junk_tokens(&clean_name(raw)) || only_junk_tokens(&normalized) || normalized.chars().count() < 2
}

fn only_junk_tokens(name: &str) -> bool {
    name.split(' ')
        .all(|t| t.is_empty() || JUNK_WORDS.contains(&t) || t.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  **Goil   Company Ltd. "), "GOIL COMPANY LTD");
        assert_eq!(clean_name("Ola's Energy"), "OLAS ENERGY");
        assert_eq!(clean_name("A&B Oil (GH)"), "A&B OIL GH");
    }

    #[test]
    fn test_suffixes_stripped_from_end_only() {
        assert_eq!(normalize_name("GOIL COMPANY LIMITED"), "GOIL");
        assert_eq!(normalize_name("Goil Company Ltd"), "GOIL");
        assert_eq!(normalize_name("GOIL PLC"), "GOIL");
        assert_eq!(normalize_name("Star Oil Co. Ltd."), "STAR OIL");
        assert_eq!(normalize_name("Smith & Co"), "SMITH");
        // Leading and middle suffix words are part of the name.
        assert_eq!(normalize_name("Company X Limited"), "COMPANY X");
        assert_eq!(normalize_name("Ghana Oil Company Ltd"), "GHANA OIL");
        // Word boundaries: CO inside a word is not a suffix.
        assert_eq!(normalize_name("PETROCO"), "PETROCO");
        assert_eq!(normalize_name("FRONTIER INCORPORATED"), "FRONTIER INCORPORATED");
    }

    #[test]
    fn test_junk_names() {
        for name in ["TOTAL", "Grand Total", "No.", "nan", "Unnamed: 2", "COMPANY", "12", "", "*", "A"] {
            assert!(is_junk_name(name), "{name:?} should be junk");
        }
        // Legal suffixes do not keep a junk name alive.
        for name in ["TOTAL LTD", "Grand Total Ltd", "SUM LIMITED", "Total Co."] {
            assert!(is_junk_name(name), "{name:?} should be junk");
        }
        for name in ["TOTAL PETROLEUM GHANA", "TOTAL PETROLEUM LTD", "GOIL PLC", "NO LIMIT ENERGY", "XY"] {
            assert!(!is_junk_name(name), "{name:?} should not be junk");
        }
    }
}

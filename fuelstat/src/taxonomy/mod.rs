//! Product taxonomy mapper.
//!
//! Maps free-text product labels to a canonical product and category with an
//! ordered list of keyword rules. The first rule with a matching keyword
//! wins, so more specific products must be listed before the family they
//! belong to.
//!
//! Matching runs on a normalised label (uppercase, punctuation stripped,
//! whitespace collapsed):
//!
//! - short keywords (three characters or fewer, e.g. `LPG`, `AGO`) must equal a
//!   whole token, so `AGO` never matches inside `CHICAGO`;
//! - longer keywords match anywhere in the label with spaces removed, so
//!   `GASOIL` matches `Gas Oil`, `GASOIL(10ppm)` and `Marine-Gasoil`.
//! - a keyword written with a leading `=` (e.g. `=PETROL`) is matched on whole
//!   tokens whatever its length, so it stays clear of `PETROLEUM COKE`.

use serde::Serialize;

use crate::models::{ProductRef, UnitHint};
use crate::reference::TaxonomyRule;

/// Labels that are column headers or summary rows, never products.
const JUNK_LABELS: &[&str] = &[
    "NO", "S N", "SN", "SR NO", "S NO", "SERIAL NO", "TOTAL", "GRAND TOTAL", "SUM", "NAN", "UNNAMED",
];

const SHORT_KEYWORD_LEN: usize = 3;

/// Uppercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize_label(raw: &str) -> String {
    let replaced: String = raw
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a normalised label can never name a product.
pub fn is_junk_label(normalized: &str) -> bool {
    if normalized.is_empty() {
        return true;
    }
    if normalized.chars().all(|c| c.is_ascii_digit() || c == ' ') {
        return true;
    }
    JUNK_LABELS.contains(&normalized) || normalized.starts_with("UNNAMED ")
}

/// Outcome of mapping one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProductMapping {
    Mapped {
        product: ProductRef,
        /// Unit the rule assumes when the source gave none.
        default_unit: Option<UnitHint>,
        /// Index of the matching rule.
        rule: usize,
    },
    Unmapped,
}

impl ProductMapping {
    pub fn product(&self) -> Option<&ProductRef> {
        match self {
            Self::Mapped { product, .. } => Some(product),
            Self::Unmapped => None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped { .. })
    }
}

#[derive(Debug, Clone)]
enum Keyword {
    Token(String),
    Compact(String),
}

impl Keyword {
    fn compile(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (whole_token, raw) = match raw.strip_prefix('=') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let normalized = normalize_label(raw);
        let compact: String = normalized.chars().filter(|c| *c != ' ').collect();
        if compact.is_empty() {
            None
        } else if whole_token || compact.chars().count() <= SHORT_KEYWORD_LEN {
            Some(Self::Token(normalized))
        } else {
            Some(Self::Compact(compact))
        }
    }

    fn matches(&self, tokens: &[&str], compact: &str) -> bool {
        match self {
            Self::Token(keyword) => {
                // A short keyword may itself span tokens ("S N").
                let width = keyword.split(' ').count();
                tokens.windows(width).any(|w| w.join(" ") == *keyword)
            }
            Self::Compact(keyword) => compact.contains(keyword.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    keywords: Vec<Keyword>,
    product: ProductRef,
    default_unit: Option<UnitHint>,
}

/// Ordered keyword matcher built once per run from the taxonomy rules.
#[derive(Debug, Clone)]
pub struct TaxonomyMapper {
    rules: Vec<CompiledRule>,
}

impl TaxonomyMapper {
    pub fn new(rules: &[TaxonomyRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                keywords: rule
                    .match_keywords
                    .iter()
                    .filter_map(|k| Keyword::compile(k))
                    .collect(),
                product: ProductRef {
                    canonical_product: rule.canonical_product.clone(),
                    category: rule.category.clone(),
                },
                default_unit: rule.default_unit,
            })
            .collect();
        Self { rules }
    }

    /// Map a raw label to its canonical product.
    pub fn map_product(&self, raw_label: &str) -> ProductMapping {
        let normalized = normalize_label(raw_label);
        if is_junk_label(&normalized) {
            return ProductMapping::Unmapped;
        }
        let tokens: Vec<&str> = normalized.split(' ').collect();
        let compact: String = tokens.concat();

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.keywords.iter().any(|k| k.matches(&tokens, &compact)) {
                return ProductMapping::Mapped {
                    product: rule.product.clone(),
                    default_unit: rule.default_unit,
                    rule: index,
                };
            }
        }
        ProductMapping::Unmapped
    }
}

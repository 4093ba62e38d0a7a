// Search-term extraction from free-form AI answers
//
// Strategies are tried in order; the first match wins. When none matches
// the raw answer is treated as the candidate. The candidate must then parse
// as a JSON array of strings.

use crate::application::worker::constants::{MAX_SEARCH_TERMS, MIN_SEARCH_TERMS};
use crate::error::{AppError, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static RE_BOXED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\\boxed\{(.*)\}").unwrap());
static RE_FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
static RE_BARE_ARRAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

/// One way of locating the JSON candidate inside an answer
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract<'a>(&self, text: &'a str) -> Option<&'a str>;
}

/// `\boxed{...}` notation some reasoning models emit
pub struct BoxedNotation;

impl ExtractionStrategy for BoxedNotation {
    fn name(&self) -> &'static str {
        "boxed"
    }

    fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        RE_BOXED
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
    }
}

/// Markdown code fence, optionally tagged `json`
pub struct FencedCodeBlock;

impl ExtractionStrategy for FencedCodeBlock {
    fn name(&self) -> &'static str {
        "fenced"
    }

    fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        RE_FENCED
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Outermost `[...]` span in surrounding prose
pub struct BareArray;

impl ExtractionStrategy for BareArray {
    fn name(&self) -> &'static str {
        "bare_array"
    }

    fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        RE_BARE_ARRAY.find(text).map(|m| m.as_str())
    }
}

/// Ordered list of strategies plus JSON validation
pub struct SearchTermExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for SearchTermExtractor {
    fn default() -> Self {
        Self::standard()
    }
}

impl SearchTermExtractor {
    /// boxed, then fenced, then bare array
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(BoxedNotation),
            Box::new(FencedCodeBlock),
            Box::new(BareArray),
        ])
    }

    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// JSON candidate located by the first matching strategy, else the raw text
    pub fn candidate<'a>(&self, text: &'a str) -> &'a str {
        for strategy in &self.strategies {
            if let Some(found) = strategy.extract(text) {
                debug!(strategy = strategy.name(), "Search terms located");
                return found;
            }
        }
        text.trim()
    }

    /// Extract the search terms from an answer
    ///
    /// Terms are trimmed; empty entries and duplicates are dropped keeping
    /// first occurrence order.
    ///
    /// # Errors
    /// - AppError::Decode if the candidate is not valid JSON
    /// - AppError::Validation if it is not a non-empty array of strings
    pub fn extract(&self, text: &str) -> Result<Vec<String>> {
        let candidate = self.candidate(text);
        let value: serde_json::Value = serde_json::from_str(candidate).map_err(|e| {
            AppError::Decode(format!("AI answer is not valid JSON: {}", e))
        })?;

        let items = value.as_array().ok_or_else(|| {
            AppError::Validation("AI answer is not a JSON array".to_string())
        })?;

        let mut terms: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let term = item.as_str().ok_or_else(|| {
                AppError::Validation(format!("search term is not a string: {}", item))
            })?;
            let term = term.trim();
            if !term.is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }

        if terms.is_empty() {
            return Err(AppError::Validation(
                "AI answer contains no search terms".to_string(),
            ));
        }
        if !(MIN_SEARCH_TERMS..=MAX_SEARCH_TERMS).contains(&terms.len()) {
            warn!(
                count = terms.len(),
                expected_min = MIN_SEARCH_TERMS,
                expected_max = MAX_SEARCH_TERMS,
                "Unexpected number of search terms"
            );
        }
        Ok(terms)
    }
}

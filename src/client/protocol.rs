//! Wire types for the keyword-metrics batch endpoints
//!
//! The endpoints are loose about types: numeric fields arrive as bare numbers
//! or quoted strings, month labels in any casing, and individual items may be
//! missing their metrics object entirely. Everything is validated here before
//! it becomes a [`KeywordMetrics`] entry; malformed items are dropped, never
//! zero-filled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A JSON field the endpoints emit as either a bare number or a quoted string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    /// Numeric value, parsing quoted numbers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

// ============================================================================
// Raw Response Shape
// ============================================================================

/// Top-level batch response as received on the wire
#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    /// Must be "success" for the payload to be trusted
    pub status: String,

    /// Geographic scope reported by the endpoint
    #[serde(default)]
    pub geo_target: Option<String>,

    /// One item per keyword the endpoint chose to answer for
    #[serde(default)]
    pub data: Vec<ResponseItem>,
}

/// One keyword's slot in the response
#[derive(Debug, Deserialize)]
pub struct ResponseItem {
    #[serde(default)]
    pub keyword: String,

    pub metrics: Option<RawMetrics>,
}

/// Metrics object as received, before validation
#[derive(Debug, Deserialize)]
pub struct RawMetrics {
    pub avg_monthly_searches: Option<NumberOrString>,

    pub competition: Option<String>,

    pub competition_index: Option<NumberOrString>,

    #[serde(default)]
    pub monthly_searches: Vec<RawMonthly>,
}

/// One month in the raw search-volume series
#[derive(Debug, Deserialize)]
pub struct RawMonthly {
    pub year: Option<NumberOrString>,
    pub month: Option<NumberOrString>,
    pub searches: Option<NumberOrString>,
}

// ============================================================================
// Validated Output
// ============================================================================

/// Validated metrics payload for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetrics {
    /// Average monthly search volume
    pub avg_monthly_searches: Option<f64>,

    /// Competition tier (LOW / MEDIUM / HIGH / N/A), uppercased
    pub competition: String,

    /// Competition index on a 0-100 scale
    pub competition_index: Option<f64>,

    /// Per-month search volume series
    pub monthly_searches: Vec<MonthlySearches>,
}

/// One month of validated search volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySearches {
    pub year: Option<i32>,
    /// Uppercased month label (JAN..DEC)
    pub month: String,
    pub searches: Option<f64>,
}

impl BatchResponse {
    /// Validate every item and key the survivors by their lowercased keyword
    pub fn into_entries(self) -> HashMap<String, KeywordMetrics> {
        let mut entries = HashMap::with_capacity(self.data.len());
        for item in self.data {
            match item.into_validated() {
                Some((key, metrics)) => {
                    entries.insert(key, metrics);
                }
                None => {
                    tracing::debug!("dropping malformed response item");
                }
            }
        }
        entries
    }
}

impl ResponseItem {
    /// Accept the item only if it names a keyword and carries at least one
    /// numeric metric
    fn into_validated(self) -> Option<(String, KeywordMetrics)> {
        let key = self.keyword.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        let raw = self.metrics?;
        let avg = raw.avg_monthly_searches.as_ref().and_then(NumberOrString::as_f64);
        let index = raw.competition_index.as_ref().and_then(NumberOrString::as_f64);
        let monthly: Vec<MonthlySearches> = raw
            .monthly_searches
            .into_iter()
            .filter_map(RawMonthly::into_entry)
            .collect();

        let has_numeric = avg.is_some() || index.is_some() || monthly.iter().any(|m| m.searches.is_some());
        if !has_numeric {
            return None;
        }

        Some((
            key,
            KeywordMetrics {
                avg_monthly_searches: avg,
                competition: raw
                    .competition
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or_else(|| String::from("N/A")),
                competition_index: index,
                monthly_searches: monthly,
            },
        ))
    }
}

impl RawMonthly {
    fn into_entry(self) -> Option<MonthlySearches> {
        let month = month_label(self.month?);
        Some(MonthlySearches {
            year: self.year.and_then(|y| y.as_f64()).map(|y| y as i32),
            month,
            searches: self.searches.and_then(|s| s.as_f64()),
        })
    }
}

/// Normalize a month field to an uppercase label
fn month_label(value: NumberOrString) -> String {
    const NAMES: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    match value {
        NumberOrString::Text(s) => s.trim().to_uppercase(),
        NumberOrString::Number(n) => {
            let index = n as i64;
            if (1..=12).contains(&index) {
                NAMES[(index - 1) as usize].to_string()
            } else {
                index.to_string()
            }
        }
    }
}

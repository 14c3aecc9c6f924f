use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A validated, not-yet-persisted book parsed from one CSV row.
///
/// Title and author are trimmed and non-empty, the price is a finite number
/// ≥ 0, and the publication date parsed as an ISO 8601 calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub price: f64,
    pub publication_date: NaiveDate,
}

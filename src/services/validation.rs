use std::collections::HashSet;

use chrono::NaiveDate;
use csv_async::StringRecord;

use crate::models::book::NewBook;
use crate::models::job::RowError;

/// Columns every import file must declare in its header row. Extra columns
/// are ignored and order is irrelevant.
pub const REQUIRED_COLUMNS: [&str; 4] = ["title", "author", "price", "publication_date"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Positions of the mandatory columns within one file's header row.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    title: usize,
    author: usize,
    price: usize,
    publication_date: usize,
}

impl ColumnMap {
    /// Resolve the mandatory columns against a header record, matching
    /// ASCII case-insensitively on trimmed names.
    ///
    /// Returns the list of missing column names on failure, which fails the
    /// whole job before any row is processed.
    pub fn from_headers(headers: &StringRecord) -> Result<Self, Vec<&'static str>> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let found = (
            position("title"),
            position("author"),
            position("price"),
            position("publication_date"),
        );

        match found {
            (Some(title), Some(author), Some(price), Some(publication_date)) => Ok(Self {
                title,
                author,
                price,
                publication_date,
            }),
            (title, author, price, publication_date) => {
                let missing = [
                    ("title", title),
                    ("author", author),
                    ("price", price),
                    ("publication_date", publication_date),
                ]
                .into_iter()
                .filter(|(_, pos)| pos.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(missing)
            }
        }
    }
}

/// Why one row was rejected. Recorded, never raised: a rejection does not
/// stop processing of subsequent rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    MissingField { field: &'static str },
    InvalidPrice { message: &'static str },
    InvalidDate,
    DuplicateTitle,
}

impl RowRejection {
    pub fn field(&self) -> &'static str {
        match self {
            RowRejection::MissingField { field } => field,
            RowRejection::InvalidPrice { .. } => "price",
            RowRejection::InvalidDate => "publication_date",
            RowRejection::DuplicateTitle => "title",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RowRejection::MissingField { .. } => "missing",
            RowRejection::InvalidPrice { message } => message,
            RowRejection::InvalidDate => "expected an ISO 8601 date (YYYY-MM-DD)",
            RowRejection::DuplicateTitle => "duplicate",
        }
    }

    pub fn into_row_error(self, row: u64) -> RowError {
        RowError {
            row,
            field: self.field().to_string(),
            message: self.message().to_string(),
        }
    }
}

/// Validate one CSV row against the mandatory schema, type, and duplicate
/// rules, in that order. First failure wins; one error per row.
///
/// `seen_titles` holds lowercased titles already accepted in this job plus
/// the catalog snapshot taken at job start, so duplicate detection is
/// case-insensitive and catalog-wide.
pub fn validate_row(
    record: &StringRecord,
    columns: &ColumnMap,
    seen_titles: &HashSet<String>,
) -> Result<NewBook, RowRejection> {
    let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

    let title = cell(columns.title);
    let author = cell(columns.author);
    let price_raw = cell(columns.price);
    let date_raw = cell(columns.publication_date);

    for (field, value) in [
        ("title", title),
        ("author", author),
        ("price", price_raw),
        ("publication_date", date_raw),
    ] {
        if value.is_empty() {
            return Err(RowRejection::MissingField { field });
        }
    }

    let price: f64 = price_raw
        .parse()
        .map_err(|_| RowRejection::InvalidPrice {
            message: "not a number",
        })?;
    if !price.is_finite() {
        return Err(RowRejection::InvalidPrice {
            message: "not a number",
        });
    }
    if price < 0.0 {
        return Err(RowRejection::InvalidPrice {
            message: "negative",
        });
    }

    let publication_date = NaiveDate::parse_from_str(date_raw, DATE_FORMAT)
        .map_err(|_| RowRejection::InvalidDate)?;

    if seen_titles.contains(&title.to_lowercase()) {
        return Err(RowRejection::DuplicateTitle);
    }

    Ok(NewBook {
        title: title.to_string(),
        author: author.to_string(),
        price,
        publication_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> ColumnMap {
        let headers = StringRecord::from(vec!["title", "author", "price", "publication_date"]);
        ColumnMap::from_headers(&headers).unwrap()
    }

    fn record(title: &str, author: &str, price: &str, date: &str) -> StringRecord {
        StringRecord::from(vec![title, author, price, date])
    }

    #[test]
    fn test_valid_row() {
        let book = validate_row(
            &record("Clean Code", "Robert C. Martin", "29.99", "2008-08-11"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(book.title, "Clean Code");
        assert_eq!(book.price, 29.99);
        assert_eq!(
            book.publication_date,
            NaiveDate::from_ymd_opt(2008, 8, 11).unwrap()
        );
    }

    #[test]
    fn test_fields_are_trimmed() {
        let book = validate_row(
            &record("  Clean Code  ", " Robert C. Martin ", "29.99", "2008-08-11"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(book.title, "Clean Code");
        assert_eq!(book.author, "Robert C. Martin");
    }

    #[test]
    fn test_missing_price() {
        let err = validate_row(
            &record("X", "Y", "", "2020-01-01"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(err, RowRejection::MissingField { field: "price" });
        assert_eq!(err.field(), "price");
        assert_eq!(err.message(), "missing");
    }

    #[test]
    fn test_negative_price() {
        let err = validate_row(
            &record("X", "Y", "-5", "2020-01-01"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(err.field(), "price");
        assert_eq!(err.message(), "negative");
    }

    #[test]
    fn test_unparseable_price() {
        let err = validate_row(
            &record("X", "Y", "free", "2020-01-01"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(err.field(), "price");
        assert_eq!(err.message(), "not a number");
    }

    #[test]
    fn test_invalid_date() {
        let err = validate_row(
            &record("X", "Y", "5.00", "11 Aug 2008"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(err, RowRejection::InvalidDate);
    }

    #[test]
    fn test_duplicate_title_case_insensitive() {
        let mut seen = HashSet::new();
        seen.insert("clean code".to_string());
        let err = validate_row(
            &record("CLEAN CODE", "Other Author", "9.99", "2020-01-01"),
            &columns(),
            &seen,
        )
        .unwrap_err();
        assert_eq!(err, RowRejection::DuplicateTitle);
        assert_eq!(err.field(), "title");
        assert_eq!(err.message(), "duplicate");
    }

    #[test]
    fn test_missing_field_wins_over_bad_price() {
        // Rules apply in order: presence first, then price, date, duplicate.
        let err = validate_row(
            &record("", "Y", "not-a-price", "nope"),
            &columns(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(err, RowRejection::MissingField { field: "title" });
    }

    #[test]
    fn test_short_row_counts_as_missing() {
        let rec = StringRecord::from(vec!["Only Title"]);
        let err = validate_row(&rec, &columns(), &HashSet::new()).unwrap_err();
        assert_eq!(err, RowRejection::MissingField { field: "author" });
    }

    #[test]
    fn test_header_resolution_ignores_case_order_and_extras() {
        let headers = StringRecord::from(vec![
            "isbn",
            "Publication_Date",
            "AUTHOR",
            "price",
            "Title",
        ]);
        let cols = ColumnMap::from_headers(&headers).unwrap();
        let rec = StringRecord::from(vec![
            "978-0132350884",
            "2008-08-11",
            "Robert C. Martin",
            "29.99",
            "Clean Code",
        ]);
        let book = validate_row(&rec, &cols, &HashSet::new()).unwrap();
        assert_eq!(book.title, "Clean Code");
        assert_eq!(book.author, "Robert C. Martin");
    }

    #[test]
    fn test_header_missing_columns_reported() {
        let headers = StringRecord::from(vec!["title", "author", "price"]);
        let missing = ColumnMap::from_headers(&headers).unwrap_err();
        assert_eq!(missing, vec!["publication_date"]);
    }
}

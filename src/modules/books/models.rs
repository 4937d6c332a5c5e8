use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A book stored in the catalogue, keyed by isbn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

/// Payload for creating a book. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

impl From<NewBook> for Book {
    fn from(new_book: NewBook) -> Self {
        Self {
            isbn: new_book.isbn,
            amazon_url: new_book.amazon_url,
            author: new_book.author,
            language: new_book.language,
            pages: new_book.pages,
            publisher: new_book.publisher,
            title: new_book.title,
            year: new_book.year,
        }
    }
}

/// Partial update of a book. Absent fields are left untouched.
///
/// The isbn is the key of the row and is therefore not part of the change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
}

impl BookChanges {
    /// Column assignments for the fields present, in column order.
    pub fn assignments(&self) -> Vec<(BookColumn, ColumnValue)> {
        let text = |column, value: &Option<String>| {
            value
                .as_ref()
                .map(|v| (column, ColumnValue::Text(v.clone())))
        };
        let integer = |column, value: Option<i64>| value.map(|v| (column, ColumnValue::Integer(v)));

        [
            text(BookColumn::AmazonUrl, &self.amazon_url),
            text(BookColumn::Author, &self.author),
            text(BookColumn::Language, &self.language),
            integer(BookColumn::Pages, self.pages),
            text(BookColumn::Publisher, &self.publisher),
            text(BookColumn::Title, &self.title),
            integer(BookColumn::Year, self.year),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    /// Overwrite the fields of `book` that are present in this change set.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(amazon_url) = &self.amazon_url {
            book.amazon_url = amazon_url.clone();
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(language) = &self.language {
            book.language = language.clone();
        }
        if let Some(pages) = self.pages {
            book.pages = pages;
        }
        if let Some(publisher) = &self.publisher {
            book.publisher = publisher.clone();
        }
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(year) = self.year {
            book.year = year;
        }
    }
}

/// Rewrite whole-number floats such as `400.0` in integer columns as integers.
///
/// The schema accepts them as integers; the typed payloads would not.
pub fn normalize_integers(payload: &mut serde_json::Value) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };

    for column in BookColumn::ALL.into_iter().filter(|c| c.is_integer()) {
        let Some(value) = object.get_mut(column.as_str()) else {
            continue;
        };
        if value.is_i64() || value.is_u64() {
            continue;
        }
        if let Some(number) = value.as_f64() {
            if number.fract() == 0.0 && number >= i64::MIN as f64 && number < i64::MAX as f64 {
                *value = serde_json::Value::from(number as i64);
            }
        }
    }
}

/// Columns of the `books` table.
///
/// Column names in generated SQL only ever come from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BookColumn {
    Isbn,
    AmazonUrl,
    Author,
    Language,
    Pages,
    Publisher,
    Title,
    Year,
}

impl BookColumn {
    pub const ALL: [BookColumn; 8] = [
        BookColumn::Isbn,
        BookColumn::AmazonUrl,
        BookColumn::Author,
        BookColumn::Language,
        BookColumn::Pages,
        BookColumn::Publisher,
        BookColumn::Title,
        BookColumn::Year,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookColumn::Isbn => "isbn",
            BookColumn::AmazonUrl => "amazon_url",
            BookColumn::Author => "author",
            BookColumn::Language => "language",
            BookColumn::Pages => "pages",
            BookColumn::Publisher => "publisher",
            BookColumn::Title => "title",
            BookColumn::Year => "year",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, BookColumn::Pages | BookColumn::Year)
    }

    /// Parse a raw query-string value into the column's type.
    pub fn parse_value(self, raw: &str) -> Result<ColumnValue, FilterError> {
        if self.is_integer() {
            raw.trim()
                .parse::<i64>()
                .map(ColumnValue::Integer)
                .map_err(|_| FilterError::InvalidInteger {
                    column: self.as_str(),
                    value: raw.to_string(),
                })
        } else {
            Ok(ColumnValue::Text(raw.to_string()))
        }
    }

    /// Current value of this column on `book`.
    pub fn value_of(self, book: &Book) -> ColumnValue {
        match self {
            BookColumn::Isbn => ColumnValue::Text(book.isbn.clone()),
            BookColumn::AmazonUrl => ColumnValue::Text(book.amazon_url.clone()),
            BookColumn::Author => ColumnValue::Text(book.author.clone()),
            BookColumn::Language => ColumnValue::Text(book.language.clone()),
            BookColumn::Pages => ColumnValue::Integer(book.pages),
            BookColumn::Publisher => ColumnValue::Text(book.publisher.clone()),
            BookColumn::Title => ColumnValue::Text(book.title.clone()),
            BookColumn::Year => ColumnValue::Integer(book.year),
        }
    }
}

impl fmt::Display for BookColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookColumn {
    type Err = FilterError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        BookColumn::ALL
            .into_iter()
            .find(|column| column.as_str() == name)
            .ok_or_else(|| FilterError::UnknownColumn(name.to_string()))
    }
}

/// A typed value for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown filter column '{0}'")]
    UnknownColumn(String),

    #[error("filter '{column}' expects an integer, got '{value}'")]
    InvalidInteger { column: &'static str, value: String },
}

/// Equality conditions on book columns, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    conditions: Vec<(BookColumn, ColumnValue)>,
}

impl BookFilter {
    /// A filter matching every book.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from query-string pairs keyed by column name.
    ///
    /// A repeated key contributes one condition per occurrence.
    pub fn from_params(params: &[(String, String)]) -> Result<Self, FilterError> {
        let conditions = params
            .iter()
            .map(|(name, raw)| {
                let column: BookColumn = name.parse()?;
                Ok((column, column.parse_value(raw)?))
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        Ok(Self { conditions })
    }

    /// Add an equality condition.
    pub fn with(mut self, column: BookColumn, value: ColumnValue) -> Self {
        self.conditions.push((column, value));
        self
    }

    pub fn conditions(&self) -> &[(BookColumn, ColumnValue)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, book: &Book) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| column.value_of(book) == *value)
    }
}

/// `GET /books` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

/// Single-book response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookResponse {
    pub book: Book,
}

/// Plain message response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_book() -> Book {
        Book {
            isbn: "DM062865".to_string(),
            amazon_url: "https://amazon.com/x".to_string(),
            author: "Myatt".to_string(),
            language: "English".to_string(),
            pages: 400,
            publisher: "ChiBorn".to_string(),
            title: "Dad's First Published".to_string(),
            year: 2021,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_params_match_everything() {
        let filter = BookFilter::from_params(&[]).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_book()));
    }

    #[rstest]
    #[case(&[("author", "Myatt")], true)]
    #[case(&[("author", "Myatt"), ("year", "2021")], true)]
    #[case(&[("author", "Myatt"), ("year", "2020")], false)]
    #[case(&[("pages", " 400 ")], true)]
    #[case(&[("language", "english")], false)]
    #[case(&[("author", "Myatt"), ("author", "Someone Else")], false)]
    #[case(&[("author", "Myatt"), ("author", "Myatt")], true)]
    fn filters_combine_with_and(#[case] pairs: &[(&str, &str)], #[case] expected: bool) {
        let filter = BookFilter::from_params(&params(pairs)).unwrap();
        assert_eq!(filter.matches(&sample_book()), expected);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = BookFilter::from_params(&params(&[("isbn; DROP TABLE books", "x")])).unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownColumn("isbn; DROP TABLE books".to_string())
        );
    }

    #[test]
    fn non_numeric_integer_filter_is_rejected() {
        let err = BookFilter::from_params(&params(&[("pages", "many")])).unwrap_err();
        assert_eq!(
            err,
            FilterError::InvalidInteger {
                column: "pages",
                value: "many".to_string()
            }
        );
    }

    #[test]
    fn repeated_keys_are_all_kept() {
        let filter =
            BookFilter::from_params(&params(&[("author", "A"), ("author", "B")])).unwrap();
        assert_eq!(filter.conditions().len(), 2);
    }

    #[test]
    fn whole_number_floats_become_integers() {
        let mut payload = serde_json::json!({ "pages": 400.0, "year": 2019.5, "title": 1.0 });
        normalize_integers(&mut payload);

        assert_eq!(
            payload,
            serde_json::json!({ "pages": 400, "year": 2019.5, "title": 1.0 })
        );
    }

    #[test]
    fn changes_only_touch_present_fields() {
        let changes = BookChanges {
            title: Some("Second Edition".to_string()),
            year: Some(2024),
            ..BookChanges::default()
        };
        let mut book = sample_book();
        changes.apply_to(&mut book);

        assert_eq!(book.title, "Second Edition");
        assert_eq!(book.year, 2024);
        assert_eq!(book.author, "Myatt");
        assert_eq!(
            changes.assignments(),
            vec![
                (BookColumn::Title, ColumnValue::Text("Second Edition".to_string())),
                (BookColumn::Year, ColumnValue::Integer(2024)),
            ]
        );
    }
}

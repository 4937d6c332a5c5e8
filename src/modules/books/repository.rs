//! Persistence for books.
//!
//! [`BookRepository`] is the seam handlers depend on. [`SqlBookRepository`]
//! talks to the `books` table; [`InMemoryBookRepository`] keeps the same
//! contract in process memory for tests and local experiments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{error::ErrorKind, QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::{Book, BookChanges, BookFilter, ColumnValue, NewBook};

const BOOK_COLUMNS: &str = "isbn, amazon_url, author, language, pages, publisher, title, year";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no book found with isbn '{isbn}'")]
    NotFound { isbn: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl RepositoryError {
    fn not_found(isbn: &str) -> Self {
        Self::NotFound {
            isbn: isbn.to_string(),
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            if matches!(
                db_error.kind(),
                ErrorKind::UniqueViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation
            ) {
                return Self::ConstraintViolation(db_error.message().to_string());
            }
        }
        Self::Database(error)
    }
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Books matching every condition of `filter`; all books for an empty filter.
    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>, RepositoryError>;

    async fn find_by_isbn(&self, isbn: &str) -> Result<Book, RepositoryError>;

    /// Insert a book and return the stored row.
    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError>;

    /// Overwrite the fields present in `changes` and return the updated row.
    async fn update(&self, isbn: &str, changes: &BookChanges) -> Result<Book, RepositoryError>;

    async fn remove(&self, isbn: &str) -> Result<(), RepositoryError>;
}

fn push_value(query: &mut QueryBuilder<'_, Sqlite>, value: &ColumnValue) {
    match value {
        ColumnValue::Text(text) => query.push_bind(text.clone()),
        ColumnValue::Integer(number) => query.push_bind(*number),
    };
}

/// SQLite-backed repository over the `books` table
#[derive(Debug, Clone)]
pub struct SqlBookRepository {
    pool: SqlitePool,
}

impl SqlBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for SqlBookRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(conditions = filter.conditions().len()))]
    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {BOOK_COLUMNS} FROM books"));

        for (index, (column, value)) in filter.conditions().iter().enumerate() {
            query.push(if index == 0 { " WHERE " } else { " AND " });
            query.push(column.as_str());
            query.push(" = ");
            push_value(&mut query, value);
        }
        query.push(" ORDER BY isbn");

        let books = query
            .build_query_as::<Book>()
            .fetch_all(&self.pool)
            .await?;

        Ok(books)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%isbn))]
    async fn find_by_isbn(&self, isbn: &str) -> Result<Book, RepositoryError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?");
        sqlx::query_as::<_, Book>(&sql)
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(isbn))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(isbn = %book.isbn))]
    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError> {
        let sql = format!(
            "INSERT INTO books ({BOOK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {BOOK_COLUMNS}"
        );

        let result = sqlx::query_as::<_, Book>(&sql)
            .bind(&book.isbn)
            .bind(&book.amazon_url)
            .bind(&book.author)
            .bind(&book.language)
            .bind(book.pages)
            .bind(&book.publisher)
            .bind(&book.title)
            .bind(book.year)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(db_error))
                if matches!(db_error.kind(), ErrorKind::UniqueViolation) =>
            {
                Err(RepositoryError::ConstraintViolation(format!(
                    "a book with isbn '{}' already exists",
                    book.isbn
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%isbn))]
    async fn update(&self, isbn: &str, changes: &BookChanges) -> Result<Book, RepositoryError> {
        let assignments = changes.assignments();
        if assignments.is_empty() {
            return self.find_by_isbn(isbn).await;
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE books SET ");
        for (index, (column, value)) in assignments.iter().enumerate() {
            if index > 0 {
                query.push(", ");
            }
            query.push(column.as_str());
            query.push(" = ");
            push_value(&mut query, value);
        }
        query.push(" WHERE isbn = ");
        query.push_bind(isbn.to_string());
        query.push(format!(" RETURNING {BOOK_COLUMNS}"));

        query
            .build_query_as::<Book>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found(isbn))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%isbn))]
    async fn remove(&self, isbn: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM books WHERE isbn = ?")
            .bind(isbn)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(isbn));
        }
        Ok(())
    }
}

/// Process-local repository with the same contract as [`SqlBookRepository`]
#[derive(Debug, Default)]
pub struct InMemoryBookRepository {
    books: RwLock<BTreeMap<String, Book>>,
}

impl InMemoryBookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_books(books: impl IntoIterator<Item = Book>) -> Self {
        let books = books
            .into_iter()
            .map(|book| (book.isbn.clone(), book))
            .collect();
        Self {
            books: RwLock::new(books),
        }
    }
}

#[async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>, RepositoryError> {
        let books = self.books.read().await;
        Ok(books
            .values()
            .filter(|book| filter.matches(book))
            .cloned()
            .collect())
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Book, RepositoryError> {
        self.books
            .read()
            .await
            .get(isbn)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(isbn))
    }

    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError> {
        if book.isbn.is_empty() {
            return Err(RepositoryError::ConstraintViolation(
                "isbn must not be empty".to_string(),
            ));
        }

        let mut books = self.books.write().await;
        if books.contains_key(&book.isbn) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "a book with isbn '{}' already exists",
                book.isbn
            )));
        }

        let created = Book::from(book.clone());
        books.insert(created.isbn.clone(), created.clone());
        Ok(created)
    }

    async fn update(&self, isbn: &str, changes: &BookChanges) -> Result<Book, RepositoryError> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(isbn)
            .ok_or_else(|| RepositoryError::not_found(isbn))?;
        changes.apply_to(book);
        Ok(book.clone())
    }

    async fn remove(&self, isbn: &str) -> Result<(), RepositoryError> {
        self.books
            .write()
            .await
            .remove(isbn)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(isbn))
    }
}

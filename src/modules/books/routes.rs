//! HTTP handlers for the books module.
//!
//! - `GET /` - list books, query parameters filter by column
//! - `GET /{isbn}` - fetch one book
//! - `POST /` - create a book from a full payload
//! - `PUT /{isbn}` - update the fields present in the payload
//! - `DELETE /{isbn}` - delete a book

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bookshelf_http::error::AppError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::models::{
    normalize_integers, BookChanges, BookFilter, BookResponse, BooksResponse, FilterError,
    MessageResponse, NewBook,
};
use super::repository::{BookRepository, RepositoryError};
use super::schema::{BookSchema, ValidationMode};

/// Dependencies shared by the book handlers
#[derive(Clone)]
pub struct BooksState {
    pub repository: Arc<dyn BookRepository>,
    pub schema: Arc<BookSchema>,
}

impl BooksState {
    pub fn new(repository: Arc<dyn BookRepository>, schema: Arc<BookSchema>) -> Self {
        Self { repository, schema }
    }

    /// Validate `body` against the schema and decode it into the payload type.
    fn decode<T: DeserializeOwned>(
        &self,
        mut body: Value,
        mode: ValidationMode,
    ) -> Result<T, AppError> {
        let report = self.schema.validate(&body, mode);
        if !report.is_valid() {
            let details = report.into_errors().into_iter().map(Value::String).collect();
            return Err(AppError::validation(
                details,
                "book payload failed schema validation",
            ));
        }

        normalize_integers(&mut body);
        serde_json::from_value(body).map_err(|e| {
            AppError::validation(
                vec![json!(e.to_string())],
                "book payload failed schema validation",
            )
        })
    }
}

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { .. } => AppError::not_found(error.to_string()),
            RepositoryError::ConstraintViolation(message) => {
                AppError::conflict(vec![json!(message)], "book violates a storage constraint")
            }
            RepositoryError::Database(e) => {
                AppError::Internal(anyhow::Error::new(e).context("book storage failure"))
            }
        }
    }
}

impl From<FilterError> for AppError {
    fn from(error: FilterError) -> Self {
        AppError::bad_request(error.to_string())
    }
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// Like [`json_body`], but a request without a JSON content type is an empty object.
fn optional_json_body(
    payload: Result<Option<Json<Value>>, JsonRejection>,
) -> Result<Value, AppError> {
    payload
        .map(|body| body.map_or_else(|| json!({}), |Json(body)| body))
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{isbn}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(state)
}

/// GET / => {books: [book, ...]}
#[tracing::instrument(skip_all, fields(filters = params.len()))]
async fn list_books(
    State(state): State<BooksState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<BooksResponse>, AppError> {
    let filter = BookFilter::from_params(&params)?;
    let books = state.repository.list(&filter).await?;
    Ok(Json(BooksResponse { books }))
}

/// GET /{isbn} => {book: book}
#[tracing::instrument(skip_all, fields(%isbn))]
async fn get_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, AppError> {
    let book = state.repository.find_by_isbn(&isbn).await?;
    Ok(Json(BookResponse { book }))
}

/// POST / bookData => 201 {book: newBook}
#[tracing::instrument(skip_all)]
async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let new_book: NewBook = state.decode(json_body(payload)?, ValidationMode::Create)?;
    let book = state.repository.create(&new_book).await?;
    tracing::info!(isbn = %book.isbn, "book created");
    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

/// PUT /{isbn} bookData => {book: updatedBook}
#[tracing::instrument(skip_all, fields(%isbn))]
async fn update_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
    payload: Result<Option<Json<Value>>, JsonRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let body = optional_json_body(payload)?;

    // The isbn is the row key; a body may repeat it but not change it.
    if let Some(body_isbn) = body.get("isbn").and_then(Value::as_str) {
        if body_isbn != isbn {
            return Err(AppError::bad_request(format!(
                "isbn '{}' in body does not match isbn '{}' in path",
                body_isbn, isbn
            )));
        }
    }

    let changes: BookChanges = state.decode(body, ValidationMode::Update)?;
    let book = state.repository.update(&isbn, &changes).await?;
    tracing::info!(isbn = %book.isbn, "book updated");
    Ok(Json(BookResponse { book }))
}

/// DELETE /{isbn} => {message: "Book deleted"}
#[tracing::instrument(skip_all, fields(%isbn))]
async fn delete_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.repository.remove(&isbn).await?;
    tracing::info!(%isbn, "book deleted");
    Ok(Json(MessageResponse {
        message: "Book deleted".to_string(),
    }))
}

//! End-to-end tests of the books API over an in-memory SQLite database.

use std::path::Path;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use bookshelf_app::{
    modules::books::models::{Book, BookResponse, BooksResponse, MessageResponse},
    Application,
};
use bookshelf_kernel::settings::Settings;
use pretty_assertions::assert_eq;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> Router {
    let mut settings = Settings::default();
    settings.database.url = "sqlite::memory:".to_string();

    let app = Application::bootstrap(settings).await.unwrap();
    assert!(app.registry().get_module("books").is_some());
    app.router().unwrap()
}

async fn shipped_config_app() -> Router {
    let config_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let mut settings = Settings::from_dir(&config_dir, "local").unwrap();
    settings.database.url = "sqlite::memory:".to_string();

    Application::bootstrap(settings).await.unwrap().router().unwrap()
}

fn scenario_book() -> Value {
    json!({
        "isbn": "DM062865",
        "amazon_url": "https://amazon.com/x",
        "author": "Myatt",
        "language": "English",
        "pages": 400,
        "publisher": "ChiBorn",
        "title": "Dad's First Published",
        "year": 2021
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    app.clone().oneshot(request).await.unwrap()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn book_lifecycle_scenario() {
    let app = test_app().await;

    let response = send(&app, "POST", "/books", Some(scenario_book())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: BookResponse = read_json(response).await;
    let expected: Book = serde_json::from_value(scenario_book()).unwrap();
    assert_eq!(created.book, expected);

    let response = send(&app, "GET", "/books", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Value = read_json(response).await;
    let books = listed["books"].as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert!(books[0].get("amazon_url").is_some());

    let response = send(&app, "GET", "/books/DM062865", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: BookResponse = read_json(response).await;
    assert_eq!(fetched.book, expected);

    let response = send(&app, "DELETE", "/books/DM062865", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let deleted: MessageResponse = read_json(response).await;
    assert_eq!(deleted.message, "Book deleted");

    let response = send(&app, "GET", "/books/DM062865", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_isbn_is_404_for_get_put_and_delete() {
    let app = test_app().await;

    let get = send(&app, "GET", "/books/24", None).await;
    let put = send(&app, "PUT", "/books/24", Some(json!({ "year": 2019 }))).await;
    let delete = send(&app, "DELETE", "/books/24", None).await;

    assert_eq!(get.status(), StatusCode::NOT_FOUND);
    assert_eq!(put.status(), StatusCode::NOT_FOUND);
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_create_leaves_storage_untouched() {
    let app = test_app().await;

    let response = send(&app, "POST", "/books", Some(json!({ "title": "Money Being Made" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listed: BooksResponse = read_json(send(&app, "GET", "/books", None).await).await;
    assert!(listed.books.is_empty());
}

#[tokio::test]
async fn invalid_update_leaves_row_untouched() {
    let app = test_app().await;
    send(&app, "POST", "/books", Some(scenario_book())).await;

    let response = send(
        &app,
        "PUT",
        "/books/DM062865",
        Some(json!({ "author": 42, "pages": 0 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let fetched: BookResponse = read_json(send(&app, "GET", "/books/DM062865", None).await).await;
    assert_eq!(fetched.book.author, "Myatt");
    assert_eq!(fetched.book.pages, 400);
}

#[tokio::test]
async fn update_then_filter_by_new_values() {
    let app = test_app().await;
    send(&app, "POST", "/books", Some(scenario_book())).await;

    let mut second = scenario_book();
    second["isbn"] = json!("123456789");
    second["author"] = json!("Green Back");
    second["language"] = json!("Spanish");
    second["year"] = json!(1965);
    send(&app, "POST", "/books", Some(second)).await;

    let response = send(
        &app,
        "PUT",
        "/books/DM062865",
        Some(json!({ "language": "Swahili", "year": 2019 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: BookResponse = read_json(response).await;
    assert_eq!(updated.book.language, "Swahili");
    assert_eq!(updated.book.year, 2019);

    let filtered: BooksResponse =
        read_json(send(&app, "GET", "/books?language=Swahili&year=2019", None).await).await;
    assert_eq!(filtered.books.len(), 1);
    assert_eq!(filtered.books[0].isbn, "DM062865");

    let none: BooksResponse =
        read_json(send(&app, "GET", "/books?language=Swahili&year=1965", None).await).await;
    assert!(none.books.is_empty());

    let bad = send(&app, "GET", "/books?year=recent", None).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let app = test_app().await;

    let first = send(&app, "POST", "/books", Some(scenario_book())).await;
    let second = send(&app, "POST", "/books", Some(scenario_book())).await;

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = test_app().await;

    let health = send(&app, "GET", "/healthz", None).await;
    assert_eq!(health.status(), StatusCode::OK);

    let doc: Value = read_json(send(&app, "GET", "/docs/openapi.json", None).await).await;
    assert!(doc["paths"]["/books"]["post"].is_object());
    assert!(doc["paths"]["/books/{isbn}"]["put"].is_object());
    assert!(doc["components"]["schemas"]["Book"].is_object());
}

#[tokio::test]
async fn shipped_config_bootstraps_and_validates() {
    let app = shipped_config_app().await;

    let created = send(&app, "POST", "/books", Some(scenario_book())).await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let mut extra = scenario_book();
    extra["isbn"] = json!("123456789");
    extra["rating"] = json!(5);
    let rejected = send(&app, "POST", "/books", Some(extra)).await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn put_without_body_on_unknown_isbn_is_404() {
    let app = test_app().await;

    let response = send(&app, "PUT", "/books/24", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

pub mod models;
pub mod repository;
pub mod routes;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bookshelf_kernel::{InitCtx, Migration, Module};

use repository::BookRepository;
use routes::BooksState;
use schema::BookSchema;

/// Schema of the `books` table, applied by the db crate's migration runner.
pub const MIGRATIONS: &[Migration] = &[Migration::new(
    "001_create_books",
    r#"
        CREATE TABLE IF NOT EXISTS books (
            isbn       TEXT    NOT NULL PRIMARY KEY CHECK (isbn <> ''),
            amazon_url TEXT    NOT NULL,
            author     TEXT    NOT NULL,
            language   TEXT    NOT NULL,
            pages      INTEGER NOT NULL CHECK (pages > 0),
            publisher  TEXT    NOT NULL,
            title      TEXT    NOT NULL,
            year       INTEGER NOT NULL
        );
        "#,
)];

/// Books catalogue module, mounted at `/books`
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(repository: Arc<dyn BookRepository>, schema: Arc<BookSchema>) -> Self {
        Self {
            state: BooksState::new(repository, schema),
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            required_fields = self.state.schema.required().len(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment(&self.state.schema))
    }

    fn migrations(&self) -> Vec<Migration> {
        MIGRATIONS.to_vec()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{}", schema) }
            }
        }
    })
}

/// Component schemas derived from the configured book schema document.
fn book_component_schemas(schema: &BookSchema) -> (serde_json::Value, serde_json::Value) {
    let mut book = schema.document().clone();
    if let Some(object) = book.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }

    let mut changes = book.clone();
    if let Some(object) = changes.as_object_mut() {
        object.remove("required");
    }

    (book, changes)
}

fn openapi_fragment(schema: &BookSchema) -> serde_json::Value {
    let isbn_parameter = serde_json::json!({
        "name": "isbn",
        "in": "path",
        "required": true,
        "schema": { "type": "string" }
    });

    let filter_parameters: Vec<serde_json::Value> = models::BookColumn::ALL
        .iter()
        .map(|column| {
            let kind = if column.is_integer() { "integer" } else { "string" };
            serde_json::json!({
                "name": column.as_str(),
                "in": "query",
                "required": false,
                "schema": { "type": kind }
            })
        })
        .collect();

    let (book_schema, changes_schema) = book_component_schemas(schema);

    serde_json::json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": filter_parameters,
                    "responses": {
                        "200": json_response("Books matching every filter", "BooksResponse"),
                        "400": error_response("Unknown filter column or ill-typed value"),
                        "500": error_response("Internal server error")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/Book" }
                            }
                        }
                    },
                    "responses": {
                        "201": json_response("Created book", "BookResponse"),
                        "400": error_response("Payload failed schema validation"),
                        "409": error_response("A book with this isbn already exists")
                    }
                }
            },
            "/{isbn}": {
                "get": {
                    "summary": "Get a book by isbn",
                    "tags": ["Books"],
                    "parameters": [isbn_parameter.clone()],
                    "responses": {
                        "200": json_response("The book", "BookResponse"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Update the supplied fields of a book",
                    "tags": ["Books"],
                    "parameters": [isbn_parameter.clone()],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/BookChanges" }
                            }
                        }
                    },
                    "responses": {
                        "200": json_response("Updated book", "BookResponse"),
                        "400": error_response("Payload failed schema validation"),
                        "404": error_response("Book not found")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [isbn_parameter],
                    "responses": {
                        "200": json_response("Deletion message", "MessageResponse"),
                        "404": error_response("Book not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": book_schema,
                "BookChanges": changes_schema,
                "BookResponse": {
                    "type": "object",
                    "properties": { "book": { "$ref": "#/components/schemas/Book" } },
                    "required": ["book"]
                },
                "BooksResponse": {
                    "type": "object",
                    "properties": {
                        "books": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } }
                    },
                    "required": ["books"]
                },
                "MessageResponse": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            }
        }
    })
}

/// Create a new instance of the books module
pub fn create_module(
    repository: Arc<dyn BookRepository>,
    schema: Arc<BookSchema>,
) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(repository, schema))
}

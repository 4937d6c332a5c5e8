pub mod books;

use std::sync::Arc;

use anyhow::Context;
use bookshelf_kernel::{settings::Settings, ModuleRegistry};
use sqlx::SqlitePool;

use books::{repository::SqlBookRepository, schema::BookSchema};

/// Register all project-specific modules with the registry
pub fn register_all(
    registry: &mut ModuleRegistry,
    pool: &SqlitePool,
    settings: &Settings,
) -> anyhow::Result<()> {
    let schema = BookSchema::load(settings.books.schema_path.as_deref())
        .with_context(|| "failed to load book schema")?;
    let repository = Arc::new(SqlBookRepository::new(pool.clone()));

    registry.register(books::create_module(repository, Arc::new(schema)))?;
    Ok(())
}

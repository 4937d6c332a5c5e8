use anyhow::Context;
use axum::Router;
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use sqlx::SqlitePool;

use crate::modules;

/// A connected, migrated, and initialized application
pub struct Application {
    settings: Settings,
    pool: SqlitePool,
    registry: ModuleRegistry,
}

impl Application {
    /// Connect to the database, register modules, apply their migrations,
    /// and run module initialization.
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let pool = bookshelf_db::connect(&settings.database).await?;

        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &pool, &settings)?;

        let applied = bookshelf_db::apply_migrations(&pool, &registry.collect_migrations())
            .await
            .with_context(|| "failed to apply module migrations")?;
        tracing::info!(applied, "database schema up to date");

        let ctx = InitCtx {
            settings: &settings,
        };
        registry.init_modules(&ctx).await?;

        Ok(Self {
            settings,
            pool,
            registry,
        })
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// The full HTTP router with every module mounted
    pub fn router(&self) -> anyhow::Result<Router> {
        bookshelf_http::build_router(&self.registry, &self.settings)
    }

    /// Start modules, serve HTTP until shutdown, then stop modules and close the pool.
    pub async fn serve(self) -> anyhow::Result<()> {
        let ctx = InitCtx {
            settings: &self.settings,
        };
        self.registry.start_modules(&ctx).await?;

        let served = bookshelf_http::start_server(&self.registry, &self.settings).await;

        self.registry.stop_modules().await?;
        self.pool.close().await;
        served
    }
}

/// Apply pending migrations without starting the server.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = bookshelf_db::connect(&settings.database).await?;

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, &pool, settings)?;

    let applied = bookshelf_db::apply_migrations(&pool, &registry.collect_migrations()).await?;
    pool.close().await;
    Ok(applied)
}

//! The contract between feature modules and the application shell.
//!
//! A module contributes routes, an OpenAPI fragment, and SQL migrations, and
//! receives lifecycle callbacks in this order: migrations are applied, then
//! `init`, then `start` once the server is about to accept traffic, then
//! `stop` on shutdown.

use async_trait::async_trait;
use axum::Router;

use crate::settings::Settings;

/// Borrowed application state handed to lifecycle hooks
pub struct InitCtx<'a> {
    pub settings: &'a Settings,
}

/// One forward-only SQL migration, identified by `id` within its module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub const fn new(id: &'static str, up: &'static str) -> Self {
        Self { id, up }
    }
}

#[async_trait]
pub trait Module: Sync + Send {
    /// Registry key and mount prefix; routes are served under `/{name}`
    fn name(&self) -> &'static str;

    /// Runs once after this module's migrations have been applied.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Router with paths relative to the mount prefix
    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI `paths` and `components` for this module, with paths relative
    /// to the mount prefix. Merged into `/docs/openapi.json`.
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Migrations are applied ordered by `id`, each at most once.
    fn migrations(&self) -> Vec<Migration> {
        Vec::new()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called in reverse registration order during shutdown.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

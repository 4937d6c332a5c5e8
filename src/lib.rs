//! Bookshelf application library
//!
//! Wires the books module onto the framework crates and exposes the
//! bootstrap used by the server binary and the CLI.

pub mod app;
pub mod modules;

pub use app::Application;

//! Bookshare server
//!
//! REST JSON API for a small book-sharing community: members list the books
//! they own, ask each other to borrow them, and owners approve, reject and
//! take back loans. Owners are emailed when someone asks for one of their books.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

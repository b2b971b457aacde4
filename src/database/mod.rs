/*!
 * Database module for persistent storage of translation requests and settings.
 *
 * This module provides SQLite-based persistence for:
 * - Translation requests and their lifecycle status
 * - Key/value settings (provider selection, endpoints, credentials)
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;

/*!
 * Database module for persistent storage.
 *
 * This module provides SQLite-based persistence for:
 * - The terminology store behind the glossary matcher
 * - The durable tier of the translation cache
 */

pub mod connection;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::{DurableCacheStats, Repository};

//! Typed URL sync database layer.
//!
//! Provides SQLite connection management and schema migrations.
//!
//! # Usage
//!
//! ```no_run
//! use typed_url_sync::database::Database;
//!
//! let history_db = Database::open("History.db").expect("failed to open history database");
//! let sync_db = Database::open_in_memory().expect("failed to open sync database");
//!
//! let conn = history_db.connection();
//! # let _ = (conn, sync_db);
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;

pub mod command;
pub mod database;

// Trait-based abstractions for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use database::{Connection, DatabaseDumper, DumpRequest, MysqlDumper};
pub use executor::{CommandExecutor, RealExecutor};

//! Test utilities for mariadb-backup
//!
//! This crate provides shared test utilities, fixtures and re-exports of the
//! mock implementations shipped by the main crate.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::with_minimal_config();
//!     let path = ctx.write_config().unwrap();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use mariadb_backup::config::{
    Config, DatabaseConfig, DumpConfig, LoggingSettings, Overrides, PruneConfig, ScheduleConfig,
    ScriptsConfig, Settings, TargetConfig,
};
pub use mariadb_backup::storage::{Credentials, Storage};

// Re-export mock implementations from the main crate
pub use mariadb_backup::managers::timer::mock::ManualClock;
pub use mariadb_backup::storage::mock::MemoryStorage;
pub use mariadb_backup::utils::database::mock::{DumperCall, MockDumper};
pub use mariadb_backup::utils::executor::mock::{MockExecutor, MockResponse};
pub use mariadb_backup::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;

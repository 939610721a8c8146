//! MariaDB Backup Library
//!
//! Scheduled dumps of a MariaDB/MySQL server to local, SMB and S3 targets,
//! with retention-based pruning.

pub mod artifact;
pub mod compression;
pub mod config;
pub mod managers;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, resolve_settings, Config, Overrides, Settings};
pub use managers::dump::{DumpError, DumpManager, DumpOptions, DumpReport};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::prune::{prune, PruneError, PruneReport};
pub use managers::restore::{RestoreError, RestoreManager};
pub use managers::retention::Retention;
pub use managers::timer::{Scheduler, TimerConfig};
pub use storage::{parse_url, Storage, StorageError};

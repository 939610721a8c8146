//! Unit tests for mariadb-backup
//!
//! These exercise configuration, retention, pruning and scheduling through
//! the public library API, without a database server.

mod prune;
mod timer;

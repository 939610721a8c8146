//! Integration tests for mariadb-backup
//!
//! These tests require Docker and the MariaDB client tools, and run a full
//! dump/prune/restore cycle against a real server.
//! Run with: `cargo test -p mariadb-backup-tests --test integration -- --ignored`

mod common;
mod mariadb;

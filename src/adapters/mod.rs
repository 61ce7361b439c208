//! Infrastructure adapters. Implement outbound ports.
//!
//! SQLite/JSON persistence, attachment files, notifications, terminal UI. Map errors to DomainError.

pub mod notify;
pub mod persistence;
pub mod ui;

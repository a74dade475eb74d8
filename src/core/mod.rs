//! core
//!
//! Domain types and schemas for flexlate.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName, Fingerprint
//! - [`transaction`] - The transaction envelope carried in commit messages
//! - [`naming`] - Branch roles and feature-scoped naming
//! - [`config`] - Tool configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Nothing here touches the repository

pub mod config;
pub mod naming;
pub mod transaction;
pub mod types;

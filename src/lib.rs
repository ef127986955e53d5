//! ordersync - incremental two-way order sync between SQLite and WooCommerce
//!
//! This crate provides the core functionality for the `ordersync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`sync`] - Sync engine, cursors, mappers and conflict arbitration
//! - [`storage`] - SQLite database layer (entity tables, cursors, sync log)
//! - [`remote`] - Remote API seam and the WooCommerce REST client
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, ErrorCode, Result};

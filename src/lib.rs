//! Book Repository Bulk Import
//!
//! This library provides the core functionality for the book-import system:
//! a book catalog backed by PostgreSQL with an asynchronous CSV bulk-import
//! pipeline. Uploads are accepted over HTTP, handed to a Redis-backed job
//! queue, and processed by a separate worker that streams the file row by
//! row, validating and persisting each record while publishing progress to a
//! shared status record the caller can poll.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

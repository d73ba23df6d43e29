//! linkvault - URL shortener core
//!
//! Maps long URLs to short codes and back, with per-user ownership, soft
//! deletion and aggregate statistics. Transport (HTTP/RPC) is left to the
//! embedding application.
//!
//! # Architecture
//! - `utils`: short code generation
//! - `storage`: `Storage` trait with memory, JSON-lines file and SeaORM backends
//! - `deletion`: bounded asynchronous soft-delete pipeline
//! - `services`: `ShortenerService`, the operations exposed to transport
//! - `config`: layered static configuration (TOML + `LV__` env vars)
//! - `errors`: `ShortenerError` and its transport-facing `ErrorKind`
//! - `system`: logging and shutdown helpers

pub mod config;
pub mod deletion;
pub mod errors;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;

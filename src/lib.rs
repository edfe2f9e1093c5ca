//! Purpose: Library crate behind the `wirecheck` CLI and its tests.
//! Exports: one module per drill (`listen`, `serve`, `client`, `block`, `multipart`, `upload`, `clock`)
//! plus `core` (errors) and `logging`.
//! Role: Each drill is independent; they share only the error type and tracing setup.
//! Invariants: Failures surface as `core::error::Error` with the underlying cause attached.
pub mod block;
pub mod client;
pub mod clock;
pub mod core;
pub mod listen;
pub mod logging;
pub mod multipart;
pub mod serve;
pub mod upload;
pub mod user;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};

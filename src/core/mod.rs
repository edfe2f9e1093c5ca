//! Purpose: Internal building blocks shared by every drill.
//! Exports: `error`.
pub mod error;

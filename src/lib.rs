//! Server-side rendering middleware for axum.
//!
//! The [`ssr`] module holds the pipeline; [`cache`] keeps rendered documents
//! per viewer; [`config`] and [`infra`] wire the standalone server binary.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
pub mod ssr;

//! Storage infrastructure: configuration file and durable store adapters.
//!
//! - **`config`**         – TOML configuration with per-field defaults.
//! - **`document_store`** – [`DocumentStore`](crate::application::credentials::DocumentStore)
//!   over a JSON file, plus an in-memory variant.
//! - **`trust_file`**     – [`TrustFile`](crate::application::legacy_trust::TrustFile)
//!   over a JSON file, plus an in-memory variant.
//!
//! Both JSON files are rewritten whole through a temp-file-and-rename.

mod atomic;
pub mod config;
pub mod document_store;
pub mod trust_file;

// src/lib.rs

pub mod classify;
pub mod consolidate;
pub mod db;
pub mod import;
pub mod ingest;
pub mod matching;
pub mod models;
pub mod session;
pub mod store;
pub mod utils;

pub use session::{AutoConfirmMode, ImportSession};

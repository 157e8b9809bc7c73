// src/import/mod.rs

pub mod executor;

pub use executor::{execute, write_with_fallback};

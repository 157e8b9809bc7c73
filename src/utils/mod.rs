// src/utils/mod.rs

pub mod progress;

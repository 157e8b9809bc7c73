// src/models/mod.rs

pub mod core;
pub mod matching;
pub mod results;

pub use self::core::*;
pub use self::matching::*;
pub use self::results::*;

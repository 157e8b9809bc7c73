// src/matching/mod.rs

pub mod normalize;
pub mod resolver;

// src/utils/mod.rs

pub mod shuffle;

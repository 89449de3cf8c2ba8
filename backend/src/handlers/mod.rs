// src/handlers/mod.rs

pub mod history;
pub mod progression;
pub mod quiz;

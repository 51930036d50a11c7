//! Facial Emotion Recognition Service Library

pub mod config;
pub mod engine;
pub mod service;
pub mod api;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;

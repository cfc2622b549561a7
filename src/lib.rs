//! quizgen: quiz batches from study-group notes
//!
//! Finds study steps that have ended, asks a language model for twenty question stems and then
//! for four answer choices per stem, shuffles the choices and stores the batch atomically at
//! most once per step and calendar day.

pub mod cli;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod provider;
pub mod rate_limit;
pub mod scanner;
pub mod store;
pub mod types;

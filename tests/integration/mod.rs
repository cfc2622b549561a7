//! Integration tests for the quiz-generation pipeline

mod concurrency;
mod coordinator_e2e;
mod idempotence;
mod scanner;
mod sled_store;
mod validator;

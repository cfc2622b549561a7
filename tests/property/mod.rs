//! Property-based tests for answer shuffling and normalization

mod shuffle;

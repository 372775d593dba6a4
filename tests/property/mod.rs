//! Property-based tests for the pure derivations

mod determinism;

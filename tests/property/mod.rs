// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! - `addressing`: uniqueness and determinism of node addresses
//! - `ordering`: creation order respects every dependency; cycles are rejected
//! - `lifecycle`: create outcomes for random failure sets

mod addressing;
mod lifecycle;
mod ordering;

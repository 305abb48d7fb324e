//! Exact probability primitives.

pub mod combinatorics;

pub use combinatorics::{hypergeometric_tail, ln_n_choose_r, n_choose_r};

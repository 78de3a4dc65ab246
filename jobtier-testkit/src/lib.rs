//! Shared fixtures for jobtier tests and benchmarks.

mod job;
mod mock;

pub use job::*;
pub use mock::*;

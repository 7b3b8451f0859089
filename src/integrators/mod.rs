//! Monte Carlo integrators.
pub mod plain;

//! Linear algebra support for the estimators.
//!
//! Condition checks ahead of inversion and the (real) matrix square root of covariances.

pub mod rcond;
pub mod sqrt;

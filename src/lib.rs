//! Sparse Cholesky smoke test for symmetric positive-definite matrices.
//!
//! A coordinate-format matrix is read with [`loaders::mtx`], reduced to its lower triangle,
//! factorized with one of the [`linalg::cholesky`] solvers and solved against `b[i] = i + 1`.
//! The solution is then checked by recomputing `A x` directly from the stored lower triangle.
pub type E = f64;
pub type I = usize;

pub mod config;
pub mod context;
pub mod driver;
pub mod linalg;
pub mod verify;

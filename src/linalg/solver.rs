use derive_more::{Display, Error};
use faer::sparse::SparseColMatRef;
use faer::{Mat, MatMut, MatRef};
use problemo::Problem;

use crate::{E, I};

#[derive(Debug, Display, Error, PartialEq)]
pub enum LinearSolverError {
    #[display("Symbolic factorization error")]
    SymbolicFactorization,

    #[display("Numeric factorization error")]
    NumericFactorization,

    #[display("Uninitialized error")]
    Uninitialized,

    #[display("Memory reservation failed")]
    MemoryReservation,

    #[display("Memory allocation failed")]
    MemoryAllocation,

    #[display("Dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Trait for sparse Cholesky solvers of symmetric positive-definite systems.
///
/// The matrix passed to `analyze` and `factorize` is symmetric with only its lower triangle
/// stored. Implementors must call `analyze` and `factorize` before solving systems.
pub trait Solver {
    fn new() -> Self
    where
        Self: Sized;

    /// Short name of the factorization method, for reporting.
    fn name(&self) -> &'static str;

    /// Computes a fill-reducing ordering and the symbolic structure of the factor.
    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem>;

    /// Computes the numeric factor. Fails if the matrix is not positive definite.
    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem>;

    /// Solves the linear system in place for the given right-hand side `b`.
    fn solve_in_place(&self, b: &mut MatMut<E>) -> Result<(), Problem>;

    /// Solves the linear system for the given right-hand side `b` and returns the solution.
    fn solve(&self, b: MatRef<E>) -> Result<Mat<E>, Problem> {
        let mut sol = b.to_owned();
        self.solve_in_place(&mut sol.as_mut())?;
        Ok(sol)
    }

    /// Number of stored values in the numeric factor, once `factorize` has succeeded.
    fn factor_nnz(&self) -> Option<usize>;
}

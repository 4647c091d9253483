//! # Sparse Cholesky Solvers for Symmetric Positive-Definite Matrices
//!
//! This module implements the [`Solver`] trait on top of Faer's sparse LLT factorization. It
//! includes:
//! - The [`SimplicialSparseCholesky`] solver, column-by-column factorization suited to small or
//!   very sparse factors.
//! - The [`SupernodalSparseCholesky`] solver, which groups columns into dense supernodes.
//! - Helpers for the fill-reducing permutation and the permuted triangles fed to Faer.
//!
//! Input matrices are symmetric with only the lower triangle stored. Both solvers use zero
//! regularization, so a matrix that is not positive definite makes `factorize` fail.
//!
//! ## Example Usage
//! ```
//! use faer::sparse::Triplet;
//! use spd_check::linalg::cholesky::SimplicialSparseCholesky;
//! use spd_check::linalg::solver::Solver;
//! use spd_check::linalg::sparse::assemble_lower;
//!
//! // Lower triangle of a symmetric positive definite matrix
//! let triplets = vec![
//!     Triplet::new(0, 0, 2.0),
//!     Triplet::new(1, 0, -1.0),
//!     Triplet::new(1, 1, 2.0),
//!     Triplet::new(2, 1, -1.0),
//!     Triplet::new(2, 2, 2.0),
//! ];
//! let mat = assemble_lower(3, &triplets).unwrap();
//!
//! let mut solver = SimplicialSparseCholesky::new();
//! solver.analyze(mat.as_ref()).unwrap();
//! solver.factorize(mat.as_ref()).unwrap();
//! let b = faer::Mat::from_fn(3, 1, |i, _| (i + 1) as f64);
//! let x = solver.solve(b.as_ref()).unwrap();
//! ```
use faer::dyn_stack::{MemBuffer, MemStack, StackReq};
use faer::linalg::cholesky::llt::factor::LltRegularization;
use faer::perm::{Perm, PermRef};
use faer::prelude::ReborrowMut;
use faer::sparse::linalg::amd;
use faer::sparse::linalg::cholesky::simplicial::{
    self, SimplicialLltRef, SymbolicSimplicialCholesky,
};
use faer::sparse::linalg::cholesky::supernodal::{
    self, SupernodalLltRef, SymbolicSupernodalCholesky,
};
use faer::sparse::{SparseColMat, SparseColMatRef, SymbolicSparseColMat};
use faer::{Conj, MatMut, Par, Side};
use problemo::{Problem, ProblemResult};

use crate::linalg::solver::{LinearSolverError, Solver};
use crate::{E, I};

/// Sparse Cholesky solver using the simplicial factorization method.
///
/// All fields are uninitialized (`None` or empty) until `analyze` and `factorize` are called.
#[allow(non_snake_case)]
pub struct SimplicialSparseCholesky {
    /// Symbolic analysis data for the Cholesky factorization (set by `analyze`).
    symbolic: Option<SymbolicSimplicialCholesky<I>>,
    /// Numeric factorization values (set by `factorize`).
    L_values: Vec<E>,
    /// Fill-reducing permutation (set by `analyze`).
    perm: Option<Perm<I>>,
    factorized: bool,
}

impl Solver for SimplicialSparseCholesky {
    fn new() -> Self {
        Self {
            symbolic: None,
            L_values: Vec::new(),
            perm: None,
            factorized: false,
        }
    }

    fn name(&self) -> &'static str {
        "simplicial"
    }

    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let dim = square_dim(mat)?;
        let nnz = mat.compute_nnz();

        let perm = fill_reducing_permutation(mat)?;
        let mat_upper = permuted_triangle(mat, perm.as_ref(), Side::Upper)?;

        let symbolic = {
            let mut mem = MemBuffer::try_new(StackReq::any_of(&[
                simplicial::prefactorize_symbolic_cholesky_scratch::<I>(dim, nnz),
                simplicial::factorize_simplicial_symbolic_cholesky_scratch::<I>(dim),
            ]))
            .via(LinearSolverError::MemoryAllocation)?;
            let stack = MemStack::new(&mut mem);

            let (etree, col_counts) = elimination_tree(mat_upper.as_ref(), stack)?;
            simplicial::factorize_simplicial_symbolic_cholesky(
                mat_upper.symbolic(),
                // SAFETY: `etree` was filled by `simplicial::prefactorize_symbolic_cholesky`.
                unsafe { simplicial::EliminationTreeRef::from_inner(&etree) },
                &col_counts,
                stack,
            )
            .via(LinearSolverError::SymbolicFactorization)?
        };
        log::debug!(
            "Simplicial analysis: dim = {dim}, factor values = {}",
            symbolic.len_val()
        );

        self.symbolic = Some(symbolic);
        self.perm = Some(perm);
        self.L_values.clear();
        self.factorized = false;
        Ok(())
    }

    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or(LinearSolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        let dim = square_dim(mat)?;
        if dim != symbolic.ncols() {
            return Err(LinearSolverError::DimensionMismatch {
                expected: symbolic.ncols(),
                got: dim,
            }
            .into());
        }

        self.factorized = false;
        self.L_values = alloc_values(symbolic.len_val())?;

        let mat_upper = permuted_triangle(mat, perm.as_ref(), Side::Upper)?;

        let mut mem = MemBuffer::try_new(
            simplicial::factorize_simplicial_numeric_llt_scratch::<I, E>(dim),
        )
        .via(LinearSolverError::MemoryAllocation)?;

        simplicial::factorize_simplicial_numeric_llt::<I, E>(
            &mut self.L_values,
            mat_upper.as_ref(),
            LltRegularization::default(),
            symbolic,
            MemStack::new(&mut mem),
        )
        .via(LinearSolverError::NumericFactorization)?;

        self.factorized = true;
        Ok(())
    }

    fn solve_in_place(&self, sol: &mut MatMut<E>) -> Result<(), Problem> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or(LinearSolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        if !self.factorized {
            return Err(LinearSolverError::Uninitialized.into());
        }

        let dim = symbolic.ncols();
        check_rhs(dim, sol)?;

        let mut mem = MemBuffer::try_new(StackReq::all_of(&[
            faer::perm::permute_rows_in_place_scratch::<I, E>(dim, sol.ncols()),
            symbolic.solve_in_place_scratch::<E>(sol.ncols()),
        ]))
        .via(LinearSolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        let llt = SimplicialLltRef::<'_, I, E>::new(symbolic, &self.L_values);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref(), stack);
        llt.solve_in_place_with_conj(Conj::No, sol.rb_mut(), Par::Seq, stack);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref().inverse(), stack);

        Ok(())
    }

    fn factor_nnz(&self) -> Option<usize> {
        self.symbolic
            .as_ref()
            .filter(|_| self.factorized)
            .map(|symbolic| symbolic.len_val())
    }
}

/// Sparse Cholesky solver using the supernodal factorization method.
///
/// All fields are uninitialized (`None` or empty) until `analyze` and `factorize` are called.
#[allow(non_snake_case)]
pub struct SupernodalSparseCholesky {
    /// Symbolic analysis data for the Cholesky factorization (set by `analyze`).
    symbolic: Option<SymbolicSupernodalCholesky<I>>,
    /// Numeric factorization values (set by `factorize`).
    L_values: Vec<E>,
    /// Fill-reducing permutation (set by `analyze`).
    perm: Option<Perm<I>>,
    factorized: bool,
}

impl Solver for SupernodalSparseCholesky {
    fn new() -> Self {
        Self {
            symbolic: None,
            L_values: Vec::new(),
            perm: None,
            factorized: false,
        }
    }

    fn name(&self) -> &'static str {
        "supernodal"
    }

    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let dim = square_dim(mat)?;
        let nnz = mat.compute_nnz();

        let perm = fill_reducing_permutation(mat)?;
        let mat_upper = permuted_triangle(mat, perm.as_ref(), Side::Upper)?;

        let symbolic = {
            let mut mem = MemBuffer::try_new(StackReq::any_of(&[
                simplicial::prefactorize_symbolic_cholesky_scratch::<I>(dim, nnz),
                supernodal::factorize_supernodal_symbolic_cholesky_scratch::<I>(dim),
            ]))
            .via(LinearSolverError::MemoryAllocation)?;
            let stack = MemStack::new(&mut mem);

            let (etree, col_counts) = elimination_tree(mat_upper.as_ref(), stack)?;
            supernodal::factorize_supernodal_symbolic_cholesky(
                mat_upper.symbolic(),
                // SAFETY: `etree` was filled by `simplicial::prefactorize_symbolic_cholesky`.
                unsafe { simplicial::EliminationTreeRef::from_inner(&etree) },
                &col_counts,
                stack,
                faer::sparse::linalg::SymbolicSupernodalParams { relax: None },
            )
            .via(LinearSolverError::SymbolicFactorization)?
        };
        log::debug!(
            "Supernodal analysis: dim = {dim}, factor values = {}",
            symbolic.len_val()
        );

        self.symbolic = Some(symbolic);
        self.perm = Some(perm);
        self.L_values.clear();
        self.factorized = false;
        Ok(())
    }

    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or(LinearSolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        let dim = square_dim(mat)?;
        if dim != symbolic.ncols() {
            return Err(LinearSolverError::DimensionMismatch {
                expected: symbolic.ncols(),
                got: dim,
            }
            .into());
        }

        self.factorized = false;
        self.L_values = alloc_values(symbolic.len_val())?;

        let mat_lower = permuted_triangle(mat, perm.as_ref(), Side::Lower)?;

        let mut mem = MemBuffer::try_new(
            supernodal::factorize_supernodal_numeric_llt_scratch::<I, E>(
                symbolic,
                Par::Seq,
                Default::default(),
            ),
        )
        .via(LinearSolverError::MemoryAllocation)?;

        supernodal::factorize_supernodal_numeric_llt::<I, E>(
            &mut self.L_values,
            mat_lower.as_ref(),
            LltRegularization::default(),
            symbolic,
            Par::Seq,
            MemStack::new(&mut mem),
            Default::default(),
        )
        .via(LinearSolverError::NumericFactorization)?;

        self.factorized = true;
        Ok(())
    }

    fn solve_in_place(&self, sol: &mut MatMut<E>) -> Result<(), Problem> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or(LinearSolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        if !self.factorized {
            return Err(LinearSolverError::Uninitialized.into());
        }

        let dim = symbolic.ncols();
        check_rhs(dim, sol)?;

        let mut mem = MemBuffer::try_new(StackReq::all_of(&[
            faer::perm::permute_rows_in_place_scratch::<I, E>(dim, sol.ncols()),
            symbolic.solve_in_place_scratch::<E>(sol.ncols(), Par::Seq),
        ]))
        .via(LinearSolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        let llt = SupernodalLltRef::<'_, I, E>::new(symbolic, &self.L_values);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref(), stack);
        llt.solve_in_place_with_conj(Conj::No, sol.rb_mut(), Par::Seq, stack);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref().inverse(), stack);

        Ok(())
    }

    fn factor_nnz(&self) -> Option<usize> {
        self.symbolic
            .as_ref()
            .filter(|_| self.factorized)
            .map(|symbolic| symbolic.len_val())
    }
}

fn square_dim(mat: SparseColMatRef<I, E>) -> Result<usize, Problem> {
    if mat.nrows() != mat.ncols() {
        return Err(LinearSolverError::DimensionMismatch {
            expected: mat.ncols(),
            got: mat.nrows(),
        }
        .into());
    }
    Ok(mat.ncols())
}

fn check_rhs(dim: usize, sol: &MatMut<E>) -> Result<(), Problem> {
    if sol.nrows() != dim {
        return Err(LinearSolverError::DimensionMismatch {
            expected: dim,
            got: sol.nrows(),
        }
        .into());
    }
    Ok(())
}

fn alloc_values(len: usize) -> Result<Vec<E>, Problem> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .via(LinearSolverError::MemoryReservation)?;
    values.resize(len, 0.0);
    Ok(values)
}

/// Approximate minimum degree ordering of the symmetric pattern of `mat`.
fn fill_reducing_permutation(mat: SparseColMatRef<I, E>) -> Result<Perm<I>, Problem> {
    let dim = mat.ncols();
    let nnz = mat.compute_nnz();

    let mut perm = Vec::new();
    let mut perm_inv = Vec::new();
    perm.try_reserve_exact(dim)
        .via(LinearSolverError::MemoryReservation)?;
    perm_inv
        .try_reserve_exact(dim)
        .via(LinearSolverError::MemoryReservation)?;
    perm.resize(dim, 0usize);
    perm_inv.resize(dim, 0usize);

    let mut mem = MemBuffer::try_new(amd::order_scratch::<I>(dim, nnz))
        .via(LinearSolverError::MemoryAllocation)?;
    amd::order(
        &mut perm,
        &mut perm_inv,
        mat.symbolic(),
        amd::Control::default(),
        MemStack::new(&mut mem),
    )
    .via(LinearSolverError::SymbolicFactorization)?;

    // SAFETY: `amd::order` fills `perm` and `perm_inv` with mutually inverse permutations of
    // `0..dim`.
    Ok(unsafe { Perm::new_unchecked(perm.into_boxed_slice(), perm_inv.into_boxed_slice()) })
}

/// Elimination tree and column counts of the factor, from the upper triangle of the permuted
/// matrix.
fn elimination_tree(
    mat_upper: SparseColMatRef<I, E>,
    stack: &mut MemStack,
) -> Result<(Vec<isize>, Vec<usize>), Problem> {
    let dim = mat_upper.ncols();

    let mut etree = Vec::new();
    let mut col_counts = Vec::new();
    etree
        .try_reserve_exact(dim)
        .via(LinearSolverError::MemoryReservation)?;
    etree.resize(dim, 0isize);
    col_counts
        .try_reserve_exact(dim)
        .via(LinearSolverError::MemoryReservation)?;
    col_counts.resize(dim, 0usize);

    simplicial::prefactorize_symbolic_cholesky(
        &mut etree,
        &mut col_counts,
        mat_upper.symbolic(),
        stack,
    );

    Ok((etree, col_counts))
}

/// Applies `perm` symmetrically to a lower-stored matrix and keeps the `side` triangle of the
/// result.
fn permuted_triangle(
    mat: SparseColMatRef<I, E>,
    perm: PermRef<I>,
    side: Side,
) -> Result<SparseColMat<I, E>, Problem> {
    let dim = mat.ncols();
    let nnz = mat.compute_nnz();

    let mut mat_col_ptrs = Vec::new();
    let mut mat_row_indices = Vec::new();
    let mut mat_values = Vec::new();

    mat_col_ptrs
        .try_reserve_exact(dim + 1)
        .via(LinearSolverError::MemoryReservation)?;
    mat_col_ptrs.resize(dim + 1, 0usize);
    mat_row_indices
        .try_reserve_exact(nnz)
        .via(LinearSolverError::MemoryReservation)?;
    mat_row_indices.resize(nnz, 0usize);
    mat_values
        .try_reserve_exact(nnz)
        .via(LinearSolverError::MemoryReservation)?;
    mat_values.resize(nnz, 0.0f64);

    let mut mem = MemBuffer::try_new(faer::sparse::utils::permute_self_adjoint_scratch::<I>(dim))
        .via(LinearSolverError::MemoryAllocation)?;
    faer::sparse::utils::permute_self_adjoint_to_unsorted(
        &mut mat_values,
        &mut mat_col_ptrs,
        &mut mat_row_indices,
        mat,
        perm,
        Side::Lower,
        side,
        MemStack::new(&mut mem),
    );

    Ok(SparseColMat::<I, E>::new(
        // SAFETY: `permute_self_adjoint_to_unsorted` writes a valid column pointer array and
        // in-bounds row indices.
        unsafe {
            SymbolicSparseColMat::new_unchecked(dim, dim, mat_col_ptrs, None, mat_row_indices)
        },
        mat_values,
    ))
}

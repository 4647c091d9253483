//! Independent check of a computed solution against the original matrix.
use derive_more::Display;
use faer::sparse::SparseColMatRef;
use faer::{Col, ColRef};

use crate::linalg::vector_ops::{difference, norm_l2, symmetric_lower_matvec};
use crate::{E, I};

/// Relative residuals strictly below this pass.
pub const PASS_THRESHOLD: E = 1e-10;
/// Relative residuals strictly below this are acceptable.
pub const ACCEPT_THRESHOLD: E = 1e-6;

/// Advisory classification of a relative residual. None of the outcomes is a failure.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Outcome {
    #[display("passed")]
    Passed,
    #[display("acceptable")]
    Acceptable,
    #[display("warning, residual larger than expected")]
    Warning,
}

impl Outcome {
    pub fn classify(relative_residual: E) -> Self {
        if relative_residual < PASS_THRESHOLD {
            Outcome::Passed
        } else if relative_residual < ACCEPT_THRESHOLD {
            Outcome::Acceptable
        } else {
            Outcome::Warning
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verification {
    /// `||b - A x||_2`
    pub residual_norm: E,
    /// `||b||_2`
    pub rhs_norm: E,
    /// `||b - A x||_2 / ||b||_2`
    pub relative_residual: E,
    pub outcome: Outcome,
}

/// Right-hand side with `b[i] = i + 1`.
pub fn rhs(n: usize) -> Col<E> {
    Col::from_fn(n, |i| (i + 1) as E)
}

/// Recomputes `A x` from the lower-stored `mat` and compares it with `b`.
pub fn verify(mat: SparseColMatRef<'_, I, E>, x: ColRef<'_, E>, b: ColRef<'_, E>) -> Verification {
    let product = symmetric_lower_matvec(mat, x);
    let residual_norm = norm_l2(difference(b, product.as_ref()).as_ref());
    let rhs_norm = norm_l2(b);
    let relative_residual = residual_norm / rhs_norm;

    Verification {
        residual_norm,
        rhs_norm,
        relative_residual,
        outcome: Outcome::classify(relative_residual),
    }
}

//! End-to-end load, factorize, solve and verify pipeline.
//!
//! The driver moves through [`Stage`]s in a fixed order. A failing step moves it to
//! [`Stage::Aborted`] and returns the error; every resource acquired before the failure is
//! released on the way out, most recent first.
use derive_more::{Display, Error};
use faer::Col;
use loaders::mtx;
use problemo::{Problem, ProblemResult};

use crate::E;
use crate::config::RunConfig;
use crate::context::CholeskyContext;
use crate::linalg::sparse;
use crate::verify::{self, Outcome, Verification};

#[derive(Debug, Display, Error, PartialEq)]
pub enum DriverError {
    #[display("Failed to load matrix")]
    Load,

    #[display("Failed to convert triplets to a sparse matrix")]
    Assemble,

    #[display("Symbolic analysis failed")]
    Analyze,

    #[display("Cholesky factorization failed")]
    Factorize,

    #[display("Triangular solve failed")]
    Solve,
}

/// A pipeline step that can fail.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Step {
    #[display("load")]
    Load,
    #[display("assemble")]
    Assemble,
    #[display("analyze")]
    Analyze,
    #[display("factorize")]
    Factorize,
    #[display("solve")]
    Solve,
}

impl Step {
    fn error(self) -> DriverError {
        match self {
            Step::Load => DriverError::Load,
            Step::Assemble => DriverError::Assemble,
            Step::Analyze => DriverError::Analyze,
            Step::Factorize => DriverError::Factorize,
            Step::Solve => DriverError::Solve,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Stage {
    Start,
    Loaded,
    Filtered,
    Assembled,
    Analyzed,
    Factorized,
    Solved,
    Verified,
    Done,
    #[display("Aborted({_0})")]
    Aborted(Step),
}

/// Summary of a completed run.
#[derive(Clone, Debug)]
pub struct Report {
    pub dim: usize,
    pub entries_read: usize,
    pub lower_entries: usize,
    /// Nonzeros stored in the compressed lower triangle.
    pub stored_nnz: usize,
    pub factor_nnz: usize,
    pub solution: Col<E>,
    pub verification: Verification,
}

pub struct Driver<'ctx> {
    ctx: &'ctx CholeskyContext,
    stage: Stage,
}

impl<'ctx> Driver<'ctx> {
    pub fn new(ctx: &'ctx CholeskyContext) -> Self {
        Self {
            ctx,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(&mut self, config: &RunConfig) -> Result<Report, Problem> {
        let ctx = self.ctx;

        let matrix = self.checked(
            Step::Load,
            mtx::read_matrix(&config.matrix_path, config.nnz_policy),
        )?;
        let dim = matrix.dim;
        println!(
            "Reading matrix: {dim}x{dim} with {} entries",
            matrix.declared_nnz
        );
        println!("Read {} entries from file", matrix.entries.len());
        self.advance(Stage::Loaded);

        let lower = sparse::lower_triangle(&matrix.entries);
        println!("Lower triangular entries: {}", lower.len());
        self.advance(Stage::Filtered);

        let a = ctx.acquire(
            "sparse matrix A",
            self.checked(Step::Assemble, sparse::assemble_lower(dim, &lower))?,
        );
        let stored_nnz = a.as_ref().compute_nnz();
        println!("Created sparse matrix A ({dim}x{dim}, {stored_nnz} non-zeros in lower triangle)");
        self.advance(Stage::Assembled);

        let b = ctx.acquire("right-hand side b", verify::rhs(dim));

        println!();
        println!("Performing Cholesky factorization ({})...", ctx.backend());
        let mut factor = ctx.acquire("factor L", ctx.new_solver());
        self.checked(Step::Analyze, factor.analyze(a.as_ref()))?;
        self.advance(Stage::Analyzed);

        self.checked(Step::Factorize, factor.factorize(a.as_ref()))?;
        let factor_nnz = factor.factor_nnz().unwrap_or_default();
        println!("Factorization successful!");
        println!("  - Factor nonzeros: {factor_nnz}");
        self.advance(Stage::Factorized);

        println!();
        println!("Solving Ax = b...");
        let x = ctx.acquire(
            "solution x",
            self.checked(Step::Solve, factor.solve(b.as_mat().as_ref()))?,
        );
        println!("Solve completed.");
        self.advance(Stage::Solved);

        println!();
        println!("Computing residual...");
        let verification = verify::verify(a.as_ref(), x.col(0), b.as_ref());
        println!(
            "Residual norm ||b - Ax|| = {:e}",
            verification.residual_norm
        );
        println!(
            "Relative residual ||b - Ax|| / ||b|| = {:e}",
            verification.relative_residual
        );
        println!();
        match verification.outcome {
            Outcome::Passed => println!("SUCCESS: Cholesky integration test PASSED!"),
            Outcome::Acceptable => {
                println!("SUCCESS: Solution is acceptable (relative residual < 1e-6)")
            }
            Outcome::Warning => println!("WARNING: Residual larger than expected"),
        }
        self.advance(Stage::Verified);

        let report = Report {
            dim,
            entries_read: matrix.entries.len(),
            lower_entries: lower.len(),
            stored_nnz,
            factor_nnz,
            solution: x.col(0).to_owned(),
            verification,
        };

        drop(x);
        drop(factor);
        drop(b);
        drop(a);
        println!();
        println!("Resources freed. Done!");
        self.advance(Stage::Done);

        Ok(report)
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn checked<T>(&mut self, step: Step, result: Result<T, Problem>) -> Result<T, Problem> {
        if result.is_err() {
            log::error!("{step} step failed");
            self.advance(Stage::Aborted(step));
        }
        result.via(step.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use loaders::mtx::NnzPolicy;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn matrix_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    struct RunResult {
        result: Result<Report, Problem>,
        stage: Stage,
        acquired: usize,
        released: Vec<&'static str>,
    }

    fn run(text: &str, backend: Backend) -> RunResult {
        let file = matrix_file(text);
        let config = RunConfig::new(file.path()).with_backend(backend);
        let ctx = CholeskyContext::start(backend);

        let (result, stage) = {
            let mut driver = Driver::new(&ctx);
            let result = driver.run(&config);
            (result, driver.stage())
        };
        let acquired = ctx.acquired();
        let released = ctx.released();

        assert_eq!(ctx.live(), 0);
        ctx.finish().unwrap();
        RunResult {
            result,
            stage,
            acquired,
            released,
        }
    }

    #[rstest]
    fn test_identity(#[values(Backend::Simplicial, Backend::Supernodal)] backend: Backend) {
        let outcome = run("3 3 3\n1 1 1.0\n2 2 1.0\n3 3 1.0\n", backend);
        let report = outcome.result.unwrap();

        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(outcome.acquired, 4);
        assert_eq!(
            outcome.released,
            ["solution x", "factor L", "right-hand side b", "sparse matrix A"]
        );
        assert_eq!(report.dim, 3);
        for (i, expected) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            assert!((report.solution[i] - expected).abs() < 1e-14);
        }
        assert!(report.verification.residual_norm < 1e-14);
        assert_eq!(report.verification.outcome, Outcome::Passed);
    }

    #[rstest]
    fn test_general_file_is_filtered(
        #[values(Backend::Simplicial, Backend::Supernodal)] backend: Backend,
    ) {
        // [[4, -1, 0], [-1, 4, -1], [0, -1, 4]] with both triangles listed
        let text = "%%MatrixMarket matrix coordinate real general\n3 3 7\n\
                    1 1 4.0\n1 2 -1.0\n2 1 -1.0\n2 2 4.0\n2 3 -1.0\n3 2 -1.0\n3 3 4.0\n";
        let outcome = run(text, backend);
        let report = outcome.result.unwrap();

        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(report.entries_read, 7);
        assert_eq!(report.lower_entries, 5);
        assert_eq!(report.stored_nnz, 5);
        assert!(report.factor_nnz >= 5);
        assert_eq!(report.verification.outcome, Outcome::Passed);
    }

    #[test]
    fn test_non_square_aborts_before_library_calls() {
        let outcome = run("3 2 1\n1 1 1.0\n", Backend::Simplicial);
        assert!(outcome.result.is_err());
        assert_eq!(outcome.stage, Stage::Aborted(Step::Load));
        assert_eq!(outcome.acquired, 0);
        assert!(outcome.released.is_empty());
    }

    #[rstest]
    fn test_indefinite_aborts_at_factorize(
        #[values(Backend::Simplicial, Backend::Supernodal)] backend: Backend,
    ) {
        let outcome = run("2 2 3\n1 1 1.0\n2 1 2.0\n2 2 1.0\n", backend);
        assert!(outcome.result.is_err());
        assert_eq!(outcome.stage, Stage::Aborted(Step::Factorize));
        assert_eq!(outcome.acquired, 3);
        assert_eq!(
            outcome.released,
            ["factor L", "right-hand side b", "sparse matrix A"]
        );
    }

    #[test]
    fn test_missing_file_aborts() {
        let ctx = CholeskyContext::start(Backend::Simplicial);
        let mut driver = Driver::new(&ctx);
        let config = RunConfig::new("/nonexistent/matrix.mtx");

        assert!(driver.run(&config).is_err());
        assert_eq!(driver.stage(), Stage::Aborted(Step::Load));
    }

    #[test]
    fn test_strict_policy_rejects_short_file() {
        let file = matrix_file("2 2 3\n1 1 1.0\n2 2 1.0\n");
        let ctx = CholeskyContext::start(Backend::Simplicial);
        let mut driver = Driver::new(&ctx);

        let lenient = RunConfig::new(file.path());
        assert!(driver.run(&lenient).is_ok());

        let mut driver = Driver::new(&ctx);
        let strict = RunConfig::new(file.path()).with_nnz_policy(NnzPolicy::Strict);
        assert!(driver.run(&strict).is_err());
        assert_eq!(driver.stage(), Stage::Aborted(Step::Load));
    }
}

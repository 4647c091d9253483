use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use problemo::Problem;
use spd_check::config::{DEFAULT_MATRIX_PATH, RunConfig};
use spd_check::context::CholeskyContext;
use spd_check::driver::Driver;

/// Solve A x = b for a sparse symmetric positive-definite A with a sparse Cholesky
/// factorization, then check the residual.
///
/// The factorization backend is chosen with SPD_CHECK_BACKEND (simplicial or supernodal) and
/// SPD_CHECK_STRICT=1 rejects files whose entry count disagrees with their header.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Coordinate-format (Matrix Market) matrix file, optionally gzip-compressed
    #[arg(default_value = DEFAULT_MATRIX_PATH)]
    matrix: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    // Usage errors exit with the same code as any other failure; --help and --version succeed.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(problem) => {
            log::error!("{problem}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Problem> {
    let config = RunConfig::from_env(args.matrix)?;

    println!("=== Sparse Cholesky Integration Test ===");
    println!();
    println!(
        "{} version: {} ({} backend)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.backend
    );
    println!();

    let ctx = CholeskyContext::start(config.backend);
    let report = Driver::new(&ctx).run(&config);
    ctx.finish()?;

    let report = report?;
    log::info!(
        "Solved {}x{} system: relative residual {:e} ({})",
        report.dim,
        report.dim,
        report.verification.relative_residual,
        report.verification.outcome
    );
    Ok(())
}

use std::path::PathBuf;
use std::str::FromStr;

use derive_more::{Display, Error};
use loaders::mtx::NnzPolicy;
use problemo::Problem;

/// Matrix read when no path is given on the command line.
pub const DEFAULT_MATRIX_PATH: &str = "data/matrix.mtx";

/// Selects the factorization backend (`simplicial` or `supernodal`).
pub const BACKEND_ENV: &str = "SPD_CHECK_BACKEND";
/// `1` or `true` rejects files whose contents disagree with their header.
pub const STRICT_ENV: &str = "SPD_CHECK_STRICT";

#[derive(Debug, Display, Error, PartialEq)]
pub enum ConfigError {
    #[display("Unknown factorization backend '{value}' (expected simplicial or supernodal)")]
    InvalidBackend { value: String },
}

/// Sparse Cholesky factorization method.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum Backend {
    #[default]
    #[display("simplicial")]
    Simplicial,
    #[display("supernodal")]
    Supernodal,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simplicial" => Ok(Backend::Simplicial),
            "supernodal" => Ok(Backend::Supernodal),
            _ => Err(ConfigError::InvalidBackend {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub matrix_path: PathBuf,
    pub backend: Backend,
    pub nnz_policy: NnzPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MATRIX_PATH)
    }
}

impl RunConfig {
    pub fn new(matrix_path: impl Into<PathBuf>) -> Self {
        Self {
            matrix_path: matrix_path.into(),
            backend: Backend::default(),
            nnz_policy: NnzPolicy::default(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_nnz_policy(mut self, nnz_policy: NnzPolicy) -> Self {
        self.nnz_policy = nnz_policy;
        self
    }

    /// Builds a configuration for `matrix_path`, reading overrides from the environment.
    pub fn from_env(matrix_path: impl Into<PathBuf>) -> Result<Self, Problem> {
        Self::from_vars(matrix_path, |name| std::env::var(name).ok())
    }

    fn from_vars(
        matrix_path: impl Into<PathBuf>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Problem> {
        let mut config = Self::new(matrix_path);

        if let Some(value) = var(BACKEND_ENV) {
            config.backend = value.parse()?;
        }
        if let Some(value) = var(STRICT_ENV) {
            let strict = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true");
            if strict {
                config.nnz_policy = NnzPolicy::Strict;
            }
        }

        Ok(config)
    }
}

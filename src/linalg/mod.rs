pub mod cholesky;
pub mod solver;
pub mod sparse;
pub mod vector_ops;

//! Lower-triangle storage of symmetric matrices built from coordinate entries.
use derive_more::{Display, Error};
use faer::sparse::{SparseColMat, Triplet};
use problemo::common::IntoCommonProblem;
use problemo::{Problem, ProblemResult};

use crate::{E, I};

/// Coordinate entry `(row, col, value)` with 0-based indices.
pub type Entry = Triplet<I, I, E>;

#[derive(Debug, Display, Error, PartialEq)]
pub enum SparseError {
    #[display("Failed to convert triplets to compressed-column storage")]
    Assembly,

    #[display("Entry ({row}, {col}) lies above the diagonal of a lower-stored matrix")]
    UpperEntry { row: usize, col: usize },
}

/// Keeps the entries on or below the diagonal, in their original order.
pub fn lower_triangle(entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .filter(|entry| entry.row >= entry.col)
        .cloned()
        .collect()
}

/// Builds the compressed-column form of a `dim x dim` symmetric matrix from its lower-triangle
/// entries. The upper triangle is implied and never stored. Duplicate coordinates are summed.
pub fn assemble_lower(dim: usize, entries: &[Entry]) -> Result<SparseColMat<I, E>, Problem> {
    if let Some(entry) = entries.iter().find(|entry| entry.row < entry.col) {
        return Err(SparseError::UpperEntry {
            row: entry.row,
            col: entry.col,
        }
        .into());
    }

    SparseColMat::try_new_from_triplets(dim, dim, entries)
        .map_err(|err| format!("{err:?}").gloss())
        .via(SparseError::Assembly)
}

/// Entries of the 5-point Laplacian on a `side x side` grid, with both triangles present.
///
/// The matrix has dimension `side * side` and is symmetric positive definite.
pub fn grid_laplacian(side: usize) -> Vec<Entry> {
    let index = |x: usize, y: usize| y * side + x;
    let mut entries = Vec::with_capacity(5 * side * side);

    for y in 0..side {
        for x in 0..side {
            let node = index(x, y);
            entries.push(Triplet::new(node, node, 4.0));
            if x + 1 < side {
                entries.push(Triplet::new(node, index(x + 1, y), -1.0));
                entries.push(Triplet::new(index(x + 1, y), node, -1.0));
            }
            if y + 1 < side {
                entries.push(Triplet::new(node, index(x, y + 1), -1.0));
                entries.push(Triplet::new(index(x, y + 1), node, -1.0));
            }
        }
    }

    entries
}

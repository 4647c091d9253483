//! Reader for coordinate-format sparse matrix files.
//!
//! The accepted layout is the Matrix Market coordinate format:
//! - any number of leading lines that are empty or start with `%` (including the
//!   `%%MatrixMarket` banner),
//! - a size line `rows cols nnz`,
//! - a stream of `row col value` triples with 1-based indices.
//!
//! Indices are converted to 0-based on ingestion. Entries are kept in file order, without
//! symmetrization or deduplication. Reading stops at the first triple that does not parse.
//! Files ending in `.gz` are decompressed on the fly.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use derive_more::{Display, Error};
use faer::sparse::Triplet;
use flate2::bufread::GzDecoder;
use problemo::{Problem, ProblemResult};

/// A coordinate entry `(row, col, value)` with 0-based indices.
pub type Entry = Triplet<usize, usize, f64>;

#[derive(Debug, Display, Error, PartialEq)]
pub enum MtxError {
    #[display("Cannot open file {path}")]
    Open { path: String },

    #[display("Failed to read matrix data")]
    Read,

    #[display("Missing or malformed size header")]
    MalformedHeader,

    #[display("Matrix must be square (got {rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    #[display("Matrix has zero dimension")]
    Empty,

    #[display("Entry {index} has coordinate ({row}, {col}) outside a {dim}x{dim} matrix")]
    IndexOutOfRange {
        index: usize,
        row: i64,
        col: i64,
        dim: usize,
    },

    #[display("Header declares {declared} entries but {read} were read")]
    CountMismatch { declared: usize, read: usize },

    #[display("Duplicate entry at ({row}, {col})")]
    DuplicateEntry { row: usize, col: usize },
}

/// How to treat a file whose contents disagree with its own header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NnzPolicy {
    /// Accept short reads and duplicate coordinates, logging a warning for each.
    #[default]
    Lenient,
    /// Reject a count mismatch or a duplicate coordinate.
    Strict,
}

/// Square sparse matrix in coordinate form, as read from disk.
#[derive(Debug)]
pub struct CoordinateMatrix {
    /// Number of rows (and columns).
    pub dim: usize,
    /// Nonzero count declared by the size header.
    pub declared_nnz: usize,
    /// Entries in file order.
    pub entries: Vec<Entry>,
}

impl CoordinateMatrix {
    /// Number of entries whose coordinate already appeared earlier in the file.
    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .filter(|entry| !seen.insert((entry.row, entry.col)))
            .count()
    }

    fn first_duplicate(&self) -> Option<(usize, usize)> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .map(|entry| (entry.row, entry.col))
            .find(|&coord| !seen.insert(coord))
    }
}

/// Reads a coordinate-format matrix from `path`.
pub fn read_matrix(path: impl AsRef<Path>, policy: NnzPolicy) -> Result<CoordinateMatrix, Problem> {
    let path = path.as_ref();
    let file = File::open(path).via(MtxError::Open {
        path: path.display().to_string(),
    })?;
    let reader = BufReader::new(file);

    if path.extension().is_some_and(|ext| ext == "gz") {
        log::debug!("Decompressing {}", path.display());
        parse_matrix(BufReader::new(GzDecoder::new(reader)), policy)
    } else {
        parse_matrix(reader, policy)
    }
}

/// Parses a coordinate-format matrix from any buffered reader.
pub fn parse_matrix<R: BufRead>(reader: R, policy: NnzPolicy) -> Result<CoordinateMatrix, Problem> {
    let mut lines = reader.split(b'\n');

    // Comment lines are skipped before decoding, so they may hold any bytes.
    let header = loop {
        let Some(line) = lines.next() else {
            return Err(MtxError::MalformedHeader.into());
        };
        let line = line.via(MtxError::Read)?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
        if line.is_empty() || line.starts_with(b"%") {
            continue;
        }
        break String::from_utf8_lossy(line).into_owned();
    };

    let (rows, cols, declared_nnz) = parse_header(&header).ok_or(MtxError::MalformedHeader)?;
    if rows != cols {
        return Err(MtxError::NotSquare { rows, cols }.into());
    }
    if rows == 0 {
        return Err(MtxError::Empty.into());
    }
    let dim = rows;
    log::info!("Reading matrix: {dim}x{dim} with {declared_nnz} declared entries");

    // Triples may straddle line breaks, so the body is tokenized as one stream.
    // A line that is not valid UTF-8 ends the body like any other unparsable entry.
    let mut body = String::new();
    for line in lines {
        let Ok(line) = String::from_utf8(line.via(MtxError::Read)?) else {
            log::debug!("Stopping at a line that is not valid UTF-8");
            break;
        };
        body.push_str(&line);
        body.push('\n');
    }

    // The header count is untrusted, so it only bounds the initial allocation.
    let mut entries = Vec::with_capacity(declared_nnz.min(body.len() / 6 + 1));

    let mut tokens = body.split_whitespace();
    while let Some((row, col, val)) = next_triple(&mut tokens) {
        if row < 1 || col < 1 || row as usize > dim || col as usize > dim {
            return Err(MtxError::IndexOutOfRange {
                index: entries.len(),
                row,
                col,
                dim,
            }
            .into());
        }
        entries.push(Triplet::new(row as usize - 1, col as usize - 1, val));
    }

    let matrix = CoordinateMatrix {
        dim,
        declared_nnz,
        entries,
    };

    let read = matrix.entries.len();
    if read != declared_nnz {
        match policy {
            NnzPolicy::Strict => {
                return Err(MtxError::CountMismatch {
                    declared: declared_nnz,
                    read,
                }
                .into());
            }
            NnzPolicy::Lenient => {
                log::warn!("Header declares {declared_nnz} entries but {read} were read")
            }
        }
    }

    match policy {
        NnzPolicy::Strict => {
            if let Some((row, col)) = matrix.first_duplicate() {
                return Err(MtxError::DuplicateEntry { row, col }.into());
            }
        }
        NnzPolicy::Lenient => {
            let duplicates = matrix.duplicate_count();
            if duplicates > 0 {
                log::warn!("{duplicates} duplicate coordinates; values are summed on assembly");
            }
        }
    }

    Ok(matrix)
}

fn parse_header(line: &str) -> Option<(usize, usize, usize)> {
    let mut fields = line.split_whitespace().map(str::parse::<usize>);
    let rows = fields.next()?.ok()?;
    let cols = fields.next()?.ok()?;
    let nnz = fields.next()?.ok()?;
    Some((rows, cols, nnz))
}

fn next_triple<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<(i64, i64, f64)> {
    let row = tokens.next()?.parse().ok()?;
    let col = tokens.next()?.parse().ok()?;
    let val = tokens.next()?.parse().ok()?;
    Some((row, col, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::get_data_dir;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use std::io::Write;

    fn parse(text: &str, policy: NnzPolicy) -> Result<CoordinateMatrix, Problem> {
        parse_matrix(text.as_bytes(), policy)
    }

    fn coords(matrix: &CoordinateMatrix) -> Vec<(usize, usize, f64)> {
        matrix
            .entries
            .iter()
            .map(|entry| (entry.row, entry.col, entry.val))
            .collect()
    }

    #[test]
    fn test_index_conversion() {
        let matrix = parse("1 1 1\n1 1 5.0\n", NnzPolicy::Strict).unwrap();
        assert_eq!(matrix.dim, 1);
        assert_eq!(coords(&matrix), vec![(0, 0, 5.0)]);
    }

    #[test]
    fn test_read_general_file() {
        let path = format!("{}/tridiag_general.mtx", get_data_dir());
        let matrix = read_matrix(path, NnzPolicy::Strict).unwrap();

        assert_eq!(matrix.dim, 3);
        assert_eq!(matrix.declared_nnz, 7);
        assert_eq!(matrix.entries.len(), 7);
        // File order is preserved
        assert_eq!(coords(&matrix)[..3], [(0, 0, 4.0), (1, 0, -1.0), (0, 1, -1.0)]);
        assert_eq!(matrix.duplicate_count(), 0);
    }

    #[rstest]
    fn test_rejects_non_square(#[values(NnzPolicy::Lenient, NnzPolicy::Strict)] policy: NnzPolicy) {
        let path = format!("{}/non_square.mtx", get_data_dir());
        assert!(read_matrix(path, policy).is_err());
    }

    #[test]
    fn test_missing_file() {
        let path = format!("{}/does_not_exist.mtx", get_data_dir());
        assert!(read_matrix(path, NnzPolicy::Lenient).is_err());
    }

    #[test]
    fn test_malformed_entry_stops_read() {
        let path = format!("{}/truncated.mtx", get_data_dir());
        let matrix = read_matrix(&path, NnzPolicy::Lenient).unwrap();
        assert_eq!(coords(&matrix), vec![(0, 0, 2.0), (1, 1, 2.0)]);

        assert!(read_matrix(&path, NnzPolicy::Strict).is_err());
    }

    #[rstest]
    #[case::no_header("% only comments\n%\n")]
    #[case::short_header("% comment\n3 3\n1 1 1.0\n")]
    #[case::text_header("rows cols nnz\n")]
    #[case::empty_matrix("0 0 0\n")]
    #[case::zero_index("2 2 1\n0 1 1.0\n")]
    #[case::index_past_end("2 2 1\n3 1 1.0\n")]
    #[case::upper_index_past_end("3 3 2\n1 1 1.0\n1 7 1.0\n")]
    fn test_rejects_invalid_input(#[case] text: &str) {
        assert!(parse(text, NnzPolicy::Lenient).is_err());
    }

    #[test]
    fn test_skips_blank_lines_before_header() {
        let matrix = parse("\n%%MatrixMarket matrix coordinate real general\n\n2 2 2\n1 1 1.0\n2 2 3.0\n", NnzPolicy::Strict)
            .unwrap();
        assert_eq!(coords(&matrix), vec![(0, 0, 1.0), (1, 1, 3.0)]);
    }

    #[rstest]
    #[case::latin1_comment(b"% author: Jos\xe9\n2 2 2\n1 1 1.0\n2 2 1.0\n")]
    #[case::binary_trailer(b"2 2 2\n1 1 1.0\n2 2 1.0\n\xff\xfe junk\n")]
    #[case::crlf(b"%%MatrixMarket\r\n\r\n2 2 2\r\n1 1 1.0\r\n2 2 1.0\r\n")]
    fn test_tolerates_undecodable_bytes(#[case] bytes: &[u8]) {
        let matrix = parse_matrix(bytes, NnzPolicy::Strict).unwrap();
        assert_eq!(coords(&matrix), vec![(0, 0, 1.0), (1, 1, 1.0)]);
    }

    #[test]
    fn test_undecodable_line_stops_read() {
        let matrix = parse_matrix(&b"3 3 3\n1 1 1.0\n2 2 \xff\n3 3 1.0\n"[..], NnzPolicy::Lenient).unwrap();
        assert_eq!(coords(&matrix), vec![(0, 0, 1.0)]);
    }

    #[test]
    fn test_triples_may_span_lines() {
        let matrix = parse("2 2 2\n1 1\n1.5 2 2 2.5\n", NnzPolicy::Strict).unwrap();
        assert_eq!(coords(&matrix), vec![(0, 0, 1.5), (1, 1, 2.5)]);
    }

    #[test]
    fn test_duplicates_by_policy() {
        let text = "2 2 3\n1 1 1.0\n2 2 1.0\n1 1 2.0\n";

        let matrix = parse(text, NnzPolicy::Lenient).unwrap();
        assert_eq!(matrix.entries.len(), 3);
        assert_eq!(matrix.duplicate_count(), 1);

        assert!(parse(text, NnzPolicy::Strict).is_err());
    }

    #[test]
    fn test_count_mismatch_by_policy() {
        let text = "2 2 5\n1 1 1.0\n2 2 1.0\n";

        let matrix = parse(text, NnzPolicy::Lenient).unwrap();
        assert_eq!(matrix.declared_nnz, 5);
        assert_eq!(matrix.entries.len(), 2);

        assert!(parse(text, NnzPolicy::Strict).is_err());
    }

    #[test]
    fn test_read_gzip() {
        let source = std::fs::read(format!("{}/tridiag_general.mtx", get_data_dir())).unwrap();

        let mut file = tempfile::Builder::new().suffix(".mtx.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&source).unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();
        file.flush().unwrap();

        let matrix = read_matrix(file.path(), NnzPolicy::Strict).unwrap();
        assert_eq!(matrix.dim, 3);
        assert_eq!(matrix.entries.len(), 7);
    }
}

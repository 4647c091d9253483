use faer::sparse::SparseColMatRef;
use faer::{Col, ColRef, unzip, zip};

use crate::{E, I};

/// Computes `y = A x` for a symmetric `A` of which only the lower triangle is stored.
///
/// Every stored `(i, j, v)` adds `v * x[j]` to `y[i]`, and off-diagonal entries also add
/// `v * x[i]` to `y[j]` for the mirrored upper entry.
pub fn symmetric_lower_matvec(mat: SparseColMatRef<'_, I, E>, x: ColRef<'_, E>) -> Col<E> {
    let mut y = Col::<E>::zeros(mat.nrows());
    let row_idx = mat.row_idx();
    let val = mat.val();

    for j in 0..mat.ncols() {
        for k in mat.symbolic().col_range(j) {
            let i = row_idx[k];
            let v = val[k];

            y[i] += v * x[j];
            if i != j {
                y[j] += v * x[i];
            }
        }
    }

    y
}

pub fn difference<'a>(x1: ColRef<'a, E>, x2: ColRef<'a, E>) -> Col<E> {
    let mut out = Col::<E>::zeros(x1.nrows());

    zip!(x1, x2, out.as_mut()).for_each(|unzip!(x1, x2, out)| *out = *x1 - *x2);

    out
}

/// Euclidean norm, the square root of the sum of squares.
pub fn norm_l2(x: ColRef<'_, E>) -> E {
    let mut sum = 0.0;

    zip!(x).for_each(|unzip!(x)| sum += *x * *x);

    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::assemble_lower;
    use faer::sparse::Triplet;

    #[test]
    fn test_symmetric_lower_matvec() {
        let mat = assemble_lower(
            2,
            &[
                Triplet::new(0, 0, 2.0),
                Triplet::new(1, 0, 1.0),
                Triplet::new(1, 1, 3.0),
            ],
        )
        .unwrap();
        let x = Col::from_fn(2, |_| 1.0);

        let y = symmetric_lower_matvec(mat.as_ref(), x.as_ref());
        assert_eq!(y, Col::from_fn(2, |i| [3.0, 4.0][i]));
    }

    #[test]
    fn test_symmetric_lower_matvec_mirrors_off_diagonal() {
        // [[4, 1, 0], [1, 5, 2], [0, 2, 6]]
        let mat = assemble_lower(
            3,
            &[
                Triplet::new(0, 0, 4.0),
                Triplet::new(1, 0, 1.0),
                Triplet::new(1, 1, 5.0),
                Triplet::new(2, 1, 2.0),
                Triplet::new(2, 2, 6.0),
            ],
        )
        .unwrap();
        let x = Col::from_fn(3, |i| [1.0, 2.0, 3.0][i]);

        let y = symmetric_lower_matvec(mat.as_ref(), x.as_ref());
        assert_eq!(y, Col::from_fn(3, |i| [6.0, 17.0, 22.0][i]));
    }

    #[test]
    fn test_difference() {
        let x1 = Col::from_fn(3, |i| [1.0, 2.0, 3.0][i]);
        let x2 = Col::from_fn(3, |i| [0.5, 2.0, 4.0][i]);
        assert_eq!(
            difference(x1.as_ref(), x2.as_ref()),
            Col::from_fn(3, |i| [0.5, 0.0, -1.0][i])
        );
    }

    #[test]
    fn test_norm_l2() {
        let x = Col::from_fn(2, |i| [3.0, 4.0][i]);
        assert_eq!(norm_l2(x.as_ref()), 5.0);

        let empty = Col::<E>::zeros(0);
        assert_eq!(norm_l2(empty.as_ref()), 0.0);
    }
}

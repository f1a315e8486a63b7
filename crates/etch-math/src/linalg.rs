//! Linear algebra utilities.
//!
//! Dense LU factorization with partial pivoting, used for the
//! thin-plate-spline systems (symmetric but indefinite).

use etch_types::error::{EtchError, EtchResult};
use ndarray::{Array1, Array2};

/// Pivots below this (relative to the largest entry) are treated as singular.
const SINGULAR_TOL: f64 = 1e-13;

/// Packed LU factors of a square matrix: unit-lower L below the diagonal,
/// U on and above it, plus the row permutation.
#[derive(Debug, Clone)]
pub struct LuFactors {
    lu: Array2<f64>,
    perm: Vec<usize>,
}

impl LuFactors {
    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Solve `A x = b` with the stored factors.
    pub fn solve(&self, b: &Array1<f64>) -> EtchResult<Array1<f64>> {
        let n = self.dim();
        if b.len() != n {
            return Err(EtchError::LinAlg(format!(
                "rhs length {} does not match matrix order {n}",
                b.len()
            )));
        }
        // Forward substitution on the permuted rhs
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut acc = b[self.perm[i]];
            for k in 0..i {
                acc -= self.lu[[i, k]] * y[k];
            }
            y[i] = acc;
        }
        // Back substitution
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut acc = y[i];
            for k in (i + 1)..n {
                acc -= self.lu[[i, k]] * x[k];
            }
            x[i] = acc / self.lu[[i, i]];
        }
        Ok(x)
    }
}

/// LU-factorize a square matrix with partial (row) pivoting.
pub fn lu_factor(a: &Array2<f64>) -> EtchResult<LuFactors> {
    let (n, m) = a.dim();
    if n != m {
        return Err(EtchError::LinAlg(format!("matrix is {n}x{m}, not square")));
    }
    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = lu[[col, col]].abs();
        for row in (col + 1)..n {
            let v = lu[[row, col]].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }
        if !pivot_val.is_finite() || pivot_val <= SINGULAR_TOL * scale {
            return Err(EtchError::LinAlg(format!(
                "singular matrix: pivot {pivot_val:.3e} at column {col}"
            )));
        }
        if pivot_row != col {
            for k in 0..n {
                lu.swap([col, k], [pivot_row, k]);
            }
            perm.swap(col, pivot_row);
        }
        let diag = lu[[col, col]];
        for row in (col + 1)..n {
            let factor = lu[[row, col]] / diag;
            lu[[row, col]] = factor;
            if factor == 0.0 {
                continue;
            }
            for k in (col + 1)..n {
                lu[[row, k]] -= factor * lu[[col, k]];
            }
        }
    }
    Ok(LuFactors { lu, perm })
}

/// Solve `A x = b` for a single right-hand side.
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> EtchResult<Array1<f64>> {
    lu_factor(a)?.solve(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lu_solve_3x3() {
        let a = array![[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = array![8.0, -11.0, -3.0];
        let x = lu_solve(&a, &b).unwrap();
        let expected = [2.0, 3.0, -1.0];
        for i in 0..3 {
            assert!(
                (x[i] - expected[i]).abs() < 1e-12,
                "x[{i}] = {} expected {}",
                x[i],
                expected[i]
            );
        }
    }

    #[test]
    fn test_lu_needs_pivoting() {
        // Zero on the leading diagonal
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![3.0, 5.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 5.0).abs() < 1e-14);
        assert!((x[1] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_lu_indefinite_saddle_system() {
        // [[0, 1], [1, 0]] block structure as in the RBF + polynomial system
        let a = array![
            [0.0, 2.0, 1.0, 1.0],
            [2.0, 0.0, 1.0, 2.0],
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 2.0, 0.0, 0.0]
        ];
        let x_true = array![1.0, -1.0, 0.5, 2.0];
        let b = a.dot(&x_true);
        let x = lu_solve(&a, &b).unwrap();
        for i in 0..4 {
            assert!((x[i] - x_true[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lu_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(lu_factor(&a), Err(EtchError::LinAlg(_))));
    }

    #[test]
    fn test_lu_not_square() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(lu_factor(&a).is_err());
    }

    #[test]
    fn test_factors_reuse() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let f = lu_factor(&a).unwrap();
        for b in [array![1.0, 2.0], array![0.0, 1.0]] {
            let x = f.solve(&b).unwrap();
            let r = a.dot(&x) - &b;
            assert!(r.iter().all(|v| v.abs() < 1e-12));
        }
    }
}

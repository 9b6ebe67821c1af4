use nalgebra::{DMatrix, DVector};

/// P Q Pᵗ = L D Lᵗ factorization of a symmetric matrix, with diagonal
/// pivoting. Pivots below the cutoff are treated as exact zeros, so that
/// semi definite (rank deficient) systems can still be solved.
pub(crate) struct Ldlt {
    /// Unit lower triangular L (strictly lower part is meaningful)
    l: DMatrix<f64>,
    /// Diagonal D
    d: DVector<f64>,
    /// Row i of the factorized matrix is row perm[i] of the input
    perm: Vec<usize>,
}

impl Ldlt {
    /// Factorizes Q, only its lower triangle is read.
    /// Returns None on numerical failure.
    pub fn new(q: &DMatrix<f64>) -> Option<Self> {
        let n = q.nrows();
        let mut a = q.clone_owned();
        let mut perm = (0..n).collect::<Vec<_>>();

        // mirror lower triangle
        for j in 0..n {
            for i in 0..j {
                a[(i, j)] = a[(j, i)];
            }
        }

        let mut cutoff = 0.0_f64;

        for k in 0..n {
            // largest remaining diagonal
            let (pivot, biggest) = (k..n)
                .map(|i| (i, a[(i, i)].abs()))
                .fold((k, -1.0), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });

            if k == 0 {
                cutoff = f64::EPSILON * biggest * n as f64;
            }

            if pivot != k {
                a.swap_rows(k, pivot);
                a.swap_columns(k, pivot);
                perm.swap(k, pivot);
            }

            let d_k = a[(k, k)];

            if d_k.abs() <= cutoff {
                // rank deficiency: remaining column must vanish as well
                for i in k + 1..n {
                    if a[(i, k)].abs() > cutoff {
                        return None;
                    }
                    a[(i, k)] = 0.0;
                }
                a[(k, k)] = 0.0;
                continue;
            }

            for i in k + 1..n {
                a[(i, k)] /= d_k;
            }

            for j in k + 1..n {
                let l_jk = a[(j, k)];
                for i in j..n {
                    let l_ik = a[(i, k)];
                    a[(i, j)] -= l_ik * d_k * l_jk;
                    a[(j, i)] = a[(i, j)];
                }
            }
        }

        let d = a.diagonal();

        if d.iter().any(|v| !v.is_finite()) {
            return None;
        }

        Some(Self { l: a, d, perm })
    }

    /// Solves Q . X = B, with zero pivots pseudo inverted.
    pub fn solve(&self, b: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.d.nrows();
        let mut x = DMatrix::zeros(n, b.ncols());

        for c in 0..b.ncols() {
            // P b
            let mut y = DVector::from_fn(n, |i, _| b[(self.perm[i], c)]);

            // L y = P b
            for i in 0..n {
                for k in 0..i {
                    y[i] -= self.l[(i, k)] * y[k];
                }
            }

            // D z = y
            for i in 0..n {
                y[i] = if self.d[i] == 0.0 { 0.0 } else { y[i] / self.d[i] };
            }

            // Lᵗ w = z
            for i in (0..n).rev() {
                for k in i + 1..n {
                    y[i] -= self.l[(k, i)] * y[k];
                }
            }

            // x = Pᵗ w
            for i in 0..n {
                x[(self.perm[i], c)] = y[i];
            }
        }

        x
    }
}

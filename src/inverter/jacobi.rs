use nalgebra::{DMatrix, DVector};

const MAX_SWEEPS: usize = 100;

/// Decomposition Q = V Λ Vᵗ of a symmetric matrix through cyclic Jacobi
/// rotations. Singular values are |Λ|, so this is also an SVD of Q.
pub(crate) struct JacobiSvd {
    v: DMatrix<f64>,
    lambda: DVector<f64>,
}

impl JacobiSvd {
    /// Decomposes Q, only its lower triangle is read.
    /// Returns None if rotations did not converge.
    pub fn new(q: &DMatrix<f64>) -> Option<Self> {
        let n = q.nrows();
        let mut a = q.clone_owned();
        for j in 0..n {
            for i in 0..j {
                a[(i, j)] = a[(j, i)];
            }
        }

        let mut v = DMatrix::<f64>::identity(n, n);
        let norm = a.norm();

        if norm == 0.0 {
            return Some(Self {
                v,
                lambda: DVector::zeros(n),
            });
        }

        let mut converged = false;

        for _ in 0..MAX_SWEEPS {
            let off = (0..n)
                .flat_map(|i| (0..n).filter(move |j| *j != i).map(move |j| (i, j)))
                .map(|(i, j)| a[(i, j)].powi(2))
                .sum::<f64>()
                .sqrt();

            if off <= f64::EPSILON * norm * n as f64 {
                converged = true;
                break;
            }

            for p in 0..n {
                for r in p + 1..n {
                    let a_pr = a[(p, r)];
                    if a_pr == 0.0 {
                        continue;
                    }

                    let theta = (a[(r, r)] - a[(p, p)]) / (2.0 * a_pr);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    // A <- Jᵗ A J
                    for k in 0..n {
                        let a_kp = a[(k, p)];
                        let a_kr = a[(k, r)];
                        a[(k, p)] = c * a_kp - s * a_kr;
                        a[(k, r)] = s * a_kp + c * a_kr;
                    }
                    for k in 0..n {
                        let a_pk = a[(p, k)];
                        let a_rk = a[(r, k)];
                        a[(p, k)] = c * a_pk - s * a_rk;
                        a[(r, k)] = s * a_pk + c * a_rk;
                    }

                    // V <- V J
                    for k in 0..n {
                        let v_kp = v[(k, p)];
                        let v_kr = v[(k, r)];
                        v[(k, p)] = c * v_kp - s * v_kr;
                        v[(k, r)] = s * v_kp + c * v_kr;
                    }
                }
            }
        }

        if !converged {
            return None;
        }

        let lambda = a.diagonal();
        if lambda.iter().any(|l| !l.is_finite()) {
            return None;
        }

        Some(Self { v, lambda })
    }

    /// Singular values
    pub fn singular_values(&self) -> DVector<f64> {
        self.lambda.abs()
    }

    /// Least squares solution of Q . X = B, singular values
    /// below threshold being considered null.
    pub fn solve(&self, b: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.lambda.nrows();
        let sigma_max = self.singular_values().max();
        let threshold = f64::EPSILON * n as f64 * sigma_max;

        let inv = DVector::from_fn(n, |i, _| {
            let l = self.lambda[i];
            if l.abs() > threshold {
                1.0 / l
            } else {
                0.0
            }
        });

        let vt_b = self.v.transpose() * b;
        let scaled = DMatrix::from_fn(n, b.ncols(), |i, j| inv[i] * vt_b[(i, j)]);
        &self.v * scaled
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn jacobi_eigenvalues() {
        let q = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let svd = JacobiSvd::new(&q).unwrap();

        let mut sigma = svd.singular_values().iter().copied().collect::<Vec<_>>();
        sigma.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert!((sigma[0] - 1.0).abs() < 1.0E-12);
        assert!((sigma[1] - 3.0).abs() < 1.0E-12);
    }

    #[test]
    fn jacobi_null_matrix() {
        let q = DMatrix::<f64>::zeros(3, 3);
        let b = DMatrix::from_element(3, 1, 1.0);
        let svd = JacobiSvd::new(&q).unwrap();
        assert_eq!(svd.solve(&b), DMatrix::zeros(3, 1));
    }
}

//! Linear solve strategies used to compute the smoother gain.
use std::str::FromStr;

use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

mod jacobi;
mod ldlt;

/// Maximal number of implicit QR iterations of the bidiagonal SVD
const SVD_MAX_ITERATIONS: usize = 1_000;

/// Strategy used to solve Q . X = B, with Q symmetric.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Inverter {
    /// Explicit inverse through full pivoting LU
    Inv,
    /// Cholesky
    Llt,
    /// Robust Cholesky with diagonal pivoting
    Ldlt,
    /// Column pivoting Householder QR
    ColPivQr,
    /// Bidiagonal SVD
    BdcSvd,
    /// Cyclic Jacobi SVD. Slowest, most robust to rank deficiency.
    JacobiSvd,
}

/// Default fallback order
pub const DEFAULT_INVERTERS: [Inverter; 6] = [
    Inverter::Inv,
    Inverter::Llt,
    Inverter::Ldlt,
    Inverter::ColPivQr,
    Inverter::BdcSvd,
    Inverter::JacobiSvd,
];

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown inverter \"{0}\"")]
pub struct ParsingError(String);

impl FromStr for Inverter {
    type Err = ParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INV" => Ok(Self::Inv),
            "LLT" => Ok(Self::Llt),
            "LDLT" => Ok(Self::Ldlt),
            "COLPIVHQR" => Ok(Self::ColPivQr),
            "BDCSVD" => Ok(Self::BdcSvd),
            "JACOBISVD" => Ok(Self::JacobiSvd),
            _ => Err(ParsingError(s.to_string())),
        }
    }
}

impl std::fmt::Display for Inverter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Inv => write!(f, "INV"),
            Self::Llt => write!(f, "LLT"),
            Self::Ldlt => write!(f, "LDLT"),
            Self::ColPivQr => write!(f, "COLPIVHQR"),
            Self::BdcSvd => write!(f, "BDCSVD"),
            Self::JacobiSvd => write!(f, "JACOBISVD"),
        }
    }
}

impl TryFrom<String> for Inverter {
    type Error = ParsingError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

impl From<Inverter> for String {
    fn from(inverter: Inverter) -> String {
        inverter.to_string()
    }
}

impl Inverter {
    /// Solves Q . X = B. Returns None when this strategy fails.
    pub fn solve(&self, q: &DMatrix<f64>, b: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        if !q.is_square() || q.nrows() != b.nrows() {
            return None;
        }

        if q.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return None;
        }

        let x = match self {
            Self::Inv => {
                let lu = q.clone().full_piv_lu();
                if !lu.is_invertible() {
                    return None;
                }
                let mut q_inv = lu.try_inverse()?;
                q_inv = (&q_inv + q_inv.transpose()) / 2.0;
                q_inv * b
            },
            Self::Llt => q.clone().cholesky()?.solve(b),
            Self::Ldlt => ldlt::Ldlt::new(q)?.solve(b),
            Self::ColPivQr => q.clone().col_piv_qr().solve(b)?,
            Self::BdcSvd => {
                let svd = q
                    .clone()
                    .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)?;
                let sigma_max = svd.singular_values.max();
                let eps = f64::EPSILON * q.nrows() as f64 * sigma_max;
                svd.solve(b, eps).ok()?
            },
            Self::JacobiSvd => jacobi::JacobiSvd::new(q)?.solve(b),
        };

        if x.iter().all(|v| v.is_finite()) {
            Some(x)
        } else {
            None
        }
    }
}

/// Result of a successful [solve] through the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Solution
    pub x: DMatrix<f64>,
    /// [Inverter] that succeeded
    pub inverter: Inverter,
    /// [Inverter]s that failed prior success, in attempt order
    pub failures: Vec<Inverter>,
}

/// Solves Q . X = B trying each [Inverter] in order, until one succeeds.
pub fn solve(
    inverters: &[Inverter],
    q: &DMatrix<f64>,
    b: &DMatrix<f64>,
) -> Result<SolveReport, Error> {
    let mut failures = Vec::with_capacity(inverters.len());

    for (i, inverter) in inverters.iter().enumerate() {
        if let Some(x) = inverter.solve(q, b) {
            debug!("gain solved with {} ({} failure(s))", inverter, failures.len());
            return Ok(SolveReport {
                x,
                failures,
                inverter: *inverter,
            });
        }

        match inverters.get(i + 1) {
            Some(next) => warn!("inverter {} failed, trying {}", inverter, next),
            None => warn!("inverter {} failed, no more inverters to try", inverter),
        }

        failures.push(*inverter);
    }

    Err(Error::SolverExhausted)
}

/// Ratio of extreme singular values, when it can be determined
pub(crate) fn condition_number(m: &DMatrix<f64>) -> Option<f64> {
    if m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let svd = m
        .clone()
        .try_svd(false, false, f64::EPSILON, SVD_MAX_ITERATIONS)?;
    let max = svd.singular_values.max();
    let min = svd.singular_values.min();
    Some(max / min)
}

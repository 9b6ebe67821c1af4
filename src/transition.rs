use std::collections::BTreeMap;

use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{error::Error, record::RecordKind};

/// Sparse state transition of a single forward step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionDelta {
    pub rows: usize,
    pub cols: usize,
    /// Non zero entries, indexed by (row, col)
    pub entries: BTreeMap<(usize, usize), f64>,
}

impl TransitionDelta {
    /// Builds a null [TransitionDelta] of given dimensions
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            entries: Default::default(),
        }
    }

    /// Identity [TransitionDelta]
    pub fn identity(n: usize) -> Self {
        let mut s = Self::new(n, n);
        for i in 0..n {
            s.entries.insert((i, i), 1.0);
        }
        s
    }

    /// Copies and returns [TransitionDelta] with entry (row, col) set
    pub fn with_entry(&self, row: usize, col: usize, value: f64) -> Self {
        let mut s = self.clone();
        s.entries.insert((row, col), value);
        s
    }

    /// Dense representation
    pub fn to_dense(&self) -> Result<DMatrix<f64>, Error> {
        let mut mat = DMatrix::zeros(self.rows, self.cols);

        for (&(row, col), &value) in self.entries.iter() {
            if row >= self.rows || col >= self.cols {
                return Err(Error::TransitionIndex {
                    row,
                    col,
                    rows: self.rows,
                    cols: self.cols,
                });
            }
            mat[(row, col)] = value;
        }

        Ok(mat)
    }
}

/// Folds the [TransitionDelta]s found between two a-priori checkpoints
/// into the dense transition matrix spanning the gap.
#[derive(Debug, Clone, Default)]
pub struct TransitionAccumulator {
    f: Option<DMatrix<f64>>,
}

impl TransitionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts from identity, on each a-priori checkpoint of dimension n
    pub fn reset(&mut self, n: usize) {
        self.f = Some(DMatrix::identity(n, n));
    }

    /// Right-multiplies by a new delta, in scan order
    pub fn accumulate(&mut self, delta: &TransitionDelta) -> Result<(), Error> {
        let f = self
            .f
            .as_ref()
            .ok_or(Error::UnexpectedRecord(RecordKind::TransitionMatrix))?;

        if f.ncols() != delta.rows {
            return Err(Error::TransitionDimension {
                expected: (f.ncols(), delta.cols),
                found: (delta.rows, delta.cols),
            });
        }

        let dense = delta.to_dense()?;
        debug!(
            "transition: accumulating {}x{} delta ({} entries)",
            delta.rows,
            delta.cols,
            delta.entries.len()
        );

        self.f = Some(f * dense);
        Ok(())
    }

    /// Accumulated transition, if any checkpoint was seen
    pub fn matrix(&self) -> Option<&DMatrix<f64>> {
        self.f.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn identity_without_deltas() {
        let mut acc = TransitionAccumulator::new();
        assert!(acc.matrix().is_none());

        acc.reset(4);
        assert_eq!(acc.matrix(), Some(&DMatrix::identity(4, 4)));
    }

    #[test]
    fn composition_order() {
        // F1: identity with one coupling term, F2: scaled identity
        let f1 = TransitionDelta::identity(3).with_entry(0, 2, 0.5);

        let mut f2 = TransitionDelta::new(3, 3);
        for i in 0..3 {
            f2 = f2.with_entry(i, i, 2.0);
        }

        let mut acc = TransitionAccumulator::new();
        acc.reset(3);
        acc.accumulate(&f1).unwrap();
        acc.accumulate(&f2).unwrap();

        let composed = acc.matrix().unwrap();
        let expected = f1.to_dense().unwrap() * f2.to_dense().unwrap();
        assert_eq!(composed, &expected);

        let v = DVector::from_vec(vec![1.0, 2.0, 4.0]);
        let out = composed * v;
        assert_eq!(out, DVector::from_vec(vec![2.0 + 0.5 * 8.0, 4.0, 8.0]));
    }

    #[test]
    fn delta_prior_checkpoint() {
        let mut acc = TransitionAccumulator::new();
        match acc.accumulate(&TransitionDelta::identity(2)) {
            Err(Error::UnexpectedRecord(RecordKind::TransitionMatrix)) => {},
            other => panic!("expecting unexpected record error, got {:?}", other),
        }
    }

    #[test]
    fn dimension_mismatch() {
        let mut acc = TransitionAccumulator::new();
        acc.reset(3);
        assert!(acc.accumulate(&TransitionDelta::identity(2)).is_err());

        // state growth: 3 states mapped from 4 previous states
        let grow = TransitionDelta::new(3, 4).with_entry(0, 0, 1.0);
        acc.accumulate(&grow).unwrap();
        assert_eq!(acc.matrix().unwrap().shape(), (3, 4));
    }

    #[test]
    fn out_of_range_entry() {
        let delta = TransitionDelta::new(2, 2).with_entry(2, 0, 1.0);
        assert!(matches!(
            delta.to_dense(),
            Err(Error::TransitionIndex { row: 2, col: 0, .. })
        ));
    }
}

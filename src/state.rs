use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    prelude::{Epoch, SV},
    record::epoch_serde,
};

/// Output file name templates and other string annotations
/// carried along with the filter states.
pub type Metadata = BTreeMap<String, String>;

/// Kind of estimated parameter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKind {
    /// Reference clock / datum. Held fixed by the forward filter.
    ReferenceClock,
    /// Receiver position (ECEF, one key per axis)
    RecPos,
    /// Receiver clock offset
    RecClock,
    /// Satellite clock offset
    SatClock,
    /// Carrier phase ambiguity
    Ambiguity,
    /// Tropospheric zenith delay
    TropoZenith,
    /// Slant ionospheric delay
    Ionosphere,
    /// Code or phase hardware bias
    Bias,
    /// Earth rotation parameter
    Erp,
}

/// Key identifying one estimated parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: StateKind,
    /// Station name, when receiver dependent
    pub station: Option<String>,
    /// [SV], when satellite dependent
    pub sv: Option<SV>,
    /// Sub index (axis, frequency..)
    pub num: u8,
}

impl StateKey {
    /// Receiver dependent [StateKey]
    pub fn station(kind: StateKind, station: &str, num: u8) -> Self {
        Self {
            kind,
            num,
            sv: None,
            station: Some(station.to_string()),
        }
    }

    /// Satellite dependent [StateKey]
    pub fn sv(kind: StateKind, sv: SV, num: u8) -> Self {
        Self {
            kind,
            num,
            sv: Some(sv),
            station: None,
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(station) = &self.station {
            write!(f, ":{}", station)?;
        }
        if let Some(sv) = &self.sv {
            write!(f, ":{}", sv)?;
        }
        write!(f, "[{}]", self.num)
    }
}

/// [FilterState] is a checkpoint of the forward estimator,
/// or a smoothed estimate derived from such checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// [Epoch] of this estimate
    #[serde(with = "epoch_serde")]
    pub time: Epoch,

    /// State vector
    pub x: DVector<f64>,

    /// Latest correction applied to x (smoothed states only)
    pub dx: DVector<f64>,

    /// Covariance matrix
    pub p: DMatrix<f64>,

    /// Position of each [StateKey] within x and p
    pub index: HashMap<StateKey, usize>,

    /// [Metadata] is streamed in dedicated records, never within the state itself
    #[serde(skip)]
    pub metadata: Metadata,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            time: Epoch::default(),
            x: DVector::zeros(0),
            dx: DVector::zeros(0),
            p: DMatrix::zeros(0, 0),
            index: HashMap::new(),
            metadata: Metadata::new(),
        }
    }
}

impl FilterState {
    /// Builds a new [FilterState]
    pub fn new(time: Epoch, x: DVector<f64>, p: DMatrix<f64>) -> Self {
        let dx = DVector::zeros(x.nrows());
        Self {
            time,
            x,
            dx,
            p,
            index: HashMap::new(),
            metadata: Metadata::new(),
        }
    }

    /// Copies and returns [FilterState] with given index map
    pub fn with_index(&self, index: HashMap<StateKey, usize>) -> Self {
        let mut s = self.clone();
        s.index = index;
        s
    }

    /// Copies and returns [FilterState] with given [Metadata]
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        let mut s = self.clone();
        s.metadata = metadata;
        s
    }

    /// Number of estimated parameters
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Estimated value of given parameter
    pub fn value(&self, key: &StateKey) -> Option<f64> {
        let i = *self.index.get(key)?;
        self.x.get(i).copied()
    }

    /// Estimated variance of given parameter
    pub fn variance(&self, key: &StateKey) -> Option<f64> {
        let i = *self.index.get(key)?;
        self.p.get((i, i)).copied()
    }

    /// Checks that P is square and matches x, and that dx (when present)
    /// matches x as well.
    pub fn validate(&self) -> Result<(), Error> {
        let n = self.len();

        if self.p.shape() != (n, n) {
            return Err(Error::CovarianceDimension {
                states: n,
                found: self.p.shape(),
            });
        }

        if !self.dx.is_empty() && self.dx.nrows() != n {
            return Err(Error::StateDimension {
                expected: n,
                found: self.dx.nrows(),
            });
        }

        Ok(())
    }

    /// Symmetrizes the covariance matrix
    pub fn symmetrize(&mut self) {
        symmetrize(&mut self.p);
    }
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let keys = self
            .index
            .iter()
            .sorted_by_key(|(_, i)| **i)
            .filter_map(|(k, i)| Some(format!("{}={:.6E}", k, self.x.get(*i)?)))
            .join(" ");
        write!(f, "{} n={} {}", self.time, self.len(), keys)
    }
}

/// Replaces M with (M + Mᵗ)/2
pub fn symmetrize(m: &mut DMatrix<f64>) {
    *m = (&*m + m.transpose()) / 2.0;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Constellation;
    use nalgebra::{DMatrix, DVector};
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use std::str::FromStr;

    #[test]
    fn symmetrization_is_idempotent() {
        let mut rng = SmallRng::seed_from_u64(42);

        for n in 1..8 {
            let m = DMatrix::<f64>::from_fn(n, n, |_, _| rng.random::<f64>() * 10.0 - 5.0);

            let mut once = m.clone();
            symmetrize(&mut once);

            let mut twice = once.clone();
            symmetrize(&mut twice);

            assert_eq!(once, twice, "symmetrization should be idempotent (n={})", n);
            assert_eq!(once, once.transpose());
        }
    }

    #[test]
    fn indexed_access() {
        let t = Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap();
        let g01 = SV::new(Constellation::GPS, 1);

        let x = DVector::from_vec(vec![0.0, 1.5, -2.0]);
        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 2.0, 3.0]));

        let mut index = HashMap::new();
        index.insert(StateKey::station(StateKind::RecClock, "ALIC", 0), 1);
        index.insert(StateKey::sv(StateKind::SatClock, g01, 0), 2);

        let state = FilterState::new(t, x, p).with_index(index);

        assert_eq!(state.len(), 3);
        assert_eq!(
            state.value(&StateKey::station(StateKind::RecClock, "ALIC", 0)),
            Some(1.5)
        );
        assert_eq!(
            state.variance(&StateKey::sv(StateKind::SatClock, g01, 0)),
            Some(3.0)
        );
        assert!(state
            .value(&StateKey::station(StateKind::RecPos, "ALIC", 0))
            .is_none());
    }

    #[test]
    fn dimension_validation() {
        let t = Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap();

        let state = FilterState::new(t, DVector::zeros(2), DMatrix::identity(2, 2));
        assert!(state.validate().is_ok());

        let mut empty_dx = state.clone();
        empty_dx.dx = DVector::zeros(0);
        assert!(empty_dx.validate().is_ok());

        let oversized = FilterState::new(t, DVector::zeros(2), DMatrix::identity(3, 3));
        assert!(matches!(
            oversized.validate(),
            Err(Error::CovarianceDimension {
                states: 2,
                found: (3, 3)
            })
        ));

        let rectangular = FilterState::new(t, DVector::zeros(2), DMatrix::zeros(2, 3));
        assert!(rectangular.validate().is_err());

        let mut bad_dx = state.clone();
        bad_dx.dx = DVector::zeros(3);
        assert!(matches!(
            bad_dx.validate(),
            Err(Error::StateDimension {
                expected: 2,
                found: 3
            })
        ));
    }
}

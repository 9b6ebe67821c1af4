use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    prelude::{Epoch, SV},
    record::epoch_serde,
};

/// Identifies one observation of a [MeasurementBatch]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    /// Observing station
    pub station: String,
    /// Observed [SV]
    pub sv: SV,
    /// Signal / combination code (like "L1C", "IF12")
    pub code: String,
}

impl ObservationKey {
    pub fn new(station: &str, sv: SV, code: &str) -> Self {
        Self {
            sv,
            station: station.to_string(),
            code: code.to_string(),
        }
    }
}

impl std::fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}({})", self.station, self.sv, self.code)
    }
}

/// Observations of a single epoch, as processed by the forward filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    #[serde(with = "epoch_serde")]
    pub time: Epoch,

    /// One [ObservationKey] per row of H
    pub obs: Vec<ObservationKey>,

    /// Design matrix (observations x states)
    pub h: DMatrix<f64>,

    /// Residuals
    pub vv: DVector<f64>,
}

impl MeasurementBatch {
    pub fn new(time: Epoch, obs: Vec<ObservationKey>, h: DMatrix<f64>, vv: DVector<f64>) -> Self {
        Self { time, obs, h, vv }
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.vv.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.vv.is_empty()
    }

    /// Applies state correction dx to the residuals: VV -= H * dx.
    /// Residuals are left untouched on dimension mismatch.
    pub fn correct_residuals(&mut self, dx: &DVector<f64>) -> Result<(), Error> {
        if self.h.ncols() != dx.nrows() || self.h.nrows() != self.vv.nrows() {
            return Err(Error::MeasurementDimension {
                columns: self.h.ncols(),
                states: dx.nrows(),
            });
        }

        self.vv -= &self.h * dx;
        Ok(())
    }
}


use std::{path::Path, str::FromStr};

use log::LevelFilter;
use std::sync::Once;

use crate::{
    hooks::{OutputHook, StationMap},
    measurement::{MeasurementBatch, ObservationKey},
    prelude::{Constellation, Duration, Epoch, SV},
    record::{LogWriter, Record},
    state::FilterState,
    transition::TransitionDelta,
};

use nalgebra::{DMatrix, DVector};

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// [OutputHook] that keeps everything it is given.
#[derive(Debug, Default)]
pub struct Recorder {
    pub epochs: Vec<(bool, FilterState)>,
    pub residuals: Vec<MeasurementBatch>,
}

impl OutputHook for Recorder {
    fn emit(&mut self, is_final: bool, state: &FilterState, _: &mut StationMap) {
        self.epochs.push((is_final, state.clone()));
    }

    fn residuals(&mut self, batch: &MeasurementBatch) {
        self.residuals.push(batch.clone());
    }
}

/// One epoch of the forward filter, as streamed to its log.
#[derive(Debug, Clone)]
pub struct ForwardEpoch {
    pub deltas: Vec<TransitionDelta>,
    pub minus: Option<FilterState>,
    pub plus: FilterState,
    pub measurements: Option<MeasurementBatch>,
}

/// Scenario start time, epochs are 1s apart
pub fn epoch(i: usize) -> Epoch {
    Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap() + Duration::from_seconds(i as f64)
}

pub fn diag(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_row_slice(values))
}

/// Single observation of the second state [reference, position]
pub fn measurement(i: usize, residual: f64) -> MeasurementBatch {
    MeasurementBatch::new(
        epoch(i),
        vec![ObservationKey::new(
            "ALIC",
            SV::new(Constellation::GPS, 1),
            "L1C",
        )],
        DMatrix::from_row_slice(1, 2, &[0.0, 1.0]),
        DVector::from_vec(vec![residual]),
    )
}

/// Three epochs of a 2 state [reference, position] filter,
/// with position estimates 0, 1 and 3.
pub fn three_epochs() -> Vec<ForwardEpoch> {
    vec![
        ForwardEpoch {
            deltas: vec![],
            minus: None,
            plus: FilterState::new(epoch(0), DVector::from_vec(vec![0.0, 0.0]), diag(&[1.0, 1.0])),
            measurements: Some(measurement(0, 0.5)),
        },
        ForwardEpoch {
            deltas: vec![TransitionDelta::identity(2)],
            minus: Some(FilterState::new(
                epoch(1),
                DVector::from_vec(vec![0.0, 0.0]),
                diag(&[0.0, 2.0]),
            )),
            plus: FilterState::new(epoch(1), DVector::from_vec(vec![0.0, 1.0]), diag(&[0.5, 0.5])),
            measurements: Some(measurement(1, 0.5)),
        },
        ForwardEpoch {
            deltas: vec![TransitionDelta::identity(2)],
            minus: Some(FilterState::new(
                epoch(2),
                DVector::from_vec(vec![0.0, 1.0]),
                diag(&[0.0, 1.0]),
            )),
            plus: FilterState::new(
                epoch(2),
                DVector::from_vec(vec![0.0, 3.0]),
                diag(&[0.25, 0.25]),
            ),
            measurements: Some(measurement(2, 0.5)),
        },
    ]
}

/// n epochs of a random walk, position estimate k at epoch k.
pub fn random_walk(n: usize) -> Vec<ForwardEpoch> {
    (0..n)
        .map(|k| ForwardEpoch {
            deltas: if k == 0 {
                vec![]
            } else {
                vec![TransitionDelta::identity(2), TransitionDelta::identity(2)]
            },
            minus: if k == 0 {
                None
            } else {
                Some(FilterState::new(
                    epoch(k),
                    DVector::from_vec(vec![0.0, k as f64 - 1.0]),
                    diag(&[0.0, 1.0]),
                ))
            },
            plus: FilterState::new(
                epoch(k),
                DVector::from_vec(vec![0.0, k as f64]),
                diag(&[0.5, 0.5]),
            ),
            measurements: Some(measurement(k, 0.1)),
        })
        .collect()
}

/// Streams epochs the way the forward filter does.
/// Returns the start offset of each FILTER_PLUS record.
pub fn write_forward_log(path: &Path, epochs: &[ForwardEpoch]) -> Vec<u64> {
    let mut writer = LogWriter::create(path).unwrap();
    let mut offsets = Vec::with_capacity(epochs.len());

    for epoch in epochs.iter() {
        for delta in epoch.deltas.iter() {
            writer.append(&Record::TransitionMatrix(delta.clone())).unwrap();
        }
        if let Some(minus) = &epoch.minus {
            writer.append(&Record::FilterMinus(minus.clone())).unwrap();
        }

        offsets.push(writer.end());
        writer.append(&Record::FilterPlus(epoch.plus.clone())).unwrap();

        if let Some(batch) = &epoch.measurements {
            writer.append(&Record::Measurement(batch.clone())).unwrap();
        }
    }

    writer.flush().unwrap();
    offsets
}

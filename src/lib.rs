#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

// private modules
mod cfg;
mod error;
mod hooks;
mod inverter;
mod measurement;
mod record;
mod replay;
mod smoother;
mod state;
mod transition;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::cfg::{Config, Mode, BACKWARD_SUFFIX, FORWARD_SUFFIX};
    pub use crate::error::Error;
    pub use crate::hooks::{AmbiguityResolver, NullOutput, OutputHook, Station, StationMap};
    pub use crate::inverter::{solve, Inverter, SolveReport, DEFAULT_INVERTERS};
    pub use crate::measurement::{MeasurementBatch, ObservationKey};
    pub use crate::record::{compact, LogPosition, LogReader, LogWriter, Record, RecordKind};
    pub use crate::replay::replay;
    pub use crate::smoother::{rts_step, Smoother};
    pub use crate::state::{symmetrize, FilterState, Metadata, StateKey, StateKind};
    pub use crate::transition::{TransitionAccumulator, TransitionDelta};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale};
    pub use nalgebra::{DMatrix, DVector};
}

// pub export
pub use error::Error;

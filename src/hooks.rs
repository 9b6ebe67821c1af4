use std::collections::BTreeMap;

use crate::{
    measurement::{MeasurementBatch, ObservationKey},
    state::FilterState,
};

/// Receiving station, as seen by the output writers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Station {
    /// Station name
    pub name: String,
    /// Observations of the epoch being output
    pub observations: Vec<ObservationKey>,
}

impl Station {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            observations: Default::default(),
        }
    }
}

/// Stations, indexed by name
pub type StationMap = BTreeMap<String, Station>;

/// [OutputHook] receives each smoothed epoch. Writing products
/// (files, databases..) is entirely its responsibility.
pub trait OutputHook {
    /// Emits one smoothed epoch. `is_final` is false for intermediate
    /// estimates (streaming mode, lag not reached yet).
    fn emit(&mut self, is_final: bool, state: &FilterState, stations: &mut StationMap);

    /// Receives residuals corrected by the smoothed state.
    fn residuals(&mut self, _batch: &MeasurementBatch) {}
}

/// Optional ambiguity resolution applied to smoothed states before output.
pub trait AmbiguityResolver {
    /// Returns a fixed copy of the state, or None if no usable fix was found.
    fn resolve(&mut self, state: &FilterState) -> Option<FilterState>;
}

/// [OutputHook] that discards everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullOutput;

impl OutputHook for NullOutput {
    fn emit(&mut self, _: bool, _: &FilterState, _: &mut StationMap) {}
}

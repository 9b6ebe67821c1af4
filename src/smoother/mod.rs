//! RTS backward smoothing
use std::fs;

use log::{debug, error, info, warn};
use nalgebra::DMatrix;

mod rts;

pub use rts::rts_step;

use crate::{
    cfg::{Config, Mode},
    error::Error,
    hooks::{AmbiguityResolver, OutputHook, StationMap},
    measurement::MeasurementBatch,
    prelude::Duration,
    record::{compact, LogPosition, LogReader, LogWriter, Record},
    replay::replay,
    state::{FilterState, Metadata},
    transition::TransitionAccumulator,
};

/// Working slots of a single pass. They live for one invocation only.
#[derive(Default)]
struct Pass {
    /// Running metadata map
    metadata: Metadata,
    /// Transition since the latest a-priori checkpoint
    transition: TransitionAccumulator,
    /// Latest a-priori state, not consumed yet
    minus: Option<FilterState>,
    /// Running smoothed estimate
    smoothed: Option<FilterState>,
    /// Measurements of the epoch being smoothed
    measurements: Option<MeasurementBatch>,
    /// Backward log (batch mode)
    writer: Option<LogWriter>,
}

/// How a pass ended
#[derive(Debug, Copy, Clone, PartialEq)]
enum Completion {
    /// Requested lag was reached
    Lag,
    /// Every inverter failed
    Exhausted,
    /// Start of log reached first
    StartOfLog,
}

/// [Smoother] replays the forward filter log backwards and forwards
/// smoothed estimates to the [OutputHook].
pub struct Smoother<O: OutputHook> {
    /// Smoother parametrization
    pub cfg: Config,
    /// [OutputHook]
    output: O,
    /// Optional [AmbiguityResolver], applied on batch replay
    ambiguity: Option<Box<dyn AmbiguityResolver>>,
}

impl<O: OutputHook> Smoother<O> {
    /// Creates a new [Smoother].
    pub fn new(cfg: Config, output: O) -> Self {
        Self {
            cfg,
            output,
            ambiguity: None,
        }
    }

    /// Installs an [AmbiguityResolver], consulted before each replayed output.
    pub fn with_ambiguity_resolver(mut self, resolver: Box<dyn AmbiguityResolver>) -> Self {
        self.ambiguity = Some(resolver);
        self
    }

    /// [OutputHook] reference
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Consumes [Self], returning the [OutputHook]
    pub fn into_output(self) -> O {
        self.output
    }

    /// Smooths backwards from `request` (the latest forward estimate), down
    /// to the configured lag. Returns the smoothed state of the oldest epoch
    /// reached, or None when smoothing is unavailable this cycle: disabled,
    /// not enough history yet, or any error (which is logged).
    pub fn process(
        &mut self,
        request: &FilterState,
        mode: Mode,
        stations: &mut StationMap,
    ) -> Option<FilterState> {
        match self.try_process(request, mode, stations) {
            Ok(smoothed) => smoothed,
            Err(e) => {
                error!("{} - rts smoothing failed: {}", request.time, e);
                None
            },
        }
    }

    /// [Self::process], with errors surfaced.
    pub fn try_process(
        &mut self,
        request: &FilterState,
        mode: Mode,
        stations: &mut StationMap,
    ) -> Result<Option<FilterState>, Error> {
        if !self.cfg.enabled() {
            debug!("{} - rts smoothing disabled", request.time);
            return Ok(None);
        }

        let max_lag = self.cfg.max_lag();
        let (completion, offset, smoothed) = self.run(request, mode, Some(max_lag), stations)?;

        if completion == Completion::StartOfLog {
            debug!(
                "{} - not enough history to reach lag={}",
                request.time, max_lag
            );
            return Ok(None);
        }

        compact(self.cfg.forward_log(), offset)?;
        Ok(smoothed)
    }

    /// Final pass, once forward filtering is over: smooths the entire log,
    /// replays it in chronological order and removes both logs unless
    /// they should be retained.
    pub fn finalize(&mut self, request: &FilterState, stations: &mut StationMap) -> Option<FilterState> {
        match self.try_finalize(request, stations) {
            Ok(smoothed) => smoothed,
            Err(e) => {
                error!("{} - final rts pass failed: {}", request.time, e);
                None
            },
        }
    }

    /// [Self::finalize], with errors surfaced.
    pub fn try_finalize(
        &mut self,
        request: &FilterState,
        stations: &mut StationMap,
    ) -> Result<Option<FilterState>, Error> {
        let (_, _, smoothed) = self.run(request, Mode::Batch, None, stations)?;

        if !self.cfg.retain_logs {
            for path in [self.cfg.forward_log(), self.cfg.backward_log()] {
                info!("removing RTS log {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    error!("failed to remove {}: {}", path.display(), e);
                }
            }
        }

        Ok(smoothed)
    }

    /// Runs one pass. `window` is the maximal lag, None meaning the whole log.
    /// Returns how the pass ended, the last offset read and the smoothed state.
    fn run(
        &mut self,
        request: &FilterState,
        mode: Mode,
        window: Option<Duration>,
        stations: &mut StationMap,
    ) -> Result<(Completion, u64, Option<FilterState>), Error> {
        for station in stations.values_mut() {
            station.observations.clear();
        }

        let mut pass = Pass {
            metadata: request.metadata.clone(),
            ..Default::default()
        };

        let mut reader = LogReader::open(self.cfg.forward_log())?;

        if mode == Mode::Batch {
            let path = self.cfg.backward_log();
            match LogWriter::create(&path) {
                Ok(writer) => pass.writer = Some(writer),
                Err(e) => error!("{}: failed to create backward log: {}", path.display(), e),
            }
        }

        let mut position = LogPosition::End;
        let mut offset = reader.len();
        let mut completion = Completion::StartOfLog;

        while let Some((record, start)) = reader.read_preceding(position)? {
            debug!("found {} @{}", record.kind(), start);

            position = LogPosition::Offset(start);
            offset = start;

            match record {
                Record::Metadata(map) => {
                    if let Some(writer) = pass.writer.as_mut() {
                        writer.append(&Record::Metadata(map.clone()))?;
                    }
                    pass.metadata.extend(map);
                },
                Record::Measurement(batch) => {
                    pass.measurements = Some(batch);
                },
                Record::TransitionMatrix(delta) => {
                    pass.transition.accumulate(&delta)?;
                },
                Record::FilterMinus(minus) => {
                    pass.transition.reset(minus.len());
                    pass.minus = Some(minus);
                },
                Record::FilterPlus(plus) => {
                    let lag = request.time - plus.time;
                    let is_final = window.map_or(true, |max_lag| lag >= max_lag);

                    if mode == Mode::Batch {
                        info!("{} - RTS lag: {}", plus.time, lag);
                    }

                    match self.smooth(&mut pass, plus) {
                        Ok(true) => {
                            self.emit(&mut pass, mode, is_final, stations)?;
                        },
                        Ok(false) => {},
                        Err(Error::SolverExhausted) => {
                            completion = Completion::Exhausted;
                            break;
                        },
                        Err(e) => return Err(e),
                    }

                    if window.is_some() && is_final {
                        completion = Completion::Lag;
                        break;
                    }
                },
                record => {
                    return Err(Error::UnexpectedRecord(record.kind()));
                },
            }
        }

        if let Some(mut writer) = pass.writer.take() {
            writer.flush()?;
            drop(writer);

            let ambiguity = match self.ambiguity.as_mut() {
                Some(resolver) => Some(resolver.as_mut() as &mut dyn AmbiguityResolver),
                None => None,
            };

            replay(
                self.cfg.backward_log(),
                &request.metadata,
                self.cfg.output_residuals,
                &mut self.output,
                ambiguity,
                stations,
            )?;
        }

        Ok((completion, offset, pass.smoothed))
    }

    /// Folds a new a-posteriori state into the running smoothed estimate.
    /// Returns true when a new smoothed epoch is ready for output.
    fn smooth(&self, pass: &mut Pass, mut plus: FilterState) -> Result<bool, Error> {
        plus.validate()?;

        let smoothed = match pass.smoothed.as_mut() {
            Some(smoothed) => smoothed,
            None => {
                // most recent epoch: nothing to smooth
                plus.metadata = pass.metadata.clone();
                pass.smoothed = Some(plus);
                return Ok(true);
            },
        };

        let mut minus = match pass.minus.take() {
            Some(minus) => minus,
            None => {
                warn!("{} - no a-priori state to smooth against", plus.time);
                pass.measurements = None;
                return Ok(false);
            },
        };

        let f = pass
            .transition
            .matrix()
            .cloned()
            .unwrap_or_else(|| DMatrix::identity(minus.len(), plus.len()));

        let report = rts_step(smoothed, &mut minus, &mut plus, &f, self.cfg.inverters())?;

        if !report.failures.is_empty() {
            debug!(
                "{} - smoother gain solved with {} after {} failure(s)",
                smoothed.time,
                report.inverter,
                report.failures.len()
            );
        }

        if let Some(batch) = pass.measurements.as_mut() {
            if let Err(e) = batch.correct_residuals(&smoothed.dx) {
                error!("{} - residuals left uncorrected: {}", smoothed.time, e);
            }
        }

        smoothed.metadata = pass.metadata.clone();
        Ok(true)
    }

    /// Outputs the running smoothed estimate along with its measurements.
    fn emit(
        &mut self,
        pass: &mut Pass,
        mode: Mode,
        is_final: bool,
        stations: &mut StationMap,
    ) -> Result<(), Error> {
        let smoothed = match pass.smoothed.as_ref() {
            Some(smoothed) => smoothed,
            None => return Ok(()),
        };

        let measurements = pass.measurements.take();

        match mode {
            Mode::Batch => {
                if let Some(writer) = pass.writer.as_mut() {
                    writer.append(&Record::FilterSmoothed(smoothed.clone()))?;
                    if let Some(batch) = measurements {
                        writer.append(&Record::Measurement(batch))?;
                    }
                }
            },
            Mode::Streaming => {
                debug!("{} - rts output (final={})", smoothed.time, is_final);
                self.output.emit(is_final, smoothed, stations);

                if self.cfg.output_intermediate {
                    if let Some(batch) = measurements {
                        self.output.residuals(&batch);
                    }
                }
            },
        }

        Ok(())
    }
}

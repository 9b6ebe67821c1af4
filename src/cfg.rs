use std::path::PathBuf;

use serde::Deserialize;

use crate::{
    inverter::{Inverter, DEFAULT_INVERTERS},
    prelude::Duration,
};

/// Forward log file suffix
pub const FORWARD_SUFFIX: &str = ".forward";

/// Backward (smoothed) log file suffix
pub const BACKWARD_SUFFIX: &str = ".backward";

/// Execution mode of a smoothing pass
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Smoother invoked inline during forward filtering:
    /// each smoothed epoch is forwarded to the output hook right away.
    #[default]
    Streaming,
    /// Persisted pass: smoothed epochs are streamed to the backward log,
    /// which is then replayed to the output hook in chronological order.
    Batch,
}

fn default_basename() -> PathBuf {
    PathBuf::from("filter.rts")
}

fn default_max_lag() -> f64 {
    0.0
}

fn default_inverters() -> Vec<Inverter> {
    DEFAULT_INVERTERS.to_vec()
}

fn default_retain_logs() -> bool {
    false
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Log base path, forward and backward logs are
    /// located next to it (see [FORWARD_SUFFIX] and [BACKWARD_SUFFIX]).
    #[serde(default = "default_basename")]
    pub basename: PathBuf,
    /// Maximal smoothing lag (s). Null or negative lag disables smoothing.
    #[serde(default = "default_max_lag")]
    pub max_lag_s: f64,
    /// [Inverter]s to try in order, to solve for the smoother gain.
    #[serde(default = "default_inverters")]
    pub inverters: Vec<Inverter>,
    /// Keep logs once no more smoothing is pending
    #[serde(default = "default_retain_logs")]
    pub retain_logs: bool,
    /// Forward residuals of intermediate (non final) epochs, in streaming mode
    #[serde(default)]
    pub output_intermediate: bool,
    /// Forward replayed residuals, in batch mode
    #[serde(default)]
    pub output_residuals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            basename: default_basename(),
            max_lag_s: default_max_lag(),
            inverters: default_inverters(),
            retain_logs: default_retain_logs(),
            output_intermediate: false,
            output_residuals: false,
        }
    }
}

impl Config {
    /// Returns [Config] for logs located at basename, with desired lag.
    /// You can then customize [Self] as you will.
    pub fn new(basename: impl Into<PathBuf>, max_lag: Duration) -> Self {
        let mut s = Self::default();
        s.basename = basename.into();
        s.max_lag_s = max_lag.to_seconds();
        s
    }

    /// Copies and returns [Config] with given [Inverter] preference
    pub fn with_inverters(&self, inverters: &[Inverter]) -> Self {
        let mut s = self.clone();
        s.inverters = inverters.to_vec();
        s
    }

    /// Copies and returns [Config] with log retention preference
    pub fn with_retained_logs(&self, retain: bool) -> Self {
        let mut s = self.clone();
        s.retain_logs = retain;
        s
    }

    /// Maximal smoothing lag
    pub fn max_lag(&self) -> Duration {
        Duration::from_seconds(self.max_lag_s)
    }

    /// True when smoothing is enabled
    pub fn enabled(&self) -> bool {
        self.max_lag_s > 0.0
    }

    /// [Inverter]s to try in order
    pub fn inverters(&self) -> &[Inverter] {
        if self.inverters.is_empty() {
            &DEFAULT_INVERTERS
        } else {
            &self.inverters
        }
    }

    fn suffixed(&self, suffix: &str) -> PathBuf {
        let mut path = self.basename.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    /// Forward log path
    pub fn forward_log(&self) -> PathBuf {
        self.suffixed(FORWARD_SUFFIX)
    }

    /// Backward log path
    pub fn backward_log(&self) -> PathBuf {
        self.suffixed(BACKWARD_SUFFIX)
    }
}

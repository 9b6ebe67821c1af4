//! Self framed binary records, streamed by the forward filter
//! and by the smoother itself.
//!
//! Each record is framed as
//!
//! ```text
//! | kind: u8 | len: u32 (LE) | payload (len bytes) | len: u32 (LE) | kind: u8 |
//! ```
//!
//! The trailer duplicates the header so the log can be traversed backward
//! from any record boundary, without index. There is no file header:
//! any suffix of a log starting on a record boundary is a valid log.
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::Error,
    measurement::MeasurementBatch,
    state::{FilterState, Metadata},
    transition::TransitionDelta,
};

mod reader;
mod writer;

pub use reader::{LogPosition, LogReader};
pub use writer::{compact, LogWriter};

/// Size of both frame header and trailer, in bytes.
pub const FRAME_SIZE: usize = 5;

/// Tag of each record type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    Metadata = 1,
    Measurement = 2,
    TransitionMatrix = 3,
    FilterMinus = 4,
    FilterPlus = 5,
    FilterSmoothed = 6,
}

impl TryFrom<u8> for RecordKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Error> {
        match tag {
            1 => Ok(Self::Metadata),
            2 => Ok(Self::Measurement),
            3 => Ok(Self::TransitionMatrix),
            4 => Ok(Self::FilterMinus),
            5 => Ok(Self::FilterPlus),
            6 => Ok(Self::FilterSmoothed),
            tag => Err(Error::UnknownRecordKind(tag)),
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Metadata => write!(f, "METADATA"),
            Self::Measurement => write!(f, "MEASUREMENT"),
            Self::TransitionMatrix => write!(f, "TRANSITION_MATRIX"),
            Self::FilterMinus => write!(f, "FILTER_MINUS"),
            Self::FilterPlus => write!(f, "FILTER_PLUS"),
            Self::FilterSmoothed => write!(f, "FILTER_SMOOTHED"),
        }
    }
}

/// Record stored in forward and backward logs.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Metadata(Metadata),
    Measurement(MeasurementBatch),
    TransitionMatrix(TransitionDelta),
    /// A-priori (predicted) state
    FilterMinus(FilterState),
    /// A-posteriori (updated) state
    FilterPlus(FilterState),
    FilterSmoothed(FilterState),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Metadata(_) => RecordKind::Metadata,
            Self::Measurement(_) => RecordKind::Measurement,
            Self::TransitionMatrix(_) => RecordKind::TransitionMatrix,
            Self::FilterMinus(_) => RecordKind::FilterMinus,
            Self::FilterPlus(_) => RecordKind::FilterPlus,
            Self::FilterSmoothed(_) => RecordKind::FilterSmoothed,
        }
    }

    /// Encodes this [Record] as a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let payload = match self {
            Self::Metadata(map) => bincode::serialize(map)?,
            Self::Measurement(meas) => bincode::serialize(meas)?,
            Self::TransitionMatrix(delta) => bincode::serialize(delta)?,
            Self::FilterMinus(state) | Self::FilterPlus(state) | Self::FilterSmoothed(state) => {
                bincode::serialize(state)?
            },
        };

        let len = u32::try_from(payload.len())
            .map_err(|_| Error::Codec(Box::new(bincode::ErrorKind::SizeLimit)))?;

        let tag = self.kind() as u8;

        let mut frame = Vec::with_capacity(payload.len() + 2 * FRAME_SIZE);
        frame.push(tag);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.push(tag);
        Ok(frame)
    }

    /// Decodes payload of given [RecordKind]
    pub(crate) fn decode(kind: RecordKind, payload: &[u8]) -> Result<Self, Error> {
        fn de<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Error> {
            Ok(bincode::deserialize(payload)?)
        }

        Ok(match kind {
            RecordKind::Metadata => Self::Metadata(de(payload)?),
            RecordKind::Measurement => Self::Measurement(de(payload)?),
            RecordKind::TransitionMatrix => Self::TransitionMatrix(de(payload)?),
            RecordKind::FilterMinus => Self::FilterMinus(de(payload)?),
            RecordKind::FilterPlus => Self::FilterPlus(de(payload)?),
            RecordKind::FilterSmoothed => Self::FilterSmoothed(de(payload)?),
        })
    }
}

/// Frame header or trailer: (tag, payload length)
pub(crate) fn parse_frame(bytes: &[u8; FRAME_SIZE], trailer: bool) -> (u8, u32) {
    let (tag, len) = if trailer {
        (bytes[4], [bytes[0], bytes[1], bytes[2], bytes[3]])
    } else {
        (bytes[0], [bytes[1], bytes[2], bytes[3], bytes[4]])
    };
    (tag, u32::from_le_bytes(len))
}

/// Lossless [Epoch] (de)serialization: (time scale, centuries, nanoseconds)
pub(crate) mod epoch_serde {
    use hifitime::{Duration, Epoch, TimeScale};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(t: &Epoch, s: S) -> Result<S::Ok, S::Error> {
        let (centuries, nanos) = t.duration.to_parts();
        (t.time_scale as u8, centuries, nanos).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Epoch, D::Error> {
        let (ts, centuries, nanos) = <(u8, i16, u64)>::deserialize(d)?;
        Ok(Epoch::from_duration(
            Duration::from_parts(centuries, nanos),
            TimeScale::from(ts),
        ))
    }
}

use thiserror::Error;

use crate::record::RecordKind;

#[derive(Debug, Error)]
pub enum Error {
    /// Any I/O failure on the forward or backward log.
    #[error("log i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Record payload could not be (de)serialized.
    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The frame ending (or starting) at this offset is shorter
    /// than its own header claims.
    #[error("truncated record @{0}")]
    TruncatedRecord(u64),

    /// Header and trailer of the frame at this offset disagree.
    #[error("corrupt record @{0}")]
    CorruptRecord(u64),

    #[error("unknown record tag {0}")]
    UnknownRecordKind(u8),

    #[error("offset {offset} is outside of log ({len} bytes)")]
    OffsetOutOfBounds { offset: u64, len: u64 },

    /// The log is this crate's own artifact: a record that cannot
    /// appear at this point of the traversal means corruption.
    #[error("unexpected {0} record")]
    UnexpectedRecord(RecordKind),

    #[error("transition entry ({row}, {col}) outside of {rows}x{cols} matrix")]
    TransitionIndex {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("transition dimension mismatch: expecting {expected:?}, got {found:?}")]
    TransitionDimension {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("state dimension mismatch: expecting {expected}, got {found}")]
    StateDimension { expected: usize, found: usize },

    /// Covariance matrix does not match the state vector.
    #[error("covariance dimension mismatch: {states} states, P is {found:?}")]
    CovarianceDimension { states: usize, found: (usize, usize) },

    /// Design matrix does not match the state correction.
    #[error("measurement dimension mismatch: H has {columns} columns, dx has {states} states")]
    MeasurementDimension { columns: usize, states: usize },

    /// Every configured strategy failed to solve for the smoother gain.
    #[error("all inverters failed to solve for smoother gain")]
    SolverExhausted,
}

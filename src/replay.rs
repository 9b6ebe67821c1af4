use std::path::Path;

use log::{debug, info};

use crate::{
    error::Error,
    hooks::{AmbiguityResolver, OutputHook, StationMap},
    record::{LogPosition, LogReader, Record},
    state::Metadata,
};

/// Replays a backward log from its end down to start of file, so epochs
/// reach the [OutputHook] in chronological order, each exactly once and
/// always as final. Returns the number of epochs emitted.
pub fn replay<O: OutputHook>(
    path: impl AsRef<Path>,
    metadata: &Metadata,
    output_residuals: bool,
    output: &mut O,
    mut ambiguity: Option<&mut dyn AmbiguityResolver>,
    stations: &mut StationMap,
) -> Result<usize, Error> {
    let path = path.as_ref();
    info!("{}: replaying smoothed epochs", path.display());

    let mut reader = LogReader::open(path)?;
    let mut metadata = metadata.clone();
    let mut position = LogPosition::End;
    let mut emitted = 0;

    while let Some((record, offset)) = reader.read_preceding(position)? {
        debug!("replaying {} @{}", record.kind(), offset);

        match record {
            Record::Metadata(map) => {
                metadata.extend(map);
            },
            Record::Measurement(batch) => {
                if output_residuals {
                    output.residuals(&batch);
                }
            },
            Record::FilterSmoothed(mut state) => {
                state.validate()?;
                state.metadata = metadata.clone();

                let fixed = match ambiguity.as_deref_mut() {
                    Some(resolver) => resolver.resolve(&state),
                    None => None,
                };

                match fixed {
                    Some(fixed) => output.emit(true, &fixed, stations),
                    None => output.emit(true, &state, stations),
                }

                emitted += 1;
            },
            record => {
                return Err(Error::UnexpectedRecord(record.kind()));
            },
        }

        position = LogPosition::Offset(offset);
    }

    Ok(emitted)
}

mod json_stream;
pub mod claude;
pub mod openai;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::Value;

use crate::error::Error;
pub(crate) use json_stream::JsonArrayReader;

/// Opens `path` and peeks at the first top-level array element, returning
/// its parsed `Value` without consuming the rest of the file. Used by
/// provider autodetection (§4.2.1) and by explicit-provider mismatch
/// warnings.
pub(crate) fn peek_first_element(path: &Path) -> Result<Option<Value>, Error> {
    let file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut reader = JsonArrayReader::new(BufReader::new(file));
    let bytes = match reader.next_element().map_err(|e| with_path(e, path))? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| Error::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(value))
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::ParseError { reason, .. } => Error::ParseError {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    }
}

pub(crate) fn open_array_reader(path: &Path) -> Result<JsonArrayReader<BufReader<File>>, Error> {
    let file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    Ok(JsonArrayReader::new(BufReader::new(file)))
}

/// Shared §4.2.4 schema-version gate: if `tag` carries a recognizable major
/// version (a leading integer before an optional `.minor`), reject anything
/// newer than `supported`. Absent or unparsable tags are treated as
/// unversioned and pass through untouched — neither real-world provider
/// export carries this field today, but the mechanism must exist.
pub(crate) fn check_schema_version(tag: Option<&Value>, supported: u32) -> Result<(), Error> {
    let Some(tag) = tag.and_then(|v| {
        v.as_str()
            .map(str::to_string)
            .or_else(|| v.as_u64().map(|n| n.to_string()))
    }) else {
        return Ok(());
    };
    let major: Option<u32> = tag.split('.').next().and_then(|s| s.parse().ok());
    match major {
        Some(major) if major > supported => Err(Error::UnsupportedSchemaVersion {
            found: tag,
            supported,
        }),
        _ => Ok(()),
    }
}

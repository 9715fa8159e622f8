use std::convert::TryFrom;

use anyhow::{anyhow, Result};

use crate::capture::CaptureMode;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_mode(value: &str) -> Result<CaptureMode> {
    match value {
        "guided" => Ok(CaptureMode::Guided),
        "game" => Ok(CaptureMode::Game),
        other => Err(anyhow!("unknown capture mode {other}")),
    }
}

/// Wraps a conversion failure so it can be returned from a row mapper.
pub fn row_error(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        err.to_string(),
    )))
}

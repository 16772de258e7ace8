//! Parser for `INFLUX_BATCHER_STREAMS`.
//!
//! Entries are separated by `;`. Each entry is `name,database` followed by
//! optional `key=value` options: `rp`, `precision`, `capacity`, `interval_ms`.
//!
//! ```text
//! cpu,telegraf,rp=shortterm,capacity=500,interval_ms=2000;mem,telegraf
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::registry::{Precision, StreamSettings};

#[derive(Debug, Error, PartialEq)]
pub enum StreamSpecError {
    #[error("stream entry {0:?} must start with name,database")]
    MissingDatabase(String),

    #[error("stream {stream}: unknown option {option:?}")]
    UnknownOption { stream: String, option: String },

    #[error("stream {stream}: option {option} has invalid value {value:?}")]
    InvalidValue {
        stream: String,
        option: String,
        value: String,
    },
}

pub fn parse(raw: &str) -> Result<Vec<StreamSettings>, StreamSpecError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<StreamSettings, StreamSpecError> {
    let mut parts = entry.split(',').map(str::trim);

    let name = parts.next().filter(|s| !s.is_empty());
    let database = parts.next().filter(|s| !s.is_empty());
    let (Some(name), Some(database)) = (name, database) else {
        return Err(StreamSpecError::MissingDatabase(entry.to_owned()));
    };

    let mut settings = StreamSettings::new(name, database);

    for option in parts {
        let Some((key, value)) = option.split_once('=') else {
            return Err(StreamSpecError::UnknownOption {
                stream: name.to_owned(),
                option: option.to_owned(),
            });
        };
        let (key, value) = (key.trim(), value.trim());
        let invalid = || StreamSpecError::InvalidValue {
            stream: name.to_owned(),
            option: key.to_owned(),
            value: value.to_owned(),
        };

        settings = match key {
            "rp" if !value.is_empty() => settings.retention_policy(value),
            "rp" => return Err(invalid()),
            "precision" => settings.precision(Precision::parse(value).map_err(|_| invalid())?),
            "capacity" => settings.capacity(value.parse().map_err(|_| invalid())?),
            "interval_ms" => {
                let ms: u64 = value.parse().map_err(|_| invalid())?;
                settings.flush_interval(Duration::from_millis(ms))
            }
            _ => {
                return Err(StreamSpecError::UnknownOption {
                    stream: name.to_owned(),
                    option: key.to_owned(),
                });
            }
        };
    }

    Ok(settings)
}

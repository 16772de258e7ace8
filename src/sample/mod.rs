use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

/// Key that InfluxDB reserves for the point timestamp.
const RESERVED_KEY: &str = "time";

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("sample stream name must not be empty")]
    EmptyStream,

    #[error("{stream}: tag keys must not be empty")]
    EmptyTagKey { stream: String },

    #[error("{stream}: field keys must not be empty")]
    EmptyFieldKey { stream: String },

    #[error("{stream}: \"time\" is reserved and cannot be used as a {kind} key")]
    ReservedKey { stream: String, kind: &'static str },

    #[error("{kind} {value:?} contains a control character")]
    ControlCharacter { kind: &'static str, value: String },

    #[error("{stream}: a sample needs at least one field")]
    NoFields { stream: String },

    #[error("{stream}: field {key} has non-finite value {value}")]
    NonFiniteField {
        stream: String,
        key: String,
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInteger(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_owned())
    }
}

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, FieldValue>;

/// One observation for a stream. Validated on construction and immutable after.
///
/// Cloning is cheap: the contents are shared, so buffer snapshots only bump a
/// reference count per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample(Arc<SampleData>);

#[derive(Debug, PartialEq)]
struct SampleData {
    stream: String,
    tags: Tags,
    fields: Fields,
    timestamp: SystemTime,
}

impl Sample {
    pub fn new(
        stream: impl Into<String>,
        tags: Tags,
        fields: Fields,
        timestamp: SystemTime,
    ) -> Result<Self, SampleError> {
        let stream = stream.into();
        if stream.is_empty() {
            return Err(SampleError::EmptyStream);
        }
        if has_control(&stream) {
            return Err(SampleError::ControlCharacter {
                kind: "stream name",
                value: stream,
            });
        }

        for (key, value) in &tags {
            if key.is_empty() {
                return Err(SampleError::EmptyTagKey { stream });
            }
            if key == RESERVED_KEY {
                return Err(SampleError::ReservedKey { stream, kind: "tag" });
            }
            if has_control(key) {
                return Err(SampleError::ControlCharacter {
                    kind: "tag key",
                    value: key.clone(),
                });
            }
            if has_control(value) {
                return Err(SampleError::ControlCharacter {
                    kind: "tag value",
                    value: value.clone(),
                });
            }
        }

        for (key, value) in &fields {
            if key.is_empty() {
                return Err(SampleError::EmptyFieldKey { stream });
            }
            if key == RESERVED_KEY {
                return Err(SampleError::ReservedKey {
                    stream,
                    kind: "field",
                });
            }
            if has_control(key) {
                return Err(SampleError::ControlCharacter {
                    kind: "field key",
                    value: key.clone(),
                });
            }
            if let FieldValue::Float(v) = value
                && !v.is_finite()
            {
                return Err(SampleError::NonFiniteField {
                    stream,
                    key: key.clone(),
                    value: *v,
                });
            }
        }

        if fields.is_empty() {
            return Err(SampleError::NoFields { stream });
        }

        Ok(Self(Arc::new(SampleData {
            stream,
            tags,
            fields,
            timestamp,
        })))
    }

    pub fn stream(&self) -> &str {
        &self.0.stream
    }

    pub fn tags(&self) -> &Tags {
        &self.0.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.0.fields
    }

    pub fn timestamp(&self) -> SystemTime {
        self.0.timestamp
    }
}

// Line protocol has no escape for line breaks or other control characters.
fn has_control(s: &str) -> bool {
    s.chars().any(char::is_control)
}

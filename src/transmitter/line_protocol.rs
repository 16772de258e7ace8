//! InfluxDB line protocol encoding.
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`, one
//! sample per line.

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::registry::Precision;
use crate::sample::{FieldValue, Sample};

pub fn encode(samples: &[Sample], precision: Precision) -> String {
    let mut out = String::new();
    for sample in samples {
        write_sample(&mut out, sample, precision);
        out.push('\n');
    }
    out
}

fn write_sample(out: &mut String, sample: &Sample, precision: Precision) {
    escape_into(out, sample.stream(), &[',', ' ']);

    // BTreeMap iteration keeps tags sorted by key, which InfluxDB prefers.
    for (key, value) in sample.tags() {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    let mut separator = ' ';
    for (key, value) in sample.fields() {
        out.push(separator);
        separator = ',';
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        write_field_value(out, value);
    }

    let _ = write!(out, " {}", timestamp(sample.timestamp(), precision));
}

fn write_field_value(out: &mut String, value: &FieldValue) {
    // Writing to a String cannot fail.
    let _ = match value {
        FieldValue::Float(v) => write!(out, "{v}"),
        FieldValue::Integer(v) => write!(out, "{v}i"),
        FieldValue::UInteger(v) => write!(out, "{v}u"),
        FieldValue::Boolean(v) => write!(out, "{v}"),
        FieldValue::String(v) => {
            out.push('"');
            escape_into(out, v, &['"', '\\']);
            out.push('"');
            Ok(())
        }
    };
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Time since the epoch in units of `precision`, truncated.
fn timestamp(ts: SystemTime, precision: Precision) -> i128 {
    let nanos = match ts.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    };
    nanos / precision.nanos_per_unit()
}

//! Snapshot serialization to the wire JSON format.
//!
//! The exported object always carries the six top-level keys (`cpu`, `gpu`,
//! `memory`, `disks`, `network`, `processes`), with empty collections
//! serialized as `[]` rather than omitted. Floating-point fields are rounded
//! to two decimals at serialization.

use crate::snapshot::Snapshot;
use serde::ser::SerializeSeq;
use serde::Serializer;

/// Render a snapshot as pretty-printed JSON.
pub fn to_json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

fn round_to_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// serde `serialize_with` helper rounding an f64 field to two decimals.
pub(crate) fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to_2(*value))
}

/// As [`round2`], for sequences of f64.
pub(crate) fn round2_vec<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        seq.serialize_element(&round_to_2(*value))?;
    }
    seq.end()
}

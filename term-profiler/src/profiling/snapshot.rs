//! Measure snapshots emitted by the aggregation engine.

use std::collections::BTreeMap;
use std::fmt;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{ProfilerError, ProfilerResult};

/// One evaluation step's worth of measure values, keyed by measure name.
///
/// Snapshots carry no timestamp; arrival order at the consumer is the only
/// ordering that matters.
///
/// Serializes as a JSON object of numbers. Non-finite values are passed
/// through unchanged, so they are written as the strings `"NaN"`, `"inf"`
/// and `"-inf"` and read back from the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: BTreeMap<String, f64>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a measure value, returning the previous one if any.
    pub fn insert(&mut self, measure: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(measure.into(), value)
    }

    /// Returns the value of a measure.
    pub fn get(&self, measure: &str) -> Option<f64> {
        self.values.get(measure).copied()
    }

    /// Returns true if the snapshot carries the measure.
    pub fn contains(&self, measure: &str) -> bool {
        self.values.contains_key(measure)
    }

    /// Iterates over `(measure, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of measures in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the snapshot carries no measures.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops the named entries.
    pub fn without(mut self, excluded: &[String]) -> Self {
        self.values.retain(|name, _| !excluded.contains(name));
        self
    }

    /// Extracts one snapshot per row of an engine output batch.
    ///
    /// Columns named in `excluded` (engine bookkeeping such as `__time__`)
    /// are skipped. Every other column must cast to `Float64`; a value that
    /// cannot is an error. Null cells are left out of the row's snapshot.
    pub fn from_record_batch(
        batch: &RecordBatch,
        excluded: &[String],
    ) -> ProfilerResult<Vec<Snapshot>> {
        let schema = batch.schema();
        let mut columns: Vec<(&str, ArrayRef)> = Vec::with_capacity(batch.num_columns());

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            if excluded.iter().any(|c| c == field.name()) {
                continue;
            }
            let values = cast_with_options(column, &DataType::Float64, &strict_cast())
                .map_err(|e| {
                    ProfilerError::invalid_data(format!(
                        "measure column '{}' is not numeric: {e}",
                        field.name()
                    ))
                })?;
            columns.push((field.name().as_str(), values));
        }

        let snapshots = (0..batch.num_rows())
            .map(|row| {
                let mut snapshot = Snapshot::new();
                for (name, values) in &columns {
                    let values = values.as_primitive::<Float64Type>();
                    if values.is_valid(row) {
                        snapshot.insert(*name, values.value(row));
                    } else {
                        warn!(measure = %name, row, "Skipping null measure value");
                    }
                }
                snapshot
            })
            .collect();

        Ok(snapshots)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.values
                .iter()
                .map(|(name, value)| (name, MeasureValue(*value))),
        )
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = BTreeMap::<String, MeasureValue>::deserialize(deserializer)?;
        Ok(Self {
            values: values
                .into_iter()
                .map(|(name, value)| (name, value.0))
                .collect(),
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct MeasureValue(#[serde(with = "measure_value")] f64);

/// Serde representation of one measure value: a number when finite, a
/// string otherwise.
pub(crate) mod measure_value {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text
                .parse::<f64>()
                .ok()
                .filter(|value| !value.is_finite())
                .ok_or_else(|| D::Error::custom(format!("invalid measure value '{text}'"))),
        }
    }
}

fn strict_cast() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn engine_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("price_min_prof", DataType::Float64, true),
            Field::new("price_total_count_prof_prof", DataType::Int64, false),
            Field::new("__time__", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(1.5), None])),
                Arc::new(Int64Array::from(vec![10, 12])),
                Arc::new(Int64Array::from(vec![1000, 1002])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_record_batch_excludes_metadata() {
        let excluded = vec!["__time__".to_string()];
        let snapshots = Snapshot::from_record_batch(&engine_batch(), &excluded).unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].get("price_min_prof"), Some(1.5));
        assert_eq!(snapshots[0].get("price_total_count_prof_prof"), Some(10.0));
        assert!(!snapshots[0].contains("__time__"));

        // Null min in the second row is dropped, the count survives
        assert_eq!(snapshots[1].len(), 1);
        assert_eq!(snapshots[1].get("price_total_count_prof_prof"), Some(12.0));
    }

    #[test]
    fn test_from_record_batch_rejects_non_numeric() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "label",
            DataType::Utf8,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["not a number"]))],
        )
        .unwrap();

        let result = Snapshot::from_record_batch(&batch, &[]);
        assert!(matches!(result, Err(ProfilerError::InvalidData(_))));
    }

    #[test]
    fn test_display_and_serde() {
        let snapshot: Snapshot = [("b", 2.0), ("a", 0.5)].into_iter().collect();
        assert_eq!(snapshot.to_string(), "{a: 0.5, b: 2}");

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"a":0.5,"b":2.0}"#);
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        let snapshot: Snapshot = [
            ("inf", f64::INFINITY),
            ("nan", f64::NAN),
            ("neg", f64::NEG_INFINITY),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"inf":"inf","nan":"NaN","neg":"-inf"}"#);

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("inf"), Some(f64::INFINITY));
        assert_eq!(back.get("neg"), Some(f64::NEG_INFINITY));
        assert!(back.get("nan").unwrap().is_nan());

        // Only non-finite values may be spelled as strings
        assert!(serde_json::from_str::<Snapshot>(r#"{"a":"12"}"#).is_err());
        assert!(serde_json::from_str::<Snapshot>(r#"{"a":"high"}"#).is_err());
    }
}

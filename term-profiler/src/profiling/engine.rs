//! DataFusion evaluation of a measure catalog.
//!
//! Windowing, grouping and ingestion belong to the streaming engine. This
//! adapter covers the last step only: run the catalog's aggregates over a
//! table registered in a [`SessionContext`] and return the resulting
//! [`Snapshot`].

use datafusion::prelude::*;
use tracing::{debug, instrument};

use super::measures::{quote_ident, MeasureCatalog};
use super::snapshot::Snapshot;
use crate::error::{ProfilerError, ProfilerResult};

/// Evaluates measure catalogs with SQL aggregates.
#[derive(Debug, Clone)]
pub struct SqlMeasureEngine {
    table_name: String,
}

impl SqlMeasureEngine {
    /// Creates an engine reading from the named table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    /// The table the engine reads from.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The single-row aggregate query computing every measure of the catalog.
    ///
    /// Returns `None` for an empty catalog.
    pub fn query(&self, catalog: &MeasureCatalog) -> Option<String> {
        if catalog.is_empty() {
            return None;
        }
        let precision = catalog.missing_fraction_precision();
        let select_list = catalog
            .measures()
            .iter()
            .map(|m| format!("{} AS {}", m.sql_expr(precision), quote_ident(m.name())))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "SELECT {select_list} FROM {}",
            quote_ident(&self.table_name)
        ))
    }

    /// Computes one snapshot of the catalog's measures over the table.
    ///
    /// Measures whose aggregate is null (min, max and mean of a column with
    /// no present value) are absent from the snapshot.
    #[instrument(skip_all, fields(table = %self.table_name, measures = catalog.len()))]
    pub async fn evaluate(
        &self,
        ctx: &SessionContext,
        catalog: &MeasureCatalog,
    ) -> ProfilerResult<Snapshot> {
        let Some(sql) = self.query(catalog) else {
            return Ok(Snapshot::new());
        };
        debug!(sql = %sql, "Evaluating measure catalog");

        let batches = ctx.sql(&sql).await?.collect().await?;
        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(Snapshot::from_record_batch(batch, &[])?);
        }

        match rows.len() {
            1 => Ok(rows.remove(0)),
            n => Err(ProfilerError::invalid_data(format!(
                "aggregate query returned {n} rows, expected 1"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::measures::{MeasureCatalogBuilder, StreamSchema};
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn sensor_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("host", DataType::Utf8, false),
            Field::new("latency", DataType::Float64, true),
            Field::new("bytes", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef,
                Arc::new(StringArray::from(vec!["a", "a", "b", "b"])),
                Arc::new(Float64Array::from(vec![Some(10.0), None, Some(30.0), None])),
                Arc::new(Int64Array::from(vec![Some(100), Some(200), Some(300), None])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_catalog() {
        let batch = sensor_batch();
        let ctx = SessionContext::new();
        ctx.register_batch("data", batch.clone()).unwrap();

        let catalog =
            MeasureCatalogBuilder::new().build(&StreamSchema::new(batch.schema(), "ts", "host"));
        let snapshot = SqlMeasureEngine::new("data")
            .evaluate(&ctx, &catalog)
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 12);
        assert_eq!(snapshot.get("latency_min_prof"), Some(10.0));
        assert_eq!(snapshot.get("latency_max_prof"), Some(30.0));
        assert_eq!(snapshot.get("latency_mean_prof"), Some(20.0));
        assert_eq!(snapshot.get("latency_missing_count_prof"), Some(2.0));
        assert_eq!(snapshot.get("latency_total_count_prof_prof"), Some(4.0));
        assert_eq!(snapshot.get("latency_missing_percentage_prof"), Some(0.5));
        assert_eq!(snapshot.get("bytes_mean_prof"), Some(200.0));
        assert_eq!(snapshot.get("bytes_missing_percentage_prof"), Some(0.25));
    }

    #[tokio::test]
    async fn test_missing_fraction_is_rounded() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Float64, true)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Float64Array::from(vec![Some(1.0), None, Some(2.0)])) as ArrayRef],
        )
        .unwrap();
        let ctx = SessionContext::new();
        ctx.register_batch("data", batch).unwrap();

        let catalog = MeasureCatalogBuilder::new().build(&StreamSchema::new(schema, "t", "i"));
        let snapshot = SqlMeasureEngine::new("data")
            .evaluate(&ctx, &catalog)
            .await
            .unwrap();
        assert_eq!(snapshot.get("v_missing_percentage_prof"), Some(0.333));
    }

    #[tokio::test]
    async fn test_empty_table_and_empty_catalog() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Float64, true)]));
        let ctx = SessionContext::new();
        ctx.register_batch("data", RecordBatch::new_empty(schema.clone()))
            .unwrap();

        let engine = SqlMeasureEngine::new("data");
        let catalog = MeasureCatalogBuilder::new().build(&StreamSchema::new(schema, "t", "i"));
        let snapshot = engine.evaluate(&ctx, &catalog).await.unwrap();

        // Aggregates over no rows: min/max/mean are null, counts are zero
        assert!(snapshot.get("v_min_prof").is_none());
        assert_eq!(snapshot.get("v_total_count_prof_prof"), Some(0.0));
        assert_eq!(snapshot.get("v_missing_percentage_prof"), Some(0.0));

        let empty = engine
            .evaluate(&ctx, &MeasureCatalog::default())
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(engine.query(&MeasureCatalog::default()).is_none());
    }
}

//! Measure definitions and the catalog built from a stream's schema.
//!
//! Every numeric source column gets six measures whose names follow a fixed
//! convention downstream consumers match on:
//!
//! | Kind | Name |
//! |---|---|
//! | min | `{col}_min_prof` |
//! | max | `{col}_max_prof` |
//! | mean | `{col}_mean_prof` |
//! | missing count | `{col}_missing_count_prof` |
//! | total count | `{col}_total_count_prof_prof` |
//! | missing fraction | `{col}_missing_percentage_prof` |
//!
//! The doubled `_prof_prof` suffix on the total count is a known irregularity
//! kept for compatibility with existing dashboards.

use std::fmt;

use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::config::{ProfilerConfig, VALIDATION_METADATA_COLUMN};

/// Statistic derived from one source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Arithmetic mean of present values.
    Mean,
    /// Number of missing values.
    MissingCount,
    /// Number of rows, present or not.
    TotalCount,
    /// Missing count over total count, rounded.
    MissingFraction,
}

impl MeasureKind {
    /// All kinds in catalog order.
    pub const ALL: [MeasureKind; 6] = [
        MeasureKind::Min,
        MeasureKind::Max,
        MeasureKind::Mean,
        MeasureKind::MissingCount,
        MeasureKind::TotalCount,
        MeasureKind::MissingFraction,
    ];

    /// Name suffix appended to the source column.
    pub fn suffix(&self) -> &'static str {
        match self {
            MeasureKind::Min => "min_prof",
            MeasureKind::Max => "max_prof",
            MeasureKind::Mean => "mean_prof",
            MeasureKind::MissingCount => "missing_count_prof",
            MeasureKind::TotalCount => "total_count_prof_prof",
            MeasureKind::MissingFraction => "missing_percentage_prof",
        }
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasureKind::Min => "min",
            MeasureKind::Max => "max",
            MeasureKind::Mean => "mean",
            MeasureKind::MissingCount => "missing_count",
            MeasureKind::TotalCount => "total_count",
            MeasureKind::MissingFraction => "missing_fraction",
        };
        f.write_str(name)
    }
}

/// A named measure over one source column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureSpec {
    source_column: String,
    kind: MeasureKind,
    name: String,
}

impl MeasureSpec {
    /// Creates the measure and derives its name.
    pub fn new(source_column: impl Into<String>, kind: MeasureKind) -> Self {
        let source_column = source_column.into();
        let name = format!("{source_column}_{}", kind.suffix());
        Self {
            source_column,
            kind,
            name,
        }
    }

    /// Measure name as it appears in snapshots.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column the measure is computed over.
    pub fn source_column(&self) -> &str {
        &self.source_column
    }

    /// Statistic kind.
    pub fn kind(&self) -> MeasureKind {
        self.kind
    }

    /// SQL aggregate computing this measure over a table.
    ///
    /// `precision` applies to the missing fraction only. Values are cast to
    /// `DOUBLE` so string columns holding numbers aggregate numerically.
    pub fn sql_expr(&self, precision: u32) -> String {
        let column = quote_ident(&self.source_column);
        match self.kind {
            MeasureKind::Min => format!("MIN(CAST({column} AS DOUBLE))"),
            MeasureKind::Max => format!("MAX(CAST({column} AS DOUBLE))"),
            MeasureKind::Mean => format!("AVG(CAST({column} AS DOUBLE))"),
            MeasureKind::MissingCount => format!("(COUNT(*) - COUNT({column}))"),
            MeasureKind::TotalCount => "COUNT(*)".to_string(),
            MeasureKind::MissingFraction => format!(
                "CASE WHEN COUNT(*) = 0 THEN 0.0 \
                 ELSE ROUND(CAST(COUNT(*) - COUNT({column}) AS DOUBLE) / CAST(COUNT(*) AS DOUBLE), {precision}) END"
            ),
        }
    }
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The measures tracked for one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureCatalog {
    measures: Vec<MeasureSpec>,
    numeric_columns: Vec<String>,
    measures_per_column: usize,
    missing_fraction_precision: u32,
}

impl MeasureCatalog {
    /// Measures in catalog order: column by column, kinds in
    /// [`MeasureKind::ALL`] order.
    pub fn measures(&self) -> &[MeasureSpec] {
        &self.measures
    }

    /// Columns found eligible for profiling, in schema order.
    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    /// Total measures divided by eligible columns, 0 with no eligible column.
    pub fn measures_per_column(&self) -> usize {
        self.measures_per_column
    }

    /// Rounding precision of missing-fraction measures.
    pub fn missing_fraction_precision(&self) -> u32 {
        self.missing_fraction_precision
    }

    /// Looks up a measure by name.
    pub fn get(&self, name: &str) -> Option<&MeasureSpec> {
        self.measures.iter().find(|m| m.name() == name)
    }

    /// Measure names in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.measures.iter().map(|m| m.name())
    }

    /// Measures derived from one column.
    pub fn for_column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a MeasureSpec> + 'a {
        self.measures
            .iter()
            .filter(move |m| m.source_column() == column)
    }

    /// Number of measures.
    pub fn len(&self) -> usize {
        self.measures.len()
    }

    /// Returns true if no column was eligible.
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}

/// Shape of the source stream a catalog is built for.
#[derive(Debug, Clone)]
pub struct StreamSchema {
    schema: SchemaRef,
    time_column: String,
    instance_column: String,
    sample: Option<RecordBatch>,
}

impl StreamSchema {
    /// Describes a stream by its Arrow schema and designated columns.
    pub fn new(
        schema: SchemaRef,
        time_column: impl Into<String>,
        instance_column: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            time_column: time_column.into(),
            instance_column: instance_column.into(),
            sample: None,
        }
    }

    /// Describes a stream by a sample batch; eligibility is then probed on
    /// the sample's values rather than on declared types.
    pub fn from_sample(
        sample: RecordBatch,
        time_column: impl Into<String>,
        instance_column: impl Into<String>,
    ) -> Self {
        Self::new(sample.schema(), time_column, instance_column).with_sample(sample)
    }

    /// Attaches sampled rows used for castability probing.
    pub fn with_sample(mut self, sample: RecordBatch) -> Self {
        self.sample = Some(sample);
        self
    }

    /// The Arrow schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Name of the event-time column.
    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    /// Name of the instance-identifier column.
    pub fn instance_column(&self) -> &str {
        &self.instance_column
    }

    /// Sampled rows, if attached.
    pub fn sample(&self) -> Option<&RecordBatch> {
        self.sample.as_ref()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    /// Returns true if both describe the same columns and designations.
    ///
    /// Samples are not compared: a new sample of the same schema does not
    /// invalidate a catalog.
    pub fn same_layout(&self, other: &StreamSchema) -> bool {
        self.schema == other.schema
            && self.time_column == other.time_column
            && self.instance_column == other.instance_column
    }
}

/// Decides whether a column's values can be read as floating point.
pub trait CastabilityProbe {
    /// Returns true if every value of `column` can be read as `f64`.
    fn is_numeric(&self, column: &str) -> bool;
}

/// Probes by the column's declared Arrow type.
#[derive(Debug, Clone, Copy)]
pub struct DeclaredTypeProbe<'a> {
    schema: &'a Schema,
}

impl<'a> DeclaredTypeProbe<'a> {
    /// Creates a probe over a schema.
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }
}

impl CastabilityProbe for DeclaredTypeProbe<'_> {
    fn is_numeric(&self, column: &str) -> bool {
        self.schema
            .field_with_name(column)
            .map(|field| field.data_type().is_numeric())
            .unwrap_or(false)
    }
}

/// Probes by attempting a strict cast of sampled values to `Float64`.
#[derive(Debug, Clone, Copy)]
pub struct SampleCastProbe<'a> {
    sample: &'a RecordBatch,
}

impl<'a> SampleCastProbe<'a> {
    /// Creates a probe over sampled rows.
    pub fn new(sample: &'a RecordBatch) -> Self {
        Self { sample }
    }
}

impl CastabilityProbe for SampleCastProbe<'_> {
    fn is_numeric(&self, column: &str) -> bool {
        let Some(values) = self.sample.column_by_name(column) else {
            return false;
        };
        let options = CastOptions {
            safe: false,
            ..Default::default()
        };
        match cast_with_options(values, &DataType::Float64, &options) {
            Ok(_) => true,
            Err(e) => {
                debug!(column, error = %e, "Sampled values are not castable to Float64");
                false
            }
        }
    }
}

/// Builds the [`MeasureCatalog`] for a stream schema.
///
/// The time column, the instance column and every reserved column are never
/// profiled. Columns failing the castability probe are skipped silently.
#[derive(Debug, Clone)]
pub struct MeasureCatalogBuilder {
    reserved_columns: Vec<String>,
    missing_fraction_precision: u32,
}

impl Default for MeasureCatalogBuilder {
    fn default() -> Self {
        Self {
            reserved_columns: vec![VALIDATION_METADATA_COLUMN.to_string()],
            missing_fraction_precision: 3,
        }
    }
}

impl MeasureCatalogBuilder {
    /// Creates a builder that reserves the validation metadata column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from the profiler configuration.
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self {
            reserved_columns: config.reserved_columns.clone(),
            missing_fraction_precision: config.missing_fraction_precision,
        }
    }

    /// Adds a reserved column.
    pub fn reserved_column(mut self, column: impl Into<String>) -> Self {
        self.reserved_columns.push(column.into());
        self
    }

    /// Sets the missing-fraction rounding precision.
    pub fn missing_fraction_precision(mut self, digits: u32) -> Self {
        self.missing_fraction_precision = digits;
        self
    }

    /// Builds the catalog, probing the sample when one is attached and the
    /// declared types otherwise.
    #[instrument(skip_all, fields(columns = schema.schema().fields().len()))]
    pub fn build(&self, schema: &StreamSchema) -> MeasureCatalog {
        let columns = schema.column_names();
        match schema.sample() {
            Some(sample) => self.build_with_probe(
                columns,
                schema.time_column(),
                schema.instance_column(),
                &SampleCastProbe::new(sample),
            ),
            None => self.build_with_probe(
                columns,
                schema.time_column(),
                schema.instance_column(),
                &DeclaredTypeProbe::new(schema.schema()),
            ),
        }
    }

    /// Builds the catalog over explicit column names with a custom probe.
    pub fn build_with_probe<'c>(
        &self,
        columns: impl IntoIterator<Item = &'c str>,
        time_column: &str,
        instance_column: &str,
        probe: &dyn CastabilityProbe,
    ) -> MeasureCatalog {
        let numeric_columns: Vec<String> = columns
            .into_iter()
            .filter(|column| {
                *column != time_column
                    && *column != instance_column
                    && !self.reserved_columns.iter().any(|r| r == column)
            })
            .filter(|column| {
                let numeric = probe.is_numeric(column);
                if !numeric {
                    debug!(column, "Excluding non-numeric column from profiling");
                }
                numeric
            })
            .map(str::to_string)
            .collect();

        let measures: Vec<MeasureSpec> = numeric_columns
            .iter()
            .flat_map(|column| {
                MeasureKind::ALL
                    .iter()
                    .map(move |kind| MeasureSpec::new(column.as_str(), *kind))
            })
            .collect();

        let measures_per_column = if numeric_columns.is_empty() {
            0
        } else {
            measures.len() / numeric_columns.len()
        };

        info!(
            numeric_columns = numeric_columns.len(),
            measures = measures.len(),
            measures_per_column,
            "Built measure catalog"
        );

        MeasureCatalog {
            measures,
            numeric_columns,
            measures_per_column,
            missing_fraction_precision: self.missing_fraction_precision,
        }
    }
}

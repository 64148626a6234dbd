// # JSON Histogram
//
// Two-level statistics over a JSON-typed column. The outer level is a
// flat array of key-path buckets, one per canonical structural path; the
// inner level is an optional per-value sub-histogram inside each bucket.
// Histograms arrive prebuilt from the catalog as JSON, are immutable once
// deserialized, and answer selectivity queries with pure `&self` reads.

pub mod bucket;
pub mod codec;
pub mod path;
pub mod primitive;
pub mod selectivity;
pub mod subhistogram;

pub use bucket::{KeyPathBucket, LookupResult};
pub use path::{encode_key_path, PathEncoder, TypeTag};
pub use primitive::{BucketString, Primitive, ValueType};
pub use selectivity::{ExpressionNode, JsonFunction, Operator};
pub use subhistogram::{EquiHeightBucket, InnerHistogram, SingletonBucket, SubHistogram};

use crate::collation::{CollationId, UTF8MB4_0900_AI_CI};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column type the histogram was built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Json,
    String,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Json => "json",
            DataType::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(DataType::Json),
            "string" => Some(DataType::String),
            _ => None,
        }
    }
}

/// JSON-aware column histogram.
///
/// Owns every bucket, string, and sub-histogram it contains; `Clone` is a
/// deep copy. The identity fields name the column the statistics belong
/// to and are not part of the serialized form.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonHistogram {
    /// Schema the column belongs to
    pub database: String,
    /// Table the column belongs to
    pub table: String,
    /// Column name
    pub column: String,
    /// Column type the histogram describes
    pub data_type: DataType,
    /// Column-wide fraction of SQL NULL rows
    pub null_fraction: f64,
    /// When the statistics were gathered
    pub last_updated: DateTime<Utc>,
    /// Bucket budget requested when the histogram was built
    pub buckets_specified: u32,
    /// Collation for string comparisons
    pub collation_id: CollationId,
    /// Fraction of rows sampled at build time
    pub sampling_rate: f64,
    /// Smallest bucket frequency seen at deserialization; scales the
    /// fallback estimate for unknown paths. 1.0 when no buckets exist.
    pub min_frequency: f64,
    /// Per-path statistics; order preserved for round-trips
    pub buckets: Vec<KeyPathBucket>,
}

impl JsonHistogram {
    /// Create an empty histogram for a column. Deserialization fills in
    /// the statistics; an empty histogram answers every query with the
    /// fallback estimate.
    pub fn create(
        database: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            column: column.into(),
            data_type: DataType::Json,
            null_fraction: 0.0,
            last_updated: Utc::now(),
            buckets_specified: 0,
            collation_id: UTF8MB4_0900_AI_CI,
            sampling_rate: 1.0,
            min_frequency: 1.0,
            buckets: Vec::new(),
        }
    }

    /// Attach identity fields after deserialization.
    pub fn with_identity(
        mut self,
        database: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.database = database.into();
        self.table = table.into();
        self.column = column.into();
        self
    }

    /// Find the bucket for a canonical key path. Linear scan: bucket
    /// counts stay in the low thousands and lookups happen once per
    /// predicate, not per row.
    pub fn find(&self, key_path: &[u8]) -> Option<&KeyPathBucket> {
        self.buckets.iter().find(|b| b.key_path == key_path)
    }

    /// Typed lookup on a canonical key path. `None` when no bucket
    /// exists for the path.
    pub fn lookup_typed(
        &self,
        key_path: &[u8],
        value: &Primitive,
    ) -> crate::Result<Option<LookupResult>> {
        match self.find(key_path) {
            Some(bucket) => Ok(Some(bucket.lookup(value)?)),
            None => Ok(None),
        }
    }

    /// Untyped lookup for predicates whose comparand type is unknown.
    pub fn lookup_untyped(&self, key_path: &[u8]) -> Option<LookupResult> {
        self.find(key_path).map(|b| b.heuristic_lookup())
    }

    /// Number of key-path buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// For this histogram type, each bucket describes one distinct key
    /// path, so the distinct-value count is the bucket count.
    pub fn num_distinct_values(&self) -> usize {
        self.num_buckets()
    }
}

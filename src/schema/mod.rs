//! Best-effort schema and statistics inference
//!
//! Derives field presence, observed types, representative examples and
//! numeric summaries from the head of a collection. Sampling reads the
//! first [`SAMPLE_SIZE`] documents in the store's natural order - a
//! deliberate cost/accuracy tradeoff, not a random sample - so output
//! depends on sample order. Nothing here is cached; every call
//! recomputes from the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::store::{CollectionRecord, DocumentStore};

pub const SAMPLE_SIZE: usize = 100;

/// A field is "required" when present in strictly more than this share
/// of the sample. Fixed policy constant.
pub const REQUIRED_THRESHOLD: f64 = 0.8;

pub const EXAMPLE_LIMIT: usize = 3;

/// Summary over the numeric values observed for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    /// Arithmetic mean rounded to 2 decimal places
    pub mean: f64,
    /// Value at index n/2 of the ascending-sorted sample
    /// (upper-middle element for even n, not interpolated)
    pub median: f64,
}

/// Everything inferred about one field name
#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    /// Distinct type tags in order of first appearance
    pub types: Vec<&'static str>,

    /// Present in more than 80% of sampled documents
    pub required: bool,

    /// Up to 3 non-null observed values, in sample order
    pub examples: Vec<Value>,

    /// Only present when at least one observed value was numeric
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,

    /// Documents containing this field
    pub present: usize,

    /// `present / sampled * 100`, formatted as "NN.NN%"
    pub coverage: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRange {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Inferred schema for a collection, recomputed per request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub collection: String,

    /// Number of sampled documents (not the full collection size)
    pub record_count: usize,

    pub schema: BTreeMap<String, FieldReport>,

    /// The first sampled document, as a representative payload
    pub sample_data: Option<Value>,

    pub fields: Vec<String>,

    /// First/last creation timestamps over the whole collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<CreatedRange>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Dynamic type tag of a JSON value; sequences are tagged `array`
/// rather than the generic object tag
fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Default)]
struct FieldAcc {
    types: Vec<&'static str>,
    present: usize,
    examples: Vec<Value>,
    numeric: Vec<f64>,
}

/// Infer a schema from the head of a collection.
///
/// An empty collection yields an explicit "no records" report with an
/// empty schema, not an error.
pub fn infer<S>(store: &S, collection: &CollectionRecord) -> Result<SchemaReport>
where
    S: DocumentStore + ?Sized,
{
    let sampled = store.sample(collection.id, SAMPLE_SIZE)?;

    if sampled.is_empty() {
        return Ok(SchemaReport {
            collection: collection.name.clone(),
            record_count: 0,
            schema: BTreeMap::new(),
            sample_data: None,
            fields: Vec::new(),
            created_at: None,
            message: Some("No records found in collection".to_string()),
        });
    }

    let total = sampled.len();
    let mut accs: BTreeMap<String, FieldAcc> = BTreeMap::new();

    for record in &sampled {
        for (key, value) in &record.data {
            let acc = accs.entry(key.clone()).or_default();
            acc.present += 1;

            let tag = type_tag(value);
            if !acc.types.contains(&tag) {
                acc.types.push(tag);
            }

            if acc.examples.len() < EXAMPLE_LIMIT && !value.is_null() {
                acc.examples.push(value.clone());
            }

            if let Value::Number(n) = value {
                if let Some(f) = n.as_f64() {
                    acc.numeric.push(f);
                }
            }
        }
    }

    let mut schema = BTreeMap::new();
    for (field, acc) in accs {
        let numeric = summarize_numeric(acc.numeric);
        let coverage = format!("{:.2}%", acc.present as f64 / total as f64 * 100.0);
        schema.insert(
            field,
            FieldReport {
                types: acc.types,
                required: acc.present as f64 > total as f64 * REQUIRED_THRESHOLD,
                examples: acc.examples,
                numeric,
                present: acc.present,
                coverage,
            },
        );
    }

    let fields = schema.keys().cloned().collect();
    let created_at = store
        .created_bounds(collection.id)?
        .map(|(first, last)| CreatedRange { first, last });

    Ok(SchemaReport {
        collection: collection.name.clone(),
        record_count: total,
        schema,
        sample_data: Some(Value::Object(sampled[0].data.clone())),
        fields,
        created_at,
        message: None,
    })
}

fn summarize_numeric(mut values: Vec<f64>) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let sum: f64 = values.iter().sum();
    Some(NumericSummary {
        min: values[0],
        max: values[n - 1],
        mean: round2(sum / n as f64),
        median: values[n / 2],
    })
}

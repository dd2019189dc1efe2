use crate::errors::EnrichError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// An address point submitted for enrichment. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPoint {
    /// Caller-chosen identifier, carried through to the result row.
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl InputPoint {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }
}

/// Geocoder response for a CEP lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Set by the service when the CEP could not be resolved.
    pub error: Option<String>,
}

/// POI summary response: nested category counts plus a grand total.
#[derive(Debug, Clone, Deserialize)]
pub struct PoiSummaryResponse {
    pub summary: Value,
    pub total: f64,
}

/// Intraurban segmentation probabilities per cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationResponse {
    pub probs: Value,
}

/// Dominant intraurban cluster for a point.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterResponse {
    pub max: Option<String>,
}

/// Enrichment outputs for a single input point. Write-once: built by the
/// response parser and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecord {
    pub point: InputPoint,
    /// POI counts inside the generated geometry, `pois__`-prefixed keys.
    pub pois: BTreeMap<String, f64>,
    /// Sociodemographic values, segmentation probabilities, and probable
    /// household income, proportionally apportioned by the remote service.
    pub demographics: BTreeMap<String, f64>,
    /// Consumption potential per requested category, with per-category totals.
    pub consumption: BTreeMap<String, f64>,
    /// Dominant intraurban cluster, when the service reports one.
    pub segmentation_cluster: Option<String>,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedRecord {
    /// All enrichment columns of this record, merged into one map.
    pub fn values(&self) -> BTreeMap<String, f64> {
        let mut merged = self.pois.clone();
        merged.extend(self.demographics.clone());
        merged.extend(self.consumption.clone());
        merged
    }

    /// Serializes the record as one flat JSON row.
    pub fn to_row(&self) -> Value {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), json!(self.point.id));
        row.insert("latitude".to_string(), json!(self.point.latitude));
        row.insert("longitude".to_string(), json!(self.point.longitude));
        for (key, value) in self.values() {
            row.insert(key, json!(value));
        }
        if let Some(ref cluster) = self.segmentation_cluster {
            row.insert("segmentation__cluster".to_string(), json!(cluster));
        }
        row.insert("enriched_at".to_string(), json!(self.enriched_at.to_rfc3339()));
        Value::Object(row)
    }
}

/// A point whose enrichment failed. Failures are collected and reported
/// alongside successful rows, never dropped silently.
#[derive(Debug, Clone, Serialize)]
pub struct PointFailure {
    /// Position of the point in the input sequence.
    pub index: usize,
    pub id: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: EnrichError,
}

fn serialize_error<S: serde::Serializer>(
    error: &EnrichError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Ordered collection of enriched records, one row per successfully
/// enriched input point, preserving input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    pub rows: Vec<EnrichedRecord>,
    pub failures: Vec<PointFailure>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when every input point produced a row.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Union of enrichment column names across all rows, sorted. Rows from
    /// sparse areas may miss columns that denser areas have.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = BTreeSet::new();
        for row in &self.rows {
            columns.extend(row.values().into_keys());
        }
        columns.into_iter().collect()
    }

    /// Serializes the whole table: rows in input order plus failure records.
    /// Rows are rectangular: enrichment columns another row has but this one
    /// lacks are filled with zero.
    pub fn to_json(&self) -> Value {
        let columns = self.columns();
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|record| {
                let mut row = record.to_row();
                if let Value::Object(ref mut map) = row {
                    for column in &columns {
                        map.entry(column.clone()).or_insert(json!(0.0));
                    }
                }
                row
            })
            .collect();

        json!({
            "rows": rows,
            "failures": self.failures,
            "total": self.rows.len() + self.failures.len(),
            "enriched": self.rows.len(),
            "failed": self.failures.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str) -> EnrichedRecord {
        let mut pois = BTreeMap::new();
        pois.insert("pois__food__restaurants".to_string(), 12.0);
        pois.insert("pois__total".to_string(), 40.0);
        let mut demographics = BTreeMap::new();
        demographics.insert("sociodemography__population".to_string(), 5300.0);
        EnrichedRecord {
            point: InputPoint::new(id, -23.561, -46.656),
            pois,
            demographics,
            consumption: BTreeMap::new(),
            segmentation_cluster: Some("urban_dense".to_string()),
            enriched_at: Utc::now(),
        }
    }

    #[test]
    fn record_values_merge_all_maps() {
        let record = sample_record("1");
        let values = record.values();
        assert_eq!(values.get("pois__total"), Some(&40.0));
        assert_eq!(values.get("sociodemography__population"), Some(&5300.0));
    }

    #[test]
    fn row_carries_point_attributes() {
        let row = sample_record("7").to_row();
        assert_eq!(row["id"], "7");
        assert_eq!(row["latitude"], -23.561);
        assert_eq!(row["segmentation__cluster"], "urban_dense");
        assert_eq!(row["pois__food__restaurants"], 12.0);
    }

    #[test]
    fn table_columns_are_union_of_rows() {
        let mut table = ResultTable::default();
        table.rows.push(sample_record("1"));
        let mut other = sample_record("2");
        other
            .consumption
            .insert("consumption__mobile__total".to_string(), 910.5);
        table.rows.push(other);

        let columns = table.columns();
        assert!(columns.contains(&"pois__total".to_string()));
        assert!(columns.contains(&"consumption__mobile__total".to_string()));
    }

    #[test]
    fn table_json_fills_missing_columns_with_zero() {
        let mut table = ResultTable::default();
        table.rows.push(sample_record("1"));
        let mut other = sample_record("2");
        other
            .consumption
            .insert("consumption__mobile__total".to_string(), 910.5);
        table.rows.push(other);

        let value = table.to_json();
        // The first row has no consumption data; the column is zero-filled.
        assert_eq!(value["rows"][0]["consumption__mobile__total"], 0.0);
        assert_eq!(value["rows"][1]["consumption__mobile__total"], 910.5);
    }

    #[test]
    fn table_json_reports_counts() {
        let mut table = ResultTable::default();
        table.rows.push(sample_record("1"));
        table.failures.push(PointFailure {
            index: 1,
            id: "2".to_string(),
            error: EnrichError::Transport("timeout".to_string()),
        });

        let value = table.to_json();
        assert_eq!(value["total"], 2);
        assert_eq!(value["enriched"], 1);
        assert_eq!(value["failed"], 1);
        assert!(!table.is_complete());
    }
}

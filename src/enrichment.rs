/// Shared enrichment logic for the OnData client
///
/// This module provides the reusable pieces of the enrichment workflow:
/// 1. CEP (Brazilian zip code) validation and normalization
/// 2. Flattening of nested response payloads into tabular columns
/// 3. Per-point assembly of an `EnrichedRecord` from the endpoint responses
use crate::config::EnrichmentConfig;
use crate::errors::EnrichError;
use crate::models::{EnrichedRecord, InputPoint};
use crate::services::OnDataService;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Validate a CEP (Brazilian zip code)
///
/// Accepts the bare 8-digit form (`01310100`) and the dashed form
/// (`01310-100`).
pub fn is_valid_cep(raw: &str) -> bool {
    let cep_regex = Regex::new(r"^\d{5}-?\d{3}$").unwrap();
    cep_regex.is_match(raw.trim())
}

/// Normalize a CEP to its bare 8-digit form. Returns `None` when the input
/// is not a CEP at all.
pub fn normalize_cep(raw: &str) -> Option<String> {
    if !is_valid_cep(raw) {
        tracing::debug!("Rejected malformed CEP: {:?}", raw);
        return None;
    }
    Some(raw.trim().replace('-', ""))
}

/// Flattens a nested JSON payload into `__`-joined keys, keeping only
/// numeric leaves. Non-numeric leaves (labels, nulls, lists) are dropped:
/// the result table is numeric apart from the point attributes.
pub fn flatten_numeric(value: &Value, prefix: &str, out: &mut BTreeMap<String, f64>) {
    match value {
        Value::Number(number) => {
            if let Some(v) = number.as_f64() {
                out.insert(prefix.to_string(), v);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                let joined = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}__{}", prefix, key)
                };
                flatten_numeric(nested, &joined, out);
            }
        }
        _ => {}
    }
}

/// Flattens a consumption-potential payload (`category -> nested values`)
/// and totalizes each category, producing `consumption__`-prefixed columns.
pub fn reduce_consumption(data: &Value) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = data {
        for (category, nested) in map {
            let mut flat = BTreeMap::new();
            flatten_numeric(nested, category, &mut flat);
            let total: f64 = flat.values().sum();
            flat.insert(format!("{}__total", category), total);
            for (key, value) in flat {
                out.insert(format!("consumption__{}", key), value);
            }
        }
    }
    out
}

/// Enrich a single point with every OnData output
///
/// Calls the segmentation, income, POI, consumption-potential and
/// sociodemography endpoints and assembles the responses into one record.
/// Any endpoint failure fails the point as a whole; partial records are
/// never produced.
pub async fn enrich_point(
    service: &OnDataService,
    point: &InputPoint,
    options: &EnrichmentConfig,
) -> Result<EnrichedRecord, EnrichError> {
    let (lat, lng) = (point.latitude, point.longitude);
    tracing::debug!("Enriching point {} at ({}, {})", point.id, lat, lng);

    let segmentation = service.segmentation(lat, lng).await?;
    let cluster = service.segmentation_cluster(lat, lng).await?;
    let income = service.probable_income(lat, lng).await?;
    let pois = service.poi_summary(lat, lng, options).await?;
    let consumption = service.consumption_potential(lat, lng, options).await?;

    let mut demographics = service.sociodemography(lat, lng, options).await?;
    demographics.extend(segmentation);
    if let Some(income) = income {
        demographics.insert("income__probable_household".to_string(), income);
    }

    Ok(EnrichedRecord {
        point: point.clone(),
        pois,
        demographics,
        consumption,
        segmentation_cluster: Some(cluster),
        enriched_at: Utc::now(),
    })
}

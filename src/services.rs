use crate::config::{Config, EnrichmentConfig, GeometryKind, TravelMode};
use crate::enrichment::{flatten_numeric, reduce_consumption};
use crate::errors::EnrichError;
use crate::models::{ClusterResponse, GeocoderResponse, PoiSummaryResponse, SegmentationResponse};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use url::Url;

/// Client for the OnData geo-enrichment endpoints.
///
/// One instance per credential; `reqwest::Client` holds the connection pool
/// and is cheap to clone along with the service.
#[derive(Clone)]
pub struct OnDataService {
    client: Client,
    base_url: String,
    token: String,
    max_retries: u32,
}

impl OnDataService {
    pub fn new(config: &Config) -> Result<Self, EnrichError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                EnrichError::Config(format!("Failed to create OnData HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_retries: config.max_retries,
        })
    }

    fn auth_header(&self) -> String {
        // Callers sometimes supply a token already carrying the scheme.
        if self.token.starts_with("Bearer ") {
            self.token.clone()
        } else {
            format!("Bearer {}", self.token)
        }
    }

    fn endpoint_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, EnrichError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| EnrichError::Config(format!("Failed to build URL for {}: {}", path, e)))
    }

    /// Performs a GET against one endpoint with retry on transient
    /// transport failures, mapping 401/403 to `Auth` and other non-success
    /// statuses to `Transport`.
    async fn get_json(&self, url: Url, what: &str) -> Result<Value, EnrichError> {
        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            let result = self
                .client
                .get(url.clone())
                .header("Authorization", self.auth_header())
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} request failed ({}), retry {}/{}",
                        what,
                        e,
                        attempt,
                        self.max_retries
                    );
                    continue;
                }
                Err(e) => {
                    return Err(EnrichError::Transport(format!(
                        "{} request failed: {}",
                        what, e
                    )));
                }
            };

            let elapsed_ms = started.elapsed().as_millis();
            if elapsed_ms > 1000 {
                tracing::warn!("{} responded in {}ms", what, elapsed_ms);
            } else {
                tracing::debug!("{} responded in {}ms", what, elapsed_ms);
            }

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!("{} rejected the credential: {}", what, status);
                return Err(EnrichError::Auth(format!(
                    "{} returned status {}: {}",
                    what, status, error_text
                )));
            }
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(EnrichError::Transport(format!(
                    "{} returned status {}: {}",
                    what, status, error_text
                )));
            }

            return response.json().await.map_err(|e| {
                EnrichError::ResponseFormat(format!("Failed to parse {} response: {}", what, e))
            });
        }
    }

    /// Resolves a CEP to a coordinate pair.
    pub async fn geocode(&self, cep: &str) -> Result<(f64, f64), EnrichError> {
        let url = self.endpoint_url("/geocoder/v1/position", &[("zipCode", cep.to_string())])?;
        let value = self.get_json(url, "geocoder").await?;
        let parsed: GeocoderResponse = serde_json::from_value(value).map_err(|e| {
            EnrichError::ResponseFormat(format!("Unexpected geocoder payload: {}", e))
        })?;

        if let Some(error) = parsed.error {
            return Err(EnrichError::ResponseFormat(format!(
                "Geocoder could not resolve CEP {}: {}",
                cep, error
            )));
        }
        match (parsed.latitude, parsed.longitude) {
            (Some(lat), Some(lng)) => Ok((lat, lng)),
            _ => Err(EnrichError::ResponseFormat(format!(
                "Geocoder response for CEP {} missing coordinates",
                cep
            ))),
        }
    }

    /// Probable household income at the point. The endpoint answers with a
    /// bare JSON number, or null where no estimate exists.
    pub async fn probable_income(&self, lat: f64, lng: f64) -> Result<Option<f64>, EnrichError> {
        let url = self.endpoint_url(
            "/income/v1/consumer",
            &[("latitude", lat.to_string()), ("longitude", lng.to_string())],
        )?;
        let value = self.get_json(url, "income").await?;
        match value {
            Value::Null => Ok(None),
            Value::Number(number) => Ok(number.as_f64()),
            other => Err(EnrichError::ResponseFormat(format!(
                "Income endpoint returned a non-numeric payload: {}",
                other
            ))),
        }
    }

    /// Intraurban segmentation probabilities, `segmentation__`-prefixed.
    pub async fn segmentation(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<BTreeMap<String, f64>, EnrichError> {
        let url = self.endpoint_url(
            "/seg-intra-service/public/enrichPoint",
            &[("latitude", lat.to_string()), ("longitude", lng.to_string())],
        )?;
        let value = self.get_json(url, "segmentation").await?;
        let parsed: SegmentationResponse = serde_json::from_value(value).map_err(|e| {
            EnrichError::ResponseFormat(format!("Unexpected segmentation payload: {}", e))
        })?;

        let mut probs = BTreeMap::new();
        flatten_numeric(&parsed.probs, "segmentation", &mut probs);
        Ok(probs)
    }

    /// Dominant intraurban cluster. Points outside any cluster come back
    /// null and are reported as rural.
    pub async fn segmentation_cluster(&self, lat: f64, lng: f64) -> Result<String, EnrichError> {
        let url = self.endpoint_url(
            "/seg-intra-service/public/enrichPointMax",
            &[("latitude", lat.to_string()), ("longitude", lng.to_string())],
        )?;
        let value = self.get_json(url, "segmentation cluster").await?;
        let parsed: ClusterResponse = serde_json::from_value(value).map_err(|e| {
            EnrichError::ResponseFormat(format!("Unexpected cluster payload: {}", e))
        })?;

        Ok(parsed
            .max
            .filter(|cluster| !cluster.is_empty())
            .unwrap_or_else(|| "rural".to_string()))
    }

    /// POI counts inside the generated geometry, `pois__`-prefixed, plus a
    /// `pois__total` column.
    ///
    /// Locomotion and direction only apply to road-network geometries:
    /// buffer requests never carry them, and walking requests have no
    /// direction.
    pub async fn poi_summary(
        &self,
        lat: f64,
        lng: f64,
        options: &EnrichmentConfig,
    ) -> Result<BTreeMap<String, f64>, EnrichError> {
        let mut params = vec![
            ("value", options.magnitude.to_string()),
            ("latitude", lat.to_string()),
            ("longitude", lng.to_string()),
        ];
        if options.geometry != GeometryKind::Buffer {
            params.push(("locomotion", options.travel_mode.as_param().to_string()));
            if options.travel_mode != TravelMode::Walk {
                params.push(("direction", options.direction.as_param().to_string()));
            }
        }

        let url = self.endpoint_url(
            &format!("/places-enricher/v1/summary/{}", options.geometry.as_param()),
            &params,
        )?;
        let value = self.get_json(url, "places summary").await?;
        let parsed: PoiSummaryResponse = serde_json::from_value(value).map_err(|e| {
            EnrichError::ResponseFormat(format!("Unexpected places summary payload: {}", e))
        })?;

        let mut pois = BTreeMap::new();
        flatten_numeric(&parsed.summary, "pois", &mut pois);
        pois.insert("pois__total".to_string(), parsed.total);
        Ok(pois)
    }

    /// Estimated consumption potential of the configured categories inside
    /// the surroundings radius. Skipped entirely when no categories are
    /// configured.
    pub async fn consumption_potential(
        &self,
        lat: f64,
        lng: f64,
        options: &EnrichmentConfig,
    ) -> Result<BTreeMap<String, f64>, EnrichError> {
        if options.consumption_categories.is_empty() {
            return Ok(BTreeMap::new());
        }

        let url = self.endpoint_url(
            "/xray/v1/areas/surroundings/estimatedConsumptionPotential/RADIUS",
            &[
                ("value", options.surroundings_radius.to_string()),
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                ("categories", options.consumption_categories.join(",")),
            ],
        )?;
        let value = self.get_json(url, "consumption potential").await?;
        Ok(reduce_consumption(&value))
    }

    /// Sociodemography of the surroundings, `sociodemography__`-prefixed.
    pub async fn sociodemography(
        &self,
        lat: f64,
        lng: f64,
        options: &EnrichmentConfig,
    ) -> Result<BTreeMap<String, f64>, EnrichError> {
        let url = self.endpoint_url(
            "/xray/v1/areas/surroundings/sociodemography/RADIUS",
            &[
                ("value", options.surroundings_radius.to_string()),
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
            ],
        )?;
        let value = self.get_json(url, "sociodemography").await?;

        let mut out = BTreeMap::new();
        flatten_numeric(&value, "sociodemography", &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_creation_succeeds_with_defaults() {
        let service = OnDataService::new(&Config::new("token"));
        assert!(service.is_ok());
    }

    #[test]
    fn auth_header_adds_scheme_once() {
        let service = OnDataService::new(&Config::new("abc123")).unwrap();
        assert_eq!(service.auth_header(), "Bearer abc123");

        let service = OnDataService::new(&Config::new("Bearer abc123")).unwrap();
        assert_eq!(service.auth_header(), "Bearer abc123");
    }

    #[test]
    fn endpoint_url_encodes_params() {
        let service = OnDataService::new(&Config::new("token")).unwrap();
        let url = service
            .endpoint_url(
                "/geocoder/v1/position",
                &[("zipCode", "01310100".to_string())],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.ondata.com.br/geocoder/v1/position?zipCode=01310100"
        );
    }
}

use crate::errors::EnrichError;
use serde::{Deserialize, Serialize};

/// Default OnData API host.
pub const DEFAULT_BASE_URL: &str = "https://api.ondata.com.br";

/// Client-level configuration: credential, endpoint, and resource limits.
#[derive(Debug, Clone)]
pub struct Config {
    /// API token, sent as a bearer credential on every request.
    pub token: String,
    /// Base URL of the OnData API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry budget for transient transport failures on a single request.
    pub max_retries: u32,
    /// Maximum number of points enriched concurrently.
    pub concurrency: usize,
    /// TTL of the per-point response cache, in seconds.
    pub cache_ttl_secs: u64,
}

impl Config {
    /// Programmatic construction with defaults: 30s timeout, 5 retries,
    /// 10 concurrent points, 1h cache TTL.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            max_retries: 5,
            concurrency: 10,
            cache_ttl_secs: 3600,
        }
    }

    /// Loads configuration from the environment (and `.env` if present).
    ///
    /// `ONDATA_TOKEN` is required; everything else falls back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            token: std::env::var("ONDATA_TOKEN")
                .map_err(|_| anyhow::anyhow!("ONDATA_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("ONDATA_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            base_url: std::env::var("ONDATA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout_secs: std::env::var("ONDATA_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ONDATA_TIMEOUT_SECS must be a valid number"))?,
            max_retries: std::env::var("ONDATA_MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ONDATA_MAX_RETRIES must be a valid number"))?,
            concurrency: std::env::var("ONDATA_CONCURRENCY")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ONDATA_CONCURRENCY must be a valid number"))?,
            cache_ttl_secs: std::env::var("ONDATA_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ONDATA_CACHE_TTL_SECS must be a valid number"))?,
        };

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            anyhow::bail!("ONDATA_BASE_URL must start with http:// or https://");
        }
        if config.concurrency == 0 {
            anyhow::bail!("ONDATA_CONCURRENCY must be at least 1");
        }

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("OnData base URL: {}", config.base_url);
        tracing::debug!(
            "Timeout: {}s, retries: {}, concurrency: {}",
            config.timeout_secs,
            config.max_retries,
            config.concurrency
        );

        Ok(config)
    }

    /// Validates the fields required before any request is sent.
    pub fn validate(&self) -> Result<(), EnrichError> {
        if self.token.trim().is_empty() {
            return Err(EnrichError::Config("token cannot be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(EnrichError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Kind of geometry the remote service generates around each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Area reachable within a fixed travel time, respecting the road network.
    Isochrone,
    /// Area reachable within a fixed travel distance, respecting the road network.
    Isodistance,
    /// Area defined purely by radius, ignoring the road network.
    Buffer,
}

impl GeometryKind {
    /// Wire value of the geometry kind on the OnData API.
    pub fn as_param(&self) -> &'static str {
        match self {
            GeometryKind::Isochrone => "TIME",
            GeometryKind::Isodistance => "DISTANCE",
            GeometryKind::Buffer => "RADIUS",
        }
    }

    /// Unit of the magnitude for this geometry kind.
    pub fn magnitude_unit(&self) -> &'static str {
        match self {
            GeometryKind::Isochrone => "minutes",
            GeometryKind::Isodistance | GeometryKind::Buffer => "meters",
        }
    }
}

/// Locomotion mode used when generating road-network geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Car,
    Walk,
}

impl TravelMode {
    pub fn as_param(&self) -> &'static str {
        match self {
            TravelMode::Car => "CAR",
            TravelMode::Walk => "WALK",
        }
    }
}

/// Whether travel flows out of the point or towards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Departing,
    Arriving,
}

impl Direction {
    pub fn as_param(&self) -> &'static str {
        match self {
            Direction::Departing => "OUT",
            Direction::Arriving => "IN",
        }
    }
}

/// Per-batch enrichment options, validated at construction.
///
/// Travel mode and direction only influence isochrone and isodistance
/// geometries. For `Buffer` they are accepted and ignored, and never reach
/// the wire request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub geometry: GeometryKind,
    pub travel_mode: TravelMode,
    pub direction: Direction,
    /// Size of the geometry: minutes for isochrone, meters otherwise.
    pub magnitude: f64,
    /// Radius in meters for the consumption-potential and sociodemography
    /// surroundings queries.
    pub surroundings_radius: f64,
    /// Consumption-potential categories to request.
    pub consumption_categories: Vec<String>,
}

impl EnrichmentConfig {
    /// Creates options with defaults mirroring the service's own: walking
    /// isochrone, departing, 100m surroundings radius, no categories.
    pub fn new(geometry: GeometryKind, magnitude: f64) -> Result<Self, EnrichError> {
        let config = Self {
            geometry,
            travel_mode: TravelMode::Walk,
            direction: Direction::Departing,
            magnitude,
            surroundings_radius: 100.0,
            consumption_categories: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_travel_mode(mut self, travel_mode: TravelMode) -> Self {
        self.travel_mode = travel_mode;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_surroundings_radius(mut self, radius: f64) -> Result<Self, EnrichError> {
        self.surroundings_radius = radius;
        self.validate()?;
        Ok(self)
    }

    pub fn with_consumption_categories(mut self, categories: Vec<String>) -> Self {
        self.consumption_categories = categories;
        self
    }

    /// Checks the numeric invariants. Called at construction; `enrich` calls
    /// it again so hand-built structs fail fast too.
    pub fn validate(&self) -> Result<(), EnrichError> {
        if !self.magnitude.is_finite() || self.magnitude <= 0.0 {
            return Err(EnrichError::Config(format!(
                "magnitude must be positive, got {} {}",
                self.magnitude,
                self.geometry.magnitude_unit()
            )));
        }
        if !self.surroundings_radius.is_finite() || self.surroundings_radius <= 0.0 {
            return Err(EnrichError::Config(format!(
                "surroundings radius must be positive, got {}",
                self.surroundings_radius
            )));
        }
        Ok(())
    }

    /// Cache key fragment: two option sets that would produce different
    /// remote geometries must never share a cache entry.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.geometry.as_param(),
            self.travel_mode.as_param(),
            self.direction.as_param(),
            self.magnitude,
            self.surroundings_radius,
            self.consumption_categories.join(",")
        )
    }
}

use crate::config::{Config, EnrichmentConfig};
use crate::enrichment::{self, normalize_cep};
use crate::errors::EnrichError;
use crate::models::{EnrichedRecord, InputPoint, PointFailure, ResultTable};
use crate::services::OnDataService;
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

type OnDataBreaker = failsafe::StateMachine<
    failsafe::failure_policy::ConsecutiveFailures<failsafe::backoff::Exponential>,
    (),
>;

/// After five consecutive failed points the OnData host is assumed down and
/// further calls are rejected locally, backing off 10s to 60s before the
/// next probe.
fn remote_breaker() -> OnDataBreaker {
    let backoff =
        failsafe::backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let policy = failsafe::failure_policy::consecutive_failures(5, backoff);
    failsafe::Config::new().failure_policy(policy).build()
}

/// Client for batch enrichment against the OnData API.
///
/// Holds the HTTP service, a response cache keyed by coordinate and
/// geometry, a circuit breaker guarding the remote host, and a semaphore
/// bounding the number of points in flight. All of it is shared read-only
/// state; records are write-once, so batches never race on mutation.
///
/// ## Failure policy
///
/// An authentication failure aborts the whole batch with an error and no
/// partial table: every point needs the same credential. Transport and
/// response-format failures are per point; the batch continues and the
/// failed point is recorded in [`ResultTable::failures`] rather than being
/// dropped silently.
#[derive(Clone)]
pub struct OnDataClient {
    config: Config,
    service: OnDataService,
    cache: Cache<String, EnrichedRecord>,
    breaker: OnDataBreaker,
    limiter: Arc<Semaphore>,
}

impl OnDataClient {
    pub fn new(config: Config) -> Result<Self, EnrichError> {
        config.validate()?;
        let service = OnDataService::new(&config)?;

        // Repeated enrichment of the same site with the same geometry is
        // idempotent, so responses can be reused within the TTL.
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .max_capacity(100_000)
            .build();

        let limiter = Arc::new(Semaphore::new(config.concurrency));

        Ok(Self {
            service,
            cache,
            breaker: remote_breaker(),
            limiter,
            config,
        })
    }

    /// Enriches a batch of points, returning one row per point in the
    /// original input order regardless of response arrival order.
    pub async fn enrich(
        &self,
        points: &[InputPoint],
        options: &EnrichmentConfig,
    ) -> Result<ResultTable, EnrichError> {
        self.config.validate()?;
        options.validate()?;
        if points.is_empty() {
            return Err(EnrichError::Config("points cannot be empty".to_string()));
        }

        tracing::info!("Enriching batch of {} point(s)", points.len());

        let mut join_set = JoinSet::new();
        for (index, point) in points.iter().cloned().enumerate() {
            let client = self.clone();
            let options = options.clone();
            join_set.spawn(async move {
                let result = client.enrich_one(&point, &options).await;
                (index, point.id, result)
            });
        }

        self.collect(join_set, points.len()).await
    }

    /// Enriches a batch of CEPs: each CEP is geocoded first, then enriched
    /// like a coordinate point. A CEP the geocoder cannot resolve is a
    /// per-point failure, not a batch failure.
    pub async fn enrich_ceps(
        &self,
        ceps: &[String],
        options: &EnrichmentConfig,
    ) -> Result<ResultTable, EnrichError> {
        self.config.validate()?;
        options.validate()?;
        if ceps.is_empty() {
            return Err(EnrichError::Config("ceps cannot be empty".to_string()));
        }

        tracing::info!("Enriching batch of {} CEP(s)", ceps.len());

        let mut join_set = JoinSet::new();
        for (index, cep) in ceps.iter().cloned().enumerate() {
            let client = self.clone();
            let options = options.clone();
            join_set.spawn(async move {
                let result = client.enrich_cep(&cep, &options).await;
                (index, cep, result)
            });
        }

        self.collect(join_set, ceps.len()).await
    }

    async fn enrich_cep(
        &self,
        cep: &str,
        options: &EnrichmentConfig,
    ) -> Result<EnrichedRecord, EnrichError> {
        let normalized = normalize_cep(cep)
            .ok_or_else(|| EnrichError::Config(format!("invalid CEP '{}'", cep)))?;
        let (lat, lng) = self.service.geocode(&normalized).await?;
        let point = InputPoint::new(normalized, lat, lng);
        self.enrich_one(&point, options).await
    }

    /// Enriches one point: cache lookup first, then the remote round trips
    /// behind the semaphore and the circuit breaker.
    async fn enrich_one(
        &self,
        point: &InputPoint,
        options: &EnrichmentConfig,
    ) -> Result<EnrichedRecord, EnrichError> {
        let cache_key = format!(
            "{:.6}:{:.6}:{}",
            point.latitude,
            point.longitude,
            options.cache_key()
        );

        if let Some(mut cached) = self.cache.get(&cache_key).await {
            tracing::debug!("Cache hit for point {}", point.id);
            // Same site, possibly a different caller-side identifier.
            cached.point = point.clone();
            return Ok(cached);
        }

        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EnrichError::Transport("concurrency limiter closed".to_string()))?;

        let result = self
            .breaker
            .call(enrichment::enrich_point(&self.service, point, options))
            .await;
        drop(permit);

        match result {
            Ok(record) => {
                self.cache.insert(cache_key, record.clone()).await;
                Ok(record)
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(EnrichError::Transport(
                "circuit breaker open for the OnData API".to_string(),
            )),
        }
    }

    /// Drains the join set into a table, slotting results by original
    /// index. Auth failures abort the batch here; everything else becomes a
    /// per-point failure record.
    async fn collect(
        &self,
        mut join_set: JoinSet<(usize, String, Result<EnrichedRecord, EnrichError>)>,
        expected: usize,
    ) -> Result<ResultTable, EnrichError> {
        let mut slots: Vec<Option<(String, Result<EnrichedRecord, EnrichError>)>> =
            (0..expected).map(|_| None).collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, id, result)) => slots[index] = Some((id, result)),
                Err(e) => {
                    return Err(EnrichError::Transport(format!(
                        "enrichment task failed: {}",
                        e
                    )));
                }
            }
        }

        let mut table = ResultTable::default();
        for (index, slot) in slots.into_iter().enumerate() {
            let Some((id, result)) = slot else {
                return Err(EnrichError::Transport(format!(
                    "no result produced for point at index {}",
                    index
                )));
            };
            match result {
                Ok(record) => table.rows.push(record),
                Err(e) if e.is_auth() => {
                    tracing::error!("Credential rejected, aborting batch: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Point {} failed: {}", id, e);
                    table.failures.push(PointFailure { index, id, error: e });
                }
            }
        }

        tracing::info!(
            "Batch complete: {} enriched, {} failed",
            table.rows.len(),
            table.failures.len()
        );
        Ok(table)
    }
}

/// Single entry point: enriches `points` with `token` using default client
/// settings. Build an [`OnDataClient`] directly to tune timeouts,
/// concurrency, or the cache.
pub async fn enrich(
    token: &str,
    points: &[InputPoint],
    options: &EnrichmentConfig,
) -> Result<ResultTable, EnrichError> {
    let client = OnDataClient::new(Config::new(token))?;
    client.enrich(points, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OnDataClient::new(Config::new("token"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_rejects_empty_token() {
        let client = OnDataClient::new(Config::new(""));
        assert!(matches!(client, Err(EnrichError::Config(_))));
    }

    #[tokio::test]
    async fn test_breaker_rejects_after_consecutive_point_failures() {
        let breaker = remote_breaker();

        for _ in 0..5 {
            let result = breaker
                .call(async {
                    Err::<(), _>(EnrichError::Transport("connection reset".to_string()))
                })
                .await;
            assert!(matches!(result, Err(failsafe::Error::Inner(_))));
        }

        // Host is considered down now; the call never runs.
        let result = breaker.call(async { Ok::<_, EnrichError>(()) }).await;
        assert!(matches!(result, Err(failsafe::Error::Rejected)));
    }

    #[tokio::test]
    async fn test_breaker_passes_through_healthy_calls() {
        let breaker = remote_breaker();

        let result = breaker.call(async { Ok::<_, EnrichError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected_before_any_request() {
        let client = OnDataClient::new(Config::new("token")).unwrap();
        let options =
            EnrichmentConfig::new(crate::config::GeometryKind::Isochrone, 5.0).unwrap();

        let result = client.enrich(&[], &options).await;
        assert!(matches!(result, Err(EnrichError::Config(_))));

        let result = client.enrich_ceps(&[], &options).await;
        assert!(matches!(result, Err(EnrichError::Config(_))));
    }
}

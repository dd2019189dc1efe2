//! OnData Geo-Enrichment Client Library
//!
//! This library sends address points to the OnData geo-enrichment API,
//! receives back enrichment outputs computed over generated geometries
//! (isochrone, isodistance, buffer), and assembles them into an ordered
//! tabular result: POI summaries, probable household income, intraurban
//! segmentation, consumption potential, and sociodemography.
//!
//! Geometry generation and the proportional-overlap statistics are owned by
//! the remote service; this crate is the request builder, response parser,
//! and batch coordinator around it.
//!
//! # Modules
//!
//! - `client`: Batch enrichment client and the `enrich` entry point.
//! - `config`: Client configuration and enrichment options.
//! - `enrichment`: CEP validation, payload flattening, per-point assembly.
//! - `errors`: Error handling types.
//! - `models`: Input points, enriched records, result table.
//! - `services`: OnData endpoint client.
//!
//! # Example
//!
//! ```no_run
//! use ondata_enrich::{enrich, EnrichmentConfig, GeometryKind, InputPoint, TravelMode};
//!
//! # async fn run() -> Result<(), ondata_enrich::EnrichError> {
//! let points = vec![InputPoint::new("1", -23.561, -46.656)];
//! let options = EnrichmentConfig::new(GeometryKind::Isochrone, 5.0)?
//!     .with_travel_mode(TravelMode::Car);
//!
//! let table = enrich("my-token", &points, &options).await?;
//! for row in &table.rows {
//!     println!("{}", row.to_row());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod models;
pub mod services;

pub use client::{enrich, OnDataClient};
pub use config::{Config, Direction, EnrichmentConfig, GeometryKind, TravelMode};
pub use errors::EnrichError;
pub use models::{EnrichedRecord, InputPoint, PointFailure, ResultTable};

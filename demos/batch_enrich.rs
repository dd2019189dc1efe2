use anyhow::Result;
use ondata_enrich::{Config, EnrichmentConfig, GeometryKind, OnDataClient, TravelMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Batch CEP Enrichment ===\n");

    // ONDATA_TOKEN (and friends) come from the environment or .env
    let config = Config::from_env()?;

    // CEP list: one per line, first CLI argument or ceps.txt
    let path = std::env::args().nth(1).unwrap_or_else(|| "ceps.txt".to_string());
    let ceps: Vec<String> = std::fs::read_to_string(&path)?
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    println!("Loaded {} CEP(s) from {}\n", ceps.len(), path);

    let options = EnrichmentConfig::new(GeometryKind::Isochrone, 5.0)?
        .with_travel_mode(TravelMode::Walk)
        .with_consumption_categories(vec![
            "phone_tv_internet_bundle".to_string(),
            "mobile_phone".to_string(),
            "landline_phone".to_string(),
        ]);

    let client = OnDataClient::new(config)?;
    let table = client.enrich_ceps(&ceps, &options).await?;

    for row in &table.rows {
        println!("✓ {}", row.to_row());
    }
    for failure in &table.failures {
        println!("✗ {} ({}): {}", failure.id, failure.index, failure.error);
    }

    let total = table.rows.len() + table.failures.len();
    println!("\n=== Batch Enrichment Complete ===");
    println!("Total processed: {}", total);
    println!("✓ Success: {}", table.rows.len());
    println!("✗ Failed: {}", table.failures.len());
    println!(
        "Success rate: {:.1}%",
        (table.rows.len() as f64 / total as f64) * 100.0
    );

    Ok(())
}

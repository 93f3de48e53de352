use anyhow::Context;
use config::ChatConfig;
use db::latency::{
    DEFAULT_ANOMALY_THRESHOLD, compute_baseline, detect_anomaly, sample_query_latency,
};
use db::provision::{HttpScriptSource, ProvisionOutcome, Provisioner, VERIFY_QUERY, verify};
use db::{QueryPolicy, SqliteDatabase};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const BASELINE_SAMPLES: usize = 5;

fn format_row(row: &[Value]) -> String {
    row.iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let conf = ChatConfig::get_or_default();
    let path = &conf.database.path;

    let provisioner = Provisioner::new(
        HttpScriptSource::default(),
        conf.database.schema_url.clone(),
        conf.database.data_url.clone(),
    );

    match provisioner
        .ensure(path)
        .await
        .context("database setup failed")?
    {
        ProvisionOutcome::Created => println!("Database created at {}", path.display()),
        ProvisionOutcome::AlreadyPresent => {
            println!("Database {} already exists. Skipping setup.", path.display());
        }
    }

    let mut db = SqliteDatabase::open(path, QueryPolicy::ReadOnly).await?;

    println!("\nRunning test query: {VERIFY_QUERY}");
    let (result, elapsed) = verify(&mut db).await.context("test query failed")?;
    println!("Query executed in {:.4} seconds.", elapsed.as_secs_f64());

    if result.is_empty() {
        println!("Test query ran but returned no results.");
        return Ok(());
    }
    for (i, row) in result.rows.iter().enumerate() {
        println!("  {}: {}", i + 1, format_row(row));
    }

    let mut samples = Vec::with_capacity(BASELINE_SAMPLES);
    for _ in 0..BASELINE_SAMPLES {
        samples.push(sample_query_latency(&mut db, VERIFY_QUERY).await?.as_secs_f64());
    }
    let baseline = compute_baseline(&samples);
    println!(
        "\nLatency baseline over {BASELINE_SAMPLES} runs: mean {:.4}s, median {:.4}s, max {:.4}s",
        baseline.mean, baseline.median, baseline.max
    );

    let current = sample_query_latency(&mut db, VERIFY_QUERY).await?.as_secs_f64();
    let (anomalous, reason) = detect_anomaly(current, &baseline, DEFAULT_ANOMALY_THRESHOLD);
    if anomalous {
        tracing::warn!("slow query: {reason}");
    } else {
        println!("Latest run: {current:.4}s ({reason})");
    }

    Ok(())
}

//! Terminal case review for one client, driven entirely through the HTTP API

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use credit_risk_api::api_client::ApiClient;
use credit_risk_api::review;

#[derive(Parser, Debug)]
#[command(
    name = "case-review",
    about = "Score a reference client and explain the decision"
)]
struct Cli {
    /// Client id (SK_ID_CURR)
    client_id: i64,

    /// Base URL of the scoring API
    #[arg(long, env = "API_URL", default_value = "http://127.0.0.1:8000")]
    api_url: String,

    /// Number of local contributions to show
    #[arg(long, default_value_t = 10)]
    top_n: usize,

    /// Population sample size for comparisons
    #[arg(long, default_value_t = 2000)]
    sample: usize,

    /// Timeout (in seconds) for each HTTP request
    #[arg(long, default_value_t = 300)]
    timeout_seconds: u64,

    /// Compare the client with the population on this feature (repeatable)
    #[arg(long, value_name = "FEATURE")]
    compare: Vec<String>,

    /// Compare the client with the population on two features at once
    #[arg(long, value_name = "X,Y", value_parser = parse_pair)]
    pair: Option<(String, String)>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(',') {
        Some((x, y)) if !x.trim().is_empty() && !y.trim().is_empty() => {
            Ok((x.trim().to_string(), y.trim().to_string()))
        }
        _ => Err(format!("expected two comma-separated feature names, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let api = ApiClient::new(&cli.api_url, Duration::from_secs(cli.timeout_seconds))?;
    if !api.health().await.unwrap_or(false) {
        bail!("API at {} is not healthy", api.base_url());
    }

    let metadata = api.metadata().await.context("fetching metadata")?;
    let mut requested: Vec<&str> = cli.compare.iter().map(String::as_str).collect();
    if let Some((x, y)) = &cli.pair {
        requested.extend([x.as_str(), y.as_str()]);
    }
    let unknown = review::unknown_features(&requested, &metadata);
    if !unknown.is_empty() {
        let known: Vec<&str> = metadata.features.iter().map(|f| f.name.as_str()).collect();
        bail!(
            "unknown feature(s) {}; expected one of {}",
            unknown.join(", "),
            known.join(", ")
        );
    }

    let Some(record) = api.get_client(cli.client_id).await? else {
        bail!("Client {} not found", cli.client_id);
    };

    let explanation = api
        .explain(&record.features, cli.top_n)
        .await
        .context("explaining client")?;
    let population = api
        .population_sample(cli.sample)
        .await
        .context("fetching population sample")?;

    println!(
        "Model threshold {} | costs FN {} / FP {} | {} features",
        review::fmt_pct(metadata.threshold_used),
        metadata.business_cost_fn,
        metadata.business_cost_fp,
        metadata.features.len()
    );
    println!();
    println!("{}", review::render_report(&record, &explanation, &population));

    if !cli.compare.is_empty() {
        println!("== Selected features ==");
        for feature in &cli.compare {
            match review::compare_feature(feature, record.features.get(feature), &population.rows) {
                Some(cmp) => print!("{}", review::render_comparison(&cmp)),
                None => println!("  {feature:<28} no numeric population data"),
            }
        }
        println!();
    }

    if let Some((x, y)) = &cli.pair {
        match review::compare_pair(x, y, &record.features, &population.rows) {
            Some(pair) => print!("{}", review::render_pair(&pair)),
            None => println!("No numeric population data for {x} x {y}"),
        }
    }

    Ok(())
}

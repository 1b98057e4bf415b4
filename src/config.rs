//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default profile columns shown alongside a client's features
const DEFAULT_PROFILE_COLUMNS: &str = "CODE_GENDER,NAME_CONTRACT_TYPE,AMT_INCOME_TOTAL,AMT_CREDIT,\
AMT_ANNUITY,NAME_INCOME_TYPE,NAME_EDUCATION_TYPE,NAME_FAMILY_STATUS,CNT_CHILDREN,DAYS_BIRTH,DAYS_EMPLOYED";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Remote model registry endpoint serving a JSON model artifact
    pub model_registry_url: Option<String>,

    /// Registry request timeout in seconds
    pub model_registry_timeout_secs: u64,

    /// Local model artifact
    pub model_path: PathBuf,

    /// Fall back to the built-in stub model when nothing else loads
    pub allow_stub_model: bool,

    /// Reference dataset (CSV)
    pub reference_data_path: PathBuf,

    /// Extra dataset columns returned in client profiles
    pub profile_columns: Vec<String>,

    /// Append-only prediction log (NDJSON)
    pub prediction_log_path: PathBuf,

    /// Decision threshold on the default probability
    pub threshold: f64,

    /// Cost of accepting a client who defaults
    pub cost_fn: u32,

    /// Cost of refusing a client who would have repaid
    pub cost_fp: u32,

    /// Rows sampled from the reference dataset as attribution background
    pub background_size: usize,

    /// Seed for every sampling step
    pub random_seed: u64,

    /// Antithetic permutation pairs per explained row
    pub explainer_permutations: usize,

    /// Background rows used to mask features in the permutation explainer
    pub explainer_masker_size: usize,

    /// Default number of local contribution rows
    pub local_top_n: usize,

    /// Number of global importance rows
    pub global_top_n: usize,

    /// Upper bound on `/population/sample?n=`
    pub population_sample_max: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let is_production = environment == "production";

        Self {
            port: parse_or("PORT", 8000),

            model_registry_url: env::var("MODEL_REGISTRY_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),

            model_registry_timeout_secs: parse_or("MODEL_REGISTRY_TIMEOUT_SECS", 10),

            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "model/model.json".to_string())
                .into(),

            allow_stub_model: parse_or("MODEL_ALLOW_STUB", !is_production),

            reference_data_path: env::var("REFERENCE_DATA_PATH")
                .unwrap_or_else(|_| "data/clients.csv".to_string())
                .into(),

            profile_columns: split_list(
                &env::var("PROFILE_COLUMNS")
                    .unwrap_or_else(|_| DEFAULT_PROFILE_COLUMNS.to_string()),
            ),

            prediction_log_path: env::var("PREDICTION_LOG_PATH")
                .unwrap_or_else(|_| "logs/predictions.jsonl".to_string())
                .into(),

            threshold: parse_or("DECISION_THRESHOLD", 0.42),
            cost_fn: parse_or("COST_FN", 10_000),
            cost_fp: parse_or("COST_FP", 500),

            background_size: parse_or("BACKGROUND_SIZE", 500),
            random_seed: parse_or("RANDOM_SEED", 42),
            explainer_permutations: parse_or("EXPLAINER_PERMUTATIONS", 10),
            explainer_masker_size: parse_or("EXPLAINER_MASKER_SIZE", 100),

            local_top_n: parse_or("LOCAL_TOP_N", 10),
            global_top_n: parse_or("GLOBAL_TOP_N", 20),
            population_sample_max: parse_or("POPULATION_SAMPLE_MAX", 10_000),

            environment,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            environment: "development".to_string(),
            model_registry_url: None,
            model_registry_timeout_secs: 10,
            model_path: "model/model.json".into(),
            allow_stub_model: true,
            reference_data_path: "data/clients.csv".into(),
            profile_columns: split_list(DEFAULT_PROFILE_COLUMNS),
            prediction_log_path: "logs/predictions.jsonl".into(),
            threshold: 0.42,
            cost_fn: 10_000,
            cost_fp: 500,
            background_size: 500,
            random_seed: 42,
            explainer_permutations: 10,
            explainer_masker_size: 100,
            local_top_n: 10,
            global_top_n: 20,
            population_sample_max: 10_000,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

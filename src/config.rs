use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context};

use crate::weakness::BlendWeights;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// `None` uses the embedded seed catalog.
    pub catalog_path: Option<PathBuf>,
    pub batch_size: usize,
    /// Sessions considered when picking the next adaptive batch.
    pub drill_history: usize,
    /// Sessions considered for readiness and top weaknesses.
    pub readiness_history: usize,
    pub weights: BlendWeights,
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://vocab.db?mode=rwc".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            catalog_path: None,
            batch_size: 20,
            drill_history: 5,
            readiness_history: 10,
            weights: BlendWeights::default(),
            rng_seed: None,
        }
    }
}

impl Config {
    /// Reads `VOCAB_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            database_url: lookup("VOCAB_DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: lookup("VOCAB_BIND_ADDR").unwrap_or(defaults.bind_addr),
            catalog_path: lookup("VOCAB_CATALOG_PATH").map(PathBuf::from),
            batch_size: parse_or(&lookup, "VOCAB_BATCH_SIZE", defaults.batch_size)?,
            drill_history: parse_or(&lookup, "VOCAB_DRILL_HISTORY", defaults.drill_history)?,
            readiness_history: parse_or(&lookup, "VOCAB_READINESS_HISTORY", defaults.readiness_history)?,
            weights: parse_weights(&lookup, defaults.weights)?,
            rng_seed: lookup("VOCAB_RNG_SEED")
                .map(|raw| parse_var("VOCAB_RNG_SEED", &raw))
                .transpose()?,
        })
    }
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Both weights must be finite and non-negative, and they must sum to one.
fn parse_weights(lookup: &impl Fn(&str) -> Option<String>, defaults: BlendWeights) -> anyhow::Result<BlendWeights> {
    let diagnostic = parse_weight(lookup, "VOCAB_DIAGNOSTIC_WEIGHT", defaults.diagnostic)?;
    let sessions = parse_weight(lookup, "VOCAB_SESSION_WEIGHT", defaults.sessions)?;

    ensure!(
        (diagnostic + sessions - 1.0).abs() <= WEIGHT_SUM_TOLERANCE,
        "VOCAB_DIAGNOSTIC_WEIGHT ({}) and VOCAB_SESSION_WEIGHT ({}) must sum to 1",
        diagnostic,
        sessions
    );
    Ok(BlendWeights { diagnostic, sessions })
}

fn parse_weight(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> anyhow::Result<f64> {
    let weight: f64 = parse_or(lookup, key, default)?;
    check_weight(weight).with_context(|| format!("invalid value for {}: {}", key, weight))?;
    Ok(weight)
}

fn check_weight(weight: f64) -> anyhow::Result<()> {
    ensure!(weight.is_finite(), "weight is not a finite number");
    ensure!(weight >= 0.0, "weight is negative");
    Ok(())
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", key, raw))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => parse_var(key, &raw),
        None => Ok(default),
    }
}

// service/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::time::Duration;

const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";
const MAX_GATEWAY_TIMEOUT_SECS: u64 = 30;
const MOCK_KEY_ID: &str = "rzp_test_mock";
const MOCK_KEY_SECRET: &str = "mock_secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  Postgres,
  Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
  Razorpay,
  Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

/// Credentials and limits for the payment gateway, injected into whatever
/// needs them rather than read from globals.
#[derive(Clone)]
pub struct GatewayConfig {
  pub kind: GatewayKind,
  pub key_id: String,
  pub key_secret: String,
  pub api_base: String,
  pub timeout: Duration,
  pub currency: String,
}

impl fmt::Debug for GatewayConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GatewayConfig")
      .field("kind", &self.kind)
      .field("key_id", &self.key_id)
      .field("key_secret", &"[REDACTED]")
      .field("api_base", &self.api_base)
      .field("timeout", &self.timeout)
      .field("currency", &self.currency)
      .finish()
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub store_backend: StoreBackend,
  pub database_url: Option<String>,
  pub run_migrations: bool,
  pub gateway: GatewayConfig,
  /// `None` disables the background reconciliation task.
  pub reconcile_interval: Option<Duration>,
  pub log_format: LogFormat,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds the configuration from any key lookup. `from_env` passes the
  /// process environment; tests pass a map.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
    let parse_bool = |key: &str, default: &str| {
      get_or(key, default)
        .parse::<bool>()
        .map_err(|e| AppError::Config(format!("Invalid {} value: {}", key, e)))
    };
    let parse_u64 = |key: &str, default: &str| {
      get_or(key, default)
        .parse::<u64>()
        .map_err(|e| AppError::Config(format!("Invalid {} value: {}", key, e)))
    };

    let server_host = get_or("SERVER_HOST", "127.0.0.1");
    let server_port = get_or("SERVER_PORT", "8080")
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;

    let store_backend = match get_or("PAYMENT_STORE", "postgres").to_lowercase().as_str() {
      "postgres" => StoreBackend::Postgres,
      "memory" => StoreBackend::Memory,
      other => return Err(AppError::Config(format!("Unknown PAYMENT_STORE '{}'", other))),
    };
    let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
      return Err(AppError::Config(
        "Missing environment variable 'DATABASE_URL' (required when PAYMENT_STORE=postgres)".to_string(),
      ));
    }
    let run_migrations = parse_bool("RUN_MIGRATIONS", "false")?;

    let kind = match get_or("PAYMENT_GATEWAY", "razorpay").to_lowercase().as_str() {
      "razorpay" => GatewayKind::Razorpay,
      "mock" => GatewayKind::Mock,
      other => return Err(AppError::Config(format!("Unknown PAYMENT_GATEWAY '{}'", other))),
    };
    // The mock gateway signs with whatever secret it is given, so it gets a default.
    let (default_key_id, default_secret) = match kind {
      GatewayKind::Mock => (MOCK_KEY_ID, MOCK_KEY_SECRET),
      GatewayKind::Razorpay => ("", ""),
    };
    let key_id = get_or("RAZORPAY_KEY_ID", default_key_id);
    let key_secret = get_or("RAZORPAY_KEY_SECRET", default_secret);
    if kind == GatewayKind::Razorpay && (key_id.is_empty() || key_secret.is_empty()) {
      return Err(AppError::Config(
        "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET are required when PAYMENT_GATEWAY=razorpay".to_string(),
      ));
    }
    let timeout_secs = parse_u64("GATEWAY_TIMEOUT_SECS", "5")?;
    if timeout_secs == 0 || timeout_secs > MAX_GATEWAY_TIMEOUT_SECS {
      return Err(AppError::Config(format!(
        "GATEWAY_TIMEOUT_SECS must be between 1 and {}, got {}",
        MAX_GATEWAY_TIMEOUT_SECS, timeout_secs
      )));
    }
    let currency = get_or("PAYMENT_CURRENCY", "INR").to_uppercase();

    let gateway = GatewayConfig {
      kind,
      key_id,
      key_secret,
      api_base: get_or("RAZORPAY_API_BASE", DEFAULT_RAZORPAY_API_BASE)
        .trim_end_matches('/')
        .to_string(),
      timeout: Duration::from_secs(timeout_secs),
      currency,
    };

    let reconcile_secs = parse_u64("RECONCILE_INTERVAL_SECS", "60")?;
    let reconcile_interval = (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs));

    let log_format = match get_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
      "json" => LogFormat::Json,
      _ => LogFormat::Pretty,
    };

    tracing::info!("Application configuration loaded successfully.");
    tracing::debug!(gateway = ?gateway, store = ?store_backend, "Loaded config details");

    Ok(Self {
      server_host,
      server_port,
      store_backend,
      database_url,
      run_migrations,
      gateway,
      reconcile_interval,
      log_format,
    })
  }
}

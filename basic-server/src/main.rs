use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use std::{env, path};

use axum::extract::State;
use axum::http::Uri;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;

use ratewarden_core::{PolicyRegistry, RateLimitConfig, RateLimitEngine, RateLimitLayer, Sweeper};
use ratewarden_store_adapter_memory::StoreAdapterMemory;
use ratewarden_store_adapter_sqlite::StoreAdapterSqlite;
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::RateLimitAdapter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
	/// Shared SQLite database under `DB_DIR`
	Sqlite,
	/// Process-local maps
	Memory,
}

impl FromStr for StoreKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"sqlite" => Ok(StoreKind::Sqlite),
			"memory" => Ok(StoreKind::Memory),
			_ => Err(Error::ConfigError(format!("unknown store '{}', expected sqlite or memory", s))),
		}
	}
}

pub struct Config {
	pub listen: Box<str>,
	pub store: StoreKind,
	pub db_dir: path::PathBuf,
	pub policy_file: Option<path::PathBuf>,
	pub rate_limit: RateLimitConfig,
}

/// Parse an optional environment variable
fn env_parse<T: FromStr>(name: &str) -> WdResult<Option<T>> {
	match env::var(name) {
		Ok(value) => value
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| Error::ConfigError(format!("invalid value for {}: '{}'", name, value))),
		Err(_) => Ok(None),
	}
}

impl Config {
	fn from_env() -> WdResult<Self> {
		let defaults = RateLimitConfig::default();
		let store = match env::var("STORE") {
			Ok(store) => store.parse()?,
			Err(_) => StoreKind::Sqlite,
		};

		Ok(Self {
			listen: env::var("LISTEN").unwrap_or("127.0.0.1:8080".to_string()).into(),
			store,
			db_dir: path::PathBuf::from(env::var("DB_DIR").unwrap_or("./data".to_string())),
			policy_file: env::var("POLICY_FILE").ok().map(path::PathBuf::from),
			rate_limit: RateLimitConfig {
				store_timeout: env_parse("STORE_TIMEOUT_MS")?
					.map_or(defaults.store_timeout, Duration::from_millis),
				sweep_interval: env_parse("SWEEP_INTERVAL_SECS")?
					.map_or(defaults.sweep_interval, Duration::from_secs),
				max_tracked_keys: env_parse("MAX_TRACKED_KEYS")?.unwrap_or(defaults.max_tracked_keys),
				trust_peer_addr: env_parse("TRUST_PEER_ADDR")?.unwrap_or(defaults.trust_peer_addr),
			},
		})
	}
}

/// Stand-in for the integration behind a function endpoint
async fn accepted(uri: Uri) -> Json<serde_json::Value> {
	let endpoint = uri.path().rsplit('/').next().unwrap_or_default();
	Json(json!({ "endpoint": endpoint, "status": "accepted" }))
}

async fn health(State(engine): State<Arc<RateLimitEngine>>) -> Json<serde_json::Value> {
	Json(json!({ "status": "ok", "version": VERSION, "rateLimit": engine.stats() }))
}

fn router(engine: Arc<RateLimitEngine>) -> Router {
	let mut router = Router::new().route("/health", get(health));
	for endpoint in engine.registry().endpoints() {
		router = router.route(
			&format!("/fn/{}", endpoint),
			any(accepted).layer(RateLimitLayer::new(engine.clone(), endpoint)),
		);
	}
	// Functions without a policy are not limited
	router.route("/fn/{endpoint}", any(accepted)).with_state(engine)
}

#[tokio::main]
async fn main() -> WdResult<()> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();
	info!("ratewarden basic server V{}", VERSION);

	let config = Config::from_env()?;

	let registry = match &config.policy_file {
		Some(path) => PolicyRegistry::load(path).await?,
		None => PolicyRegistry::default(),
	};
	info!("rate limited endpoints: {}", registry.endpoints().join(", "));

	let store: Arc<dyn RateLimitAdapter> = match config.store {
		StoreKind::Sqlite => Arc::new(StoreAdapterSqlite::new(config.db_dir.join("ratelimit.db")).await?),
		StoreKind::Memory => {
			warn!("using the in-memory store, limits are not shared between instances");
			Arc::new(StoreAdapterMemory::new(config.rate_limit.max_tracked_keys))
		}
	};

	let _sweeper = Sweeper::new(store.clone(), config.rate_limit.sweep_interval).spawn();
	let engine = Arc::new(RateLimitEngine::new(store, registry, &config.rate_limit));

	let listener = tokio::net::TcpListener::bind(config.listen.as_ref()).await?;
	info!("Listening on HTTP {}", config.listen);
	axum::serve(listener, router(engine).into_make_service_with_connect_info::<SocketAddr>())
		.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_store_kind() {
		assert_eq!("sqlite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
		assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
		assert!(matches!("redis".parse::<StoreKind>(), Err(Error::ConfigError(_))));
	}
}

// vim: ts=4

//! Maintenance Sweeper
//!
//! Periodically deletes elapsed windows, expired blocks and violations past
//! the retention period. Reads apply the same expiry rules on their own, so
//! the sweeper only bounds storage growth.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use ratewarden_types::store_adapter::{PurgeStats, RateLimitAdapter};

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Sweeper {
	store: Arc<dyn RateLimitAdapter>,
	interval: Duration,
}

impl Sweeper {
	pub fn new(store: Arc<dyn RateLimitAdapter>, interval: Duration) -> Self {
		Self { store, interval }
	}

	/// Run one sweep. Each record kind is purged in its own batch; a failing
	/// batch is logged and the others still run.
	pub async fn run_once(&self, now: Timestamp) -> PurgeStats {
		let windows = self.store.purge_windows(now).await.unwrap_or_else(|err| {
			warn!("sweeper: purging windows failed: {}", err);
			0
		});
		let blocks = self.store.purge_blocks(now).await.unwrap_or_else(|err| {
			warn!("sweeper: purging blocks failed: {}", err);
			0
		});
		let violations = self.store.purge_violations(now).await.unwrap_or_else(|err| {
			warn!("sweeper: purging violations failed: {}", err);
			0
		});

		let stats = PurgeStats { windows, blocks, violations };
		if stats.total() > 0 {
			debug!(
				"sweeper: purged {} windows, {} blocks, {} violations",
				stats.windows, stats.blocks, stats.violations
			);
		}
		stats
	}

	/// Start sweeping in the background. The first sweep runs one interval
	/// after startup.
	pub fn spawn(self) -> JoinHandle<()> {
		info!("starting rate limit sweeper, interval {:?}", self.interval);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(self.interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				self.run_once(Timestamp::now()).await;
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ratewarden_store_adapter_memory::StoreAdapterMemory;
	use ratewarden_types::policy::Policy;
	use ratewarden_types::store_adapter::{BlockEntry, NewViolation};

	#[tokio::test]
	async fn test_run_once_purges_each_kind() {
		let store = Arc::new(StoreAdapterMemory::default());
		let policy = Policy::new("webhook", Duration::from_secs(60), 300, Duration::from_secs(120));
		let t0 = Timestamp::from_secs(1_000);

		store.hit_window("10.0.0.1", &policy, t0).await.unwrap();
		store
			.upsert_block(&BlockEntry {
				identity: "10.0.0.2".into(),
				endpoint: None,
				blocked_until: t0 + Duration::from_secs(10),
				reason: "test".into(),
				created_at: t0,
			})
			.await
			.unwrap();
		let violation = NewViolation {
			identity: "10.0.0.3",
			endpoint: "webhook",
			requests_count: 301,
			base_block: policy.base_block,
		};
		store.record_violation(&violation, t0).await.unwrap();

		let sweeper = Sweeper::new(store.clone(), Duration::from_secs(300));
		let stats = sweeper.run_once(t0 + Duration::from_secs(25 * 3600)).await;
		assert_eq!(stats, PurgeStats { windows: 1, blocks: 1, violations: 1 });
		assert_eq!(sweeper.run_once(t0 + Duration::from_secs(26 * 3600)).await.total(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_spawned_sweeper_ticks() {
		let store = Arc::new(StoreAdapterMemory::default());
		store
			.upsert_block(&BlockEntry {
				identity: "10.0.0.2".into(),
				endpoint: Some("webhook".into()),
				blocked_until: Timestamp(1),
				reason: "test".into(),
				created_at: Timestamp(0),
			})
			.await
			.unwrap();

		let handle = Sweeper::new(store.clone(), Duration::from_secs(60)).spawn();
		tokio::time::sleep(Duration::from_secs(61)).await;
		tokio::task::yield_now().await;

		// Expired blocks are invisible anyway; the sweeper removed the record
		assert_eq!(store.purge_blocks(Timestamp::now()).await.unwrap(), 0);
		handle.abort();
	}
}

// vim: ts=4

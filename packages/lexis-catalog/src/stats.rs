use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters since the synchronizer was built.
///
/// `inserts`, `updates`, and `deletes` count row events. The rest count per-projection
/// outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
	pub inserts: u64,
	pub updates: u64,
	pub deletes: u64,
	pub upserts: u64,
	pub removals: u64,
	pub noops: u64,
	pub extraction_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
	pub(crate) inserts: AtomicU64,
	pub(crate) updates: AtomicU64,
	pub(crate) deletes: AtomicU64,
	pub(crate) upserts: AtomicU64,
	pub(crate) removals: AtomicU64,
	pub(crate) noops: AtomicU64,
	pub(crate) extraction_failures: AtomicU64,
}
impl Counters {
	pub(crate) fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn snapshot(&self) -> SyncStats {
		SyncStats {
			inserts: self.inserts.load(Ordering::Relaxed),
			updates: self.updates.load(Ordering::Relaxed),
			deletes: self.deletes.load(Ordering::Relaxed),
			upserts: self.upserts.load(Ordering::Relaxed),
			removals: self.removals.load(Ordering::Relaxed),
			noops: self.noops.load(Ordering::Relaxed),
			extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
		}
	}
}

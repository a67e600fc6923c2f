//! Target-window watches over device metrics.
//!
//! A watch names a target value and a tolerance; it resolves the first time
//! a published value lands inside `target - tolerance ..= target + tolerance`,
//! yielding `value + tolerance` as the overshoot-corrected reading. Each
//! watch resolves at most once, and dropping its handle withdraws it.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Tolerance used when a caller does not pick one.
pub const DEFAULT_TOLERANCE: i32 = 5;

struct WatchEntry {
	id: u64,
	target: i32,
	tolerance: i32,
	tx: oneshot::Sender<i32>,
}

/// Pending watches for one metric of one device.
///
/// Publishing a value settles every matching watch under a single lock,
/// so removal and resolution cannot interleave with a second publish.
#[derive(Default)]
pub struct WatchPool {
	entries: Mutex<Vec<WatchEntry>>,
	next_id: AtomicU64,
}

impl WatchPool {
	pub fn new() -> WatchPool {
		WatchPool::default()
	}

	/// Registers a watch for `target` within `tolerance`.
	pub fn watch(self: &Arc<Self>, target: i32, tolerance: i32) -> ValueWatcher {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.entries.lock().push(WatchEntry { id, target, tolerance, tx });
		ValueWatcher { pool: Arc::clone(self), id, rx, resolved: false }
	}

	/// Feeds a metric value to every pending watch.
	pub fn publish(&self, value: i32) {
		let mut entries = self.entries.lock();
		let mut index = 0;
		while index < entries.len() {
			let entry = &entries[index];
			let low = entry.target.saturating_sub(entry.tolerance);
			let high = entry.target.saturating_add(entry.tolerance);
			if value >= low && value <= high {
				let entry = entries.swap_remove(index);
				let resolved = value.saturating_add(entry.tolerance);
				if entry.tx.send(resolved).is_err() {
					tracing::debug!("Watcher dropped before resolution");
				}
			} else {
				index += 1;
			}
		}
	}

	/// Withdraws every pending watch; their futures settle with
	/// [`Error::ChannelClosed`].
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of pending watches.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	fn cancel(&self, id: u64) {
		self.entries.lock().retain(|entry| entry.id != id);
	}
}

/// Handle to one pending watch. Resolves with the overshoot-corrected
/// value; dropping it withdraws the watch.
pub struct ValueWatcher {
	pool: Arc<WatchPool>,
	id: u64,
	rx: oneshot::Receiver<i32>,
	resolved: bool,
}

impl ValueWatcher {
	/// Waits for the watch to resolve, giving up after `timeout`.
	pub async fn wait(self, timeout: Duration) -> Result<i32> {
		match tokio::time::timeout(timeout, self).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout("Timeout waiting for value watch".to_string())),
		}
	}

	/// Withdraws the watch explicitly. Equivalent to dropping it.
	pub fn cancel(self) {}
}

impl Future for ValueWatcher {
	type Output = Result<i32>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(value)) => {
				self.resolved = true;
				Poll::Ready(Ok(value))
			}
			Poll::Ready(Err(_)) => {
				self.resolved = true;
				Poll::Ready(Err(Error::ChannelClosed))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

impl Drop for ValueWatcher {
	fn drop(&mut self) {
		if !self.resolved {
			self.pool.cancel(self.id);
		}
	}
}

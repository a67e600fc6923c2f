//! Correlation ids and result delivery.
//!
//! Every command carries a short random id; the hub answers with the same
//! id at some later point. Results can legitimately arrive before anyone
//! awaits them (the hub acknowledges faster than the sender re-enters the
//! scheduler), so unclaimed results are parked in a bounded cache and the
//! first `wait_for` claims them. An id stays reserved until its result is
//! consumed or expires, so a late answer can never be attributed to a
//! reused id.

use crate::error::{Error, Result};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Characters a task id is drawn from.
const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of a task id.
const ID_LEN: usize = 4;

/// How long an unclaimed result stays claimable.
const EARLY_RESULT_TTL: Duration = Duration::from_secs(30);

/// Most unclaimed results kept at once.
const EARLY_RESULT_CAP: usize = 256;

#[derive(Debug)]
struct EarlyResult {
	id: Arc<str>,
	payload: Value,
	arrived: Instant,
}

/// Correlates command ids with their results.
#[derive(Debug)]
pub struct TaskRegistry {
	in_use: DashSet<Arc<str>>,
	waiters: DashMap<Arc<str>, oneshot::Sender<Value>>,
	early: Mutex<VecDeque<EarlyResult>>,
}

impl TaskRegistry {
	pub fn new() -> TaskRegistry {
		TaskRegistry {
			in_use: DashSet::new(),
			waiters: DashMap::new(),
			early: Mutex::new(VecDeque::new()),
		}
	}

	/// Reserves a fresh four-character id.
	pub fn new_id(&self) -> Arc<str> {
		let mut rng = rand::rng();
		loop {
			let id: String = (0..ID_LEN)
				.map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
				.collect();
			let id: Arc<str> = id.into();
			if self.in_use.insert(Arc::clone(&id)) {
				return id;
			}
		}
	}

	/// Hands a result to its waiter, or parks it for a later claim.
	///
	/// Results for ids this registry never issued (or already settled) are
	/// dropped with a debug log.
	pub fn deliver(&self, id: &str, payload: Value) {
		self.prune_early();
		if let Some((id, tx)) = self.waiters.remove(id) {
			self.in_use.remove(&id);
			if tx.send(payload).is_err() {
				tracing::debug!(%id, "Result waiter dropped before delivery");
			}
			return;
		}
		let Some(reserved) = self.in_use.get(id).map(|entry| Arc::clone(entry.key())) else {
			tracing::debug!(id, "Result for unknown task id");
			return;
		};
		let mut early = self.early.lock();
		if early.len() >= EARLY_RESULT_CAP {
			if let Some(evicted) = early.pop_front() {
				self.in_use.remove(&evicted.id);
				tracing::debug!(id = %evicted.id, "Early-result cache full, dropped oldest");
			}
		}
		early.push_back(EarlyResult { id: reserved, payload, arrived: Instant::now() });
	}

	/// Claims the result for `id`, parked or future.
	pub fn wait_for(self: &Arc<Self>, id: Arc<str>) -> ResultWaiter {
		if let Some(parked) = self.claim_early(&id) {
			return ResultWaiter {
				registry: Arc::clone(self),
				id,
				rx: None,
				ready: Some(parked),
				done: false,
			};
		}
		let (tx, rx) = oneshot::channel();
		self.waiters.insert(Arc::clone(&id), tx);
		// The result may have been parked between the check above and the
		// waiter insert; claim it back so it cannot strand.
		if let Some(parked) = self.claim_early(&id) {
			self.waiters.remove(&id);
			return ResultWaiter {
				registry: Arc::clone(self),
				id,
				rx: None,
				ready: Some(parked),
				done: false,
			};
		}
		ResultWaiter { registry: Arc::clone(self), id, rx: Some(rx), ready: None, done: false }
	}

	/// Releases an id that never made it onto the wire.
	pub fn release(&self, id: &str) {
		self.waiters.remove(id);
		self.in_use.remove(id);
	}

	/// Drops every pending waiter; their futures settle with
	/// [`Error::ChannelClosed`]. Parked results are discarded.
	pub fn fail_pending(&self) {
		self.waiters.clear();
		let mut early = self.early.lock();
		for parked in early.drain(..) {
			self.in_use.remove(&parked.id);
		}
	}

	/// Number of waiters not yet answered.
	pub fn waiter_count(&self) -> usize {
		self.waiters.len()
	}

	/// Number of results parked for a late claim.
	pub fn parked_count(&self) -> usize {
		self.early.lock().len()
	}

	fn claim_early(&self, id: &str) -> Option<Value> {
		let mut early = self.early.lock();
		let index = early.iter().position(|entry| &*entry.id == id)?;
		let parked = early.remove(index)?;
		drop(early);
		self.in_use.remove(&parked.id);
		Some(parked.payload)
	}

	fn prune_early(&self) {
		let now = Instant::now();
		let mut early = self.early.lock();
		while early
			.front()
			.is_some_and(|entry| now.duration_since(entry.arrived) >= EARLY_RESULT_TTL)
		{
			if let Some(expired) = early.pop_front() {
				self.in_use.remove(&expired.id);
				tracing::debug!(id = %expired.id, "Unclaimed result expired");
			}
		}
	}
}

impl Default for TaskRegistry {
	fn default() -> Self {
		TaskRegistry::new()
	}
}

/// Pending result of one command.
///
/// Dropping the waiter abandons the result: a late answer is parked in the
/// early-result cache and expires with it.
#[derive(Debug)]
pub struct ResultWaiter {
	registry: Arc<TaskRegistry>,
	id: Arc<str>,
	rx: Option<oneshot::Receiver<Value>>,
	ready: Option<Value>,
	done: bool,
}

impl ResultWaiter {
	/// Correlation id this waiter is bound to.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Waits for the result, giving up after `timeout`.
	pub async fn wait(self, timeout: Duration) -> Result<Value> {
		let id = Arc::clone(&self.id);
		match tokio::time::timeout(timeout, self).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!("No result for task {id} within {timeout:?}"))),
		}
	}
}

impl Future for ResultWaiter {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if let Some(value) = self.ready.take() {
			self.done = true;
			return Poll::Ready(Ok(value));
		}
		let Some(rx) = self.rx.as_mut() else {
			return Poll::Ready(Err(Error::ChannelClosed));
		};
		match Pin::new(rx).poll(cx) {
			Poll::Ready(Ok(value)) => {
				self.done = true;
				Poll::Ready(Ok(value))
			}
			Poll::Ready(Err(_)) => {
				self.done = true;
				Poll::Ready(Err(Error::ChannelClosed))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

impl Drop for ResultWaiter {
	fn drop(&mut self) {
		if !self.done {
			self.registry.waiters.remove(&self.id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::collections::HashSet;

	#[test]
	fn test_ids_are_four_chars_from_the_alphabet() {
		let registry = TaskRegistry::new();
		let mut seen = HashSet::new();
		for _ in 0..100 {
			let id = registry.new_id();
			assert_eq!(id.len(), ID_LEN);
			assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)), "bad id {id}");
			assert!(seen.insert(id.to_string()), "issued id twice");
		}
	}

	#[tokio::test]
	async fn test_result_wakes_waiter() {
		let registry = Arc::new(TaskRegistry::new());
		let id = registry.new_id();
		let waiter = registry.wait_for(Arc::clone(&id));
		assert_eq!(registry.waiter_count(), 1);

		registry.deliver(&id, json!({"ok": true}));
		let value = waiter.wait(Duration::from_secs(1)).await.unwrap();
		assert_eq!(value, json!({"ok": true}));
		assert_eq!(registry.waiter_count(), 0);
		assert_eq!(registry.parked_count(), 0);
	}

	#[tokio::test]
	async fn test_early_result_is_claimed_once() {
		let registry = Arc::new(TaskRegistry::new());
		let id = registry.new_id();

		registry.deliver(&id, json!(42));
		assert_eq!(registry.parked_count(), 1);

		let waiter = registry.wait_for(Arc::clone(&id));
		assert_eq!(registry.parked_count(), 0);
		let value = waiter.wait(Duration::from_secs(1)).await.unwrap();
		assert_eq!(value, json!(42));

		// The id was freed with the claim, so a second answer is noise.
		registry.deliver(&id, json!(43));
		assert_eq!(registry.parked_count(), 0);
	}

	#[tokio::test]
	async fn test_timed_out_waiter_leaves_the_id_reserved() {
		let registry = Arc::new(TaskRegistry::new());
		let id = registry.new_id();

		let waiter = registry.wait_for(Arc::clone(&id));
		let error = waiter.wait(Duration::from_millis(10)).await.unwrap_err();
		assert!(error.is_timeout());
		assert_eq!(registry.waiter_count(), 0);

		// Late answer parks under the still-reserved id and stays claimable.
		registry.deliver(&id, json!("late"));
		assert_eq!(registry.parked_count(), 1);
		let retry = registry.wait_for(Arc::clone(&id));
		let value = retry.wait(Duration::from_secs(1)).await.unwrap();
		assert_eq!(value, json!("late"));
	}

	#[tokio::test]
	async fn test_dropping_a_waiter_abandons_the_result() {
		let registry = Arc::new(TaskRegistry::new());
		let id = registry.new_id();

		let waiter = registry.wait_for(Arc::clone(&id));
		drop(waiter);
		assert_eq!(registry.waiter_count(), 0);

		registry.deliver(&id, json!(1));
		assert_eq!(registry.parked_count(), 1);
	}

	#[test]
	fn test_release_frees_an_unsent_id() {
		let registry = TaskRegistry::new();
		let id = registry.new_id();
		registry.release(&id);

		registry.deliver(&id, json!(9));
		assert_eq!(registry.parked_count(), 0);
	}

	#[test]
	fn test_cache_evicts_oldest_beyond_capacity() {
		let registry = TaskRegistry::new();
		for n in 0..EARLY_RESULT_CAP + 10 {
			let id = registry.new_id();
			registry.deliver(&id, json!(n));
		}
		assert_eq!(registry.parked_count(), EARLY_RESULT_CAP);
	}

	#[tokio::test]
	async fn test_fail_pending_settles_waiters_and_drops_parked() {
		let registry = Arc::new(TaskRegistry::new());
		let parked_id = registry.new_id();
		registry.deliver(&parked_id, json!("stale"));
		let waiter = registry.wait_for(registry.new_id());

		registry.fail_pending();
		assert_eq!(registry.parked_count(), 0);
		let error = waiter.wait(Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(error, Error::ChannelClosed));
	}
}

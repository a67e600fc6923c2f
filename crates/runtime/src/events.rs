//! Event fan-out.
//!
//! One bounded broadcast bus per session. Streams are pull-based and
//! lag-tolerant: a subscriber that falls behind loses the oldest events
//! and keeps going, so a slow observer can never stall packet dispatch.
//! One-shot waiters ride the same bus for wait-until-X call sites.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

/// Queue depth for subscribers that do not pick one.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

struct WaiterEntry<E> {
	predicate: Box<dyn Fn(&E) -> bool + Send + Sync>,
	tx: oneshot::Sender<E>,
}

/// Broadcast bus with one-shot predicate waiters.
pub struct EventBus<E: Clone + Send + 'static> {
	tx: broadcast::Sender<E>,
	waiters: Mutex<Vec<WaiterEntry<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
	pub fn new(capacity: usize) -> EventBus<E> {
		let (tx, _) = broadcast::channel(capacity);
		EventBus { tx, waiters: Mutex::new(Vec::new()) }
	}

	/// Delivers an event to every waiter whose predicate matches, then to
	/// every stream. Waiters settle before streams see the event.
	pub fn emit(&self, event: E) {
		{
			let mut waiters = self.waiters.lock();
			let mut index = 0;
			while index < waiters.len() {
				if (waiters[index].predicate)(&event) {
					let entry = waiters.swap_remove(index);
					let _ = entry.tx.send(event.clone());
				} else {
					index += 1;
				}
			}
		}
		// No receivers is fine; send only fails when nobody listens.
		let _ = self.tx.send(event);
	}

	/// Opens a stream over everything emitted from now on.
	pub fn subscribe(&self) -> EventStream<E> {
		EventStream { rx: self.tx.subscribe() }
	}

	/// Registers a one-shot waiter for the first event matching
	/// `predicate`.
	pub fn waiter(
		&self,
		predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
		timeout: Duration,
	) -> EventWaiter<E> {
		let (tx, rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry { predicate: Box::new(predicate), tx });
		EventWaiter { rx, timeout }
	}

	/// Number of pending one-shot waiters.
	pub fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
	fn default() -> Self {
		EventBus::new(DEFAULT_EVENT_CAPACITY)
	}
}

/// Pull-based subscription to an [`EventBus`].
pub struct EventStream<E> {
	rx: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> EventStream<E> {
	/// Next event, or `None` once the bus is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(dropped)) => {
					tracing::warn!(dropped, "Event stream lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Next event if one is already queued.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
					tracing::warn!(dropped, "Event stream lagged, dropped events");
				}
				Err(_) => return None,
			}
		}
	}
}

/// One-shot wait for a matching event.
pub struct EventWaiter<E> {
	rx: oneshot::Receiver<E>,
	timeout: Duration,
}

impl<E> EventWaiter<E> {
	/// Waits for the match, honoring the timeout picked at registration.
	pub async fn wait(self) -> Result<E> {
		match tokio::time::timeout(self.timeout, self.rx).await {
			Ok(Ok(event)) => Ok(event),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout("Timeout waiting for event".to_string())),
		}
	}
}

impl<E> Future for EventWaiter<E> {
	type Output = Result<E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(event)) => Poll::Ready(Ok(event)),
			Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ChannelClosed)),
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Callback fed from an event stream on its own task.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops
/// the task; events already queued are discarded with it.
pub struct Subscription {
	cancel_tx: Option<oneshot::Sender<()>>,
}

impl Subscription {
	/// Spawns a consumer task feeding `callback` until the subscription is
	/// dropped or the stream ends.
	pub fn spawn<E, F>(mut stream: EventStream<E>, mut callback: F) -> Subscription
	where
		E: Clone + Send + 'static,
		F: FnMut(E) + Send + 'static,
	{
		let (cancel_tx, mut cancel_rx) = oneshot::channel();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = &mut cancel_rx => break,
					event = stream.recv() => match event {
						Some(event) => callback(event),
						None => break,
					},
				}
			}
		});
		Subscription { cancel_tx: Some(cancel_tx) }
	}

	/// Stops the consumer task.
	pub fn unsubscribe(mut self) {
		if let Some(tx) = self.cancel_tx.take() {
			let _ = tx.send(());
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(tx) = self.cancel_tx.take() {
			let _ = tx.send(());
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.cancel_tx.is_some())
			.finish()
	}
}

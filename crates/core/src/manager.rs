//! Connection manager: opens sessions and tracks live hubs.

use crate::devices::HubDeviceFactory;
use crate::hub::Hub;
use brickline_runtime::{Error, EventBus, EventStream, Result, Session, Subscription, TransportProvider};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Hub arrivals and departures, as seen by the manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
	/// `connect` finished and the hub is live.
	HubConnected(Hub),
	/// The hub's session ended, by request or by liveness timeout.
	HubDisconnected(Hub),
}

/// Opens and tracks hub sessions over a [`TransportProvider`].
///
/// One manager per application is typical. Dropping it leaves sessions
/// running; call [`HubManager::shutdown`] for an orderly end.
pub struct HubManager {
	inner: Arc<ManagerInner>,
}

struct ManagerInner {
	provider: Arc<dyn TransportProvider>,
	hubs: DashMap<String, ManagedHub>,
	events: EventBus<ManagerEvent>,
}

struct ManagedHub {
	hub: Hub,
	runner: JoinHandle<()>,
}

impl HubManager {
	pub fn new(provider: Arc<dyn TransportProvider>) -> HubManager {
		HubManager {
			inner: Arc::new(ManagerInner {
				provider,
				hubs: DashMap::new(),
				events: EventBus::default(),
			}),
		}
	}

	/// Opens a session to the hub at `address` and starts its receive
	/// loop. The provider's blocking dial runs off the async runtime.
	pub async fn connect(&self, address: &str) -> Result<Hub> {
		if self.inner.hubs.contains_key(address) {
			return Err(Error::ConnectFailed(format!("already connected to {address}")));
		}
		let provider = Arc::clone(&self.inner.provider);
		let dial_address = address.to_string();
		let transport = tokio::task::spawn_blocking(move || provider.connect(&dial_address))
			.await
			.map_err(|_| Error::ConnectFailed(format!("dial task for {address} was aborted")))??;

		let session = Arc::new(Session::new(address, transport));
		session.set_factory(Arc::new(HubDeviceFactory));
		if !session.mark_active() {
			return Err(Error::ConnectFailed(format!("session for {address} closed during setup")));
		}
		let hub = Hub::new(Arc::clone(&session));
		hub.enable_broadcasts();

		let runner = tokio::spawn({
			let inner = Arc::clone(&self.inner);
			let hub = hub.clone();
			async move {
				session.run().await;
				inner.hubs.remove(hub.address());
				inner.events.emit(ManagerEvent::HubDisconnected(hub));
			}
		});
		self.inner.hubs.insert(address.to_string(), ManagedHub { hub: hub.clone(), runner });
		self.inner.events.emit(ManagerEvent::HubConnected(hub.clone()));
		tracing::info!(address, "Hub connected");
		Ok(hub)
	}

	/// The hub at `address`, if its session is still live.
	pub fn hub(&self, address: &str) -> Option<Hub> {
		self.inner.hubs.get(address).map(|entry| entry.hub.clone())
	}

	/// Every hub this manager currently tracks.
	pub fn hubs(&self) -> Vec<Hub> {
		self.inner.hubs.iter().map(|entry| entry.hub.clone()).collect()
	}

	/// Stream over hub arrivals and departures.
	pub fn events(&self) -> EventStream<ManagerEvent> {
		self.inner.events.subscribe()
	}

	/// Runs `callback` for every hub that connects. Dropping the handle
	/// stops the callbacks.
	pub fn on_hub_connected(&self, mut callback: impl FnMut(Hub) + Send + 'static) -> Subscription {
		Subscription::spawn(self.inner.events.subscribe(), move |event| {
			if let ManagerEvent::HubConnected(hub) = event {
				callback(hub);
			}
		})
	}

	/// Runs `callback` once per hub whose session ends, whether by
	/// request or by liveness timeout.
	pub fn on_hub_disconnected(
		&self,
		mut callback: impl FnMut(Hub) + Send + 'static,
	) -> Subscription {
		Subscription::spawn(self.inner.events.subscribe(), move |event| {
			if let ManagerEvent::HubDisconnected(hub) = event {
				callback(hub);
			}
		})
	}

	/// Disconnects every hub and waits for their sessions to finish.
	pub async fn shutdown(&self) {
		let addresses: Vec<String> =
			self.inner.hubs.iter().map(|entry| entry.key().clone()).collect();
		let mut runners = Vec::new();
		for address in addresses {
			if let Some((_, managed)) = self.inner.hubs.remove(&address) {
				managed.hub.disconnect();
				runners.push(managed.runner);
			}
		}
		for runner in runners {
			if let Err(error) = runner.await {
				tracing::debug!("Session task ended abnormally: {error}");
			}
		}
		tracing::info!("Hub manager shut down");
	}
}

impl fmt::Debug for HubManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HubManager").field("hubs", &self.inner.hubs.len()).finish()
	}
}

//! Host side of the worker lifecycle.
//!
//! A `Registration` owns the worker versions for one scope and the pages
//! (clients) they control. It awaits each lifecycle phase before moving on,
//! so an install that has not finished never takes control of a page.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::WorkerError;
use crate::models::Request;
use crate::worker::{ActivateOutcome, FetchOutcome, OfflineCacheWorker};

pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new worker is active
    Activated(ActivateOutcome),
    /// Installed, but parked until the current worker's clients close
    Waiting,
}

#[derive(Default)]
pub struct Registration {
    active: Option<Arc<OfflineCacheWorker>>,
    waiting: Option<Arc<OfflineCacheWorker>>,
    /// Open pages and the worker controlling each, if any
    clients: BTreeMap<ClientId, Option<Arc<OfflineCacheWorker>>>,
    next_client: ClientId,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Arc<OfflineCacheWorker>> {
        self.active.as_ref()
    }

    pub fn active_version(&self) -> Option<&str> {
        self.active.as_deref().map(OfflineCacheWorker::version)
    }

    pub fn waiting_version(&self) -> Option<&str> {
        self.waiting.as_deref().map(OfflineCacheWorker::version)
    }

    pub fn controller_of(&self, client: ClientId) -> Option<&str> {
        self.clients
            .get(&client)
            .and_then(|c| c.as_deref())
            .map(OfflineCacheWorker::version)
    }

    /// Open a page. It is controlled by the active worker, if there is one.
    pub fn open_client(&mut self) -> ClientId {
        let id = self.next_client;
        self.next_client += 1;
        self.clients.insert(id, self.active.clone());
        id
    }

    /// Close a page. If that frees the active worker of its last client, a
    /// waiting worker is activated.
    pub async fn close_client(
        &mut self,
        client: ClientId,
    ) -> Result<Option<ActivateOutcome>, WorkerError> {
        self.clients.remove(&client);
        if self.waiting.is_none() || self.has_controlled_clients() {
            return Ok(None);
        }
        match self.waiting.take() {
            Some(worker) => self.promote(worker).await.map(Some),
            None => Ok(None),
        }
    }

    fn has_controlled_clients(&self) -> bool {
        self.clients.values().any(Option::is_some)
    }

    /// Install a new worker version and, unless it has to wait, activate it.
    ///
    /// A failed install leaves the current active worker in control.
    pub async fn update(
        &mut self,
        worker: Arc<OfflineCacheWorker>,
    ) -> Result<UpdateOutcome, WorkerError> {
        let install = worker.install().await?;

        if self.active.is_some() && self.has_controlled_clients() && !install.skip_waiting {
            info!(version = %worker.version(), "Worker waiting for clients to close");
            if let Some(previous) = self.waiting.replace(worker) {
                previous.mark_redundant();
            }
            return Ok(UpdateOutcome::Waiting);
        }

        if let Some(previous) = self.waiting.take() {
            previous.mark_redundant();
        }
        self.promote(worker).await.map(UpdateOutcome::Activated)
    }

    async fn promote(
        &mut self,
        worker: Arc<OfflineCacheWorker>,
    ) -> Result<ActivateOutcome, WorkerError> {
        // Nothing changes hands until activation has finished
        let outcome = match worker.activate().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(version = %worker.version(), error = %e, "Worker activation failed");
                worker.mark_redundant();
                return Err(e);
            }
        };
        if let Some(previous) = self.active.replace(Arc::clone(&worker)) {
            previous.mark_redundant();
        }

        let claim = worker.claims_clients();
        for controller in self.clients.values_mut() {
            // Pages of a replaced worker are left uncontrolled unless claimed
            *controller = if claim { Some(Arc::clone(&worker)) } else { None };
        }
        if claim {
            info!(version = %worker.version(), clients = self.clients.len(), "Claimed clients");
        }
        Ok(outcome)
    }

    /// Route a request from a page to its controlling worker.
    pub async fn dispatch(&self, client: ClientId, request: &Request) -> FetchOutcome {
        match self.clients.get(&client).and_then(|c| c.as_ref()) {
            Some(worker) => worker.handle_fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }
}

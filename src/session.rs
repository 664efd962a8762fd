//! Session registry
//!
//! A session owns one conversation context and one active order. All
//! dialogue turns of a session are serialized through its async mutex, so
//! the order manager below it never sees concurrent access. Idle sessions
//! are reclaimed by a periodic sweeper and opportunistically on creation.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::dialogue::ConversationContext;
use crate::menu::SharedCatalog;
use crate::order::OrderManager;

/// Everything a dialogue turn may mutate; guarded by the session mutex
pub struct SessionState {
    pub context: ConversationContext,
    pub orders: OrderManager,
}

impl SessionState {
    pub fn new(session_id: Uuid, catalog: SharedCatalog, max_history: usize) -> Self {
        Self {
            context: ConversationContext::new(session_id, max_history),
            orders: OrderManager::new(catalog),
        }
    }
}

pub struct Session {
    pub id: Uuid,
    pub state: tokio::sync::Mutex<SessionState>,
    /// Unix seconds of the last access; drives idle reclamation
    last_active: AtomicI64,
}

impl Session {
    fn new(id: Uuid, catalog: SharedCatalog, max_history: usize) -> Self {
        Self {
            id,
            state: tokio::sync::Mutex::new(SessionState::new(id, catalog, max_history)),
            last_active: AtomicI64::new(chrono::Utc::now().timestamp()),
        }
    }

    pub fn touch(&self) {
        self.last_active
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn idle_secs(&self) -> i64 {
        chrono::Utc::now().timestamp() - self.last_active.load(Ordering::Relaxed)
    }
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
    catalog: SharedCatalog,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(catalog: SharedCatalog, config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            catalog,
            config,
        }
    }

    /// Resolve an existing session or create one. A caller-supplied id that
    /// is unknown (e.g. swept while the client was away) gets a fresh
    /// session under that id so the client keeps its handle.
    pub fn get_or_create(&self, id: Option<Uuid>) -> Arc<Session> {
        if let Some(id) = id {
            if let Some(session) = self.sessions.get(&id) {
                session.touch();
                return session.clone();
            }
        }

        self.sweep();

        let id = id.unwrap_or_else(Uuid::new_v4);
        let session = Arc::new(Session::new(
            id,
            self.catalog.clone(),
            self.config.max_history,
        ));
        self.sessions.insert(id, session.clone());
        tracing::info!(target: "SESSION", "Session {} created ({} active)", id, self.sessions.len());
        session
    }

    pub fn end(&self, id: Uuid) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            tracing::info!(target: "SESSION", "Session {} ended", id);
        }
        removed
    }

    /// Reclaim sessions idle past the configured timeout
    pub fn sweep(&self) -> usize {
        let timeout = self.config.idle_timeout.as_secs() as i64;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.idle_secs() < timeout);
        let reclaimed = before - self.sessions.len();
        if reclaimed > 0 {
            tracing::info!(target: "SESSION", "Swept {} idle sessions", reclaimed);
        }
        reclaimed
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|s| *s.key()).collect()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval
    }
}

/// Background sweeper for idle sessions and stale payment records
pub async fn session_sweeper(
    registry: Arc<SessionRegistry>,
    payments: Arc<crate::dialogue::PaymentTracker>,
) {
    let interval = registry.sweep_interval();
    loop {
        tokio::time::sleep(interval).await;
        registry.sweep();
        // Payment records outlive their order long enough for late polls
        payments.sweep(chrono::Duration::hours(2));
    }
}

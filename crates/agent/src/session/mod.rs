//! In-process conversation state.
//!
//! [`SessionStore`] is the only owner of live sessions. Callers get clones back, never
//! references, and every mutation goes through the store's write lock. Durable snapshots are
//! handed to a [`SnapshotQueue`] after the lock is released.

pub mod reaper;
pub mod snapshot;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use storefront_core::catalog::filters::contains_ignore_case;
use storefront_core::clock::Clock;
use storefront_core::config::SessionConfig;
use storefront_core::domain::product::CatalogProduct;
use storefront_core::domain::session::{
    ProductReference, ScratchValue, SessionKey, SessionSnapshot, Turn,
};
use storefront_db::repositories::{RepositoryError, SessionSnapshotRepository};

pub use reaper::SessionReaper;
pub use snapshot::{SnapshotQueue, SnapshotQueueError, SnapshotWriter, WriterStats};

const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_SNAPSHOT_EVERY_TURNS: u32 = 3;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub history_limit: usize,
    pub snapshot_every_turns: u32,
    pub default_ttl: Duration,
    pub max_idle: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            snapshot_every_turns: config.snapshot_every_turns.max(1),
            default_ttl: config.default_ttl(),
            max_idle: config.max_idle(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            snapshot_every_turns: DEFAULT_SNAPSHOT_EVERY_TURNS,
            default_ttl: DEFAULT_TTL,
            max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

/// One conversation's state. Obtained from the store as a detached copy.
#[derive(Clone, Debug)]
pub struct Session {
    id: Uuid,
    key: SessionKey,
    history: Vec<Turn>,
    product_list: Vec<ProductReference>,
    sequence_counter: u32,
    scratch: HashMap<String, ScratchValue>,
    ttl: Duration,
    created_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
    appended_turns: u64,
}

impl Session {
    fn new(key: SessionKey, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            history: Vec::new(),
            product_list: Vec::new(),
            sequence_counter: 0,
            scratch: HashMap::new(),
            ttl,
            created_at: now,
            last_touched: now,
            appended_turns: 0,
        }
    }

    fn from_snapshot(snapshot: SessionSnapshot, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: snapshot.key,
            history: snapshot.history,
            product_list: snapshot.product_list,
            sequence_counter: snapshot.sequence_counter,
            scratch: HashMap::new(),
            ttl,
            created_at: snapshot.created_at,
            last_touched: snapshot.updated_at,
            appended_turns: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn product_list(&self) -> &[ProductReference] {
        &self.product_list
    }

    pub fn sequence_counter(&self) -> u32 {
        self.sequence_counter
    }

    pub fn scratch(&self, name: &str) -> Option<&ScratchValue> {
        self.scratch.get(name)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_touched).to_std().unwrap_or_default()
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.idle_for(now) > ttl
    }

    /// Returns true when this append completes a snapshot interval.
    fn push_turn(&mut self, turn: Turn, limit: usize, every: u32) -> bool {
        self.history.push(turn);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
        self.appended_turns += 1;
        self.appended_turns % u64::from(every.max(1)) == 0
    }

    fn replace_products(&mut self, products: &[CatalogProduct]) -> Vec<ProductReference> {
        self.product_list.clear();
        self.sequence_counter = 0;
        self.extend_products(products)
    }

    fn extend_products(&mut self, products: &[CatalogProduct]) -> Vec<ProductReference> {
        let mut added = Vec::with_capacity(products.len());
        for product in products {
            self.sequence_counter += 1;
            let reference = ProductReference::from_product(self.sequence_counter, product);
            self.product_list.push(reference.clone());
            added.push(reference);
        }
        added
    }

    /// Renumbers the current list so it starts at `first`; the counter continues after it.
    fn renumber_products(&mut self, first: u32) -> Vec<ProductReference> {
        let mut next = first.max(1);
        for reference in &mut self.product_list {
            reference.sequential_id = next;
            next += 1;
        }
        self.sequence_counter = next - 1;
        self.product_list.clone()
    }

    fn find_sequence(&self, sequence: u32) -> Option<&ProductReference> {
        find_by_sequence(&self.product_list, sequence)
    }

    fn find_name(&self, text: &str) -> Option<&ProductReference> {
        find_by_name(&self.product_list, text)
    }

    /// Deep copy of the durable fields. Scratch data is not persisted.
    fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            history: self.history.clone(),
            product_list: self.product_list.clone(),
            sequence_counter: self.sequence_counter,
            created_at: self.created_at,
            updated_at: self.last_touched,
        }
    }
}

pub fn find_by_sequence(list: &[ProductReference], sequence: u32) -> Option<&ProductReference> {
    list.iter().find(|reference| reference.sequential_id == sequence)
}

/// First entry whose name contains `text`, ignoring case. Blank text matches nothing.
pub fn find_by_name<'a>(list: &'a [ProductReference], text: &str) -> Option<&'a ProductReference> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    list.iter().find(|reference| contains_ignore_case(&reference.name, text))
}

/// Held for the duration of one conversation turn; dropping it lets the next turn in.
pub struct TurnGuard {
    _guard: OwnedMutexGuard<()>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    turn_gates: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    snapshots: Option<SnapshotQueue>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            turn_gates: Mutex::new(HashMap::new()),
            clock,
            settings,
            snapshots: None,
        }
    }

    pub fn with_snapshot_queue(mut self, queue: SnapshotQueue) -> Self {
        self.snapshots = Some(queue);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Waits until no other turn of the same conversation is running. Turns of different
    /// conversations never wait on each other. Waiters are admitted in arrival order.
    pub async fn begin_turn(&self, key: &SessionKey) -> TurnGuard {
        let gate = {
            let mut gates = self.turn_gates.lock().await;
            Arc::clone(gates.entry(key.clone()).or_default())
        };
        TurnGuard { _guard: gate.lock_owned().await }
    }

    /// Returns the live session for `key`, replacing it with a fresh one when it has been idle
    /// longer than `ttl`.
    pub async fn get_or_create(&self, key: &SessionKey, ttl: Duration) -> Session {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = Self::live_entry(&mut sessions, key, now, Some(ttl), &self.settings);
        session.ttl = ttl;
        session.last_touched = now;
        session.clone()
    }

    pub async fn append_turn(&self, key: &SessionKey, turn: Turn) {
        let snapshot = self
            .mutate(key, |session, settings| {
                let due = session.push_turn(
                    turn,
                    settings.history_limit,
                    settings.snapshot_every_turns,
                );
                due.then(|| session.to_snapshot())
            })
            .await;
        if let Some(snapshot) = snapshot {
            self.enqueue_snapshot(snapshot);
        }
    }

    pub async fn history(&self, key: &SessionKey) -> Vec<Turn> {
        self.read(key, |session| session.history.clone()).await.unwrap_or_default()
    }

    /// Replaces the referenceable list and numbers it from 1.
    pub async fn store_product_list(
        &self,
        key: &SessionKey,
        products: &[CatalogProduct],
    ) -> Vec<ProductReference> {
        let (references, snapshot) = self
            .mutate(key, |session, _| {
                let references = session.replace_products(products);
                (references, session.to_snapshot())
            })
            .await;
        self.enqueue_snapshot(snapshot);
        references
    }

    /// Extends the referenceable list, continuing the current numbering.
    pub async fn append_product_list(
        &self,
        key: &SessionKey,
        products: &[CatalogProduct],
    ) -> Vec<ProductReference> {
        let (references, snapshot) = self
            .mutate(key, |session, _| {
                let references = session.extend_products(products);
                (references, session.to_snapshot())
            })
            .await;
        self.enqueue_snapshot(snapshot);
        references
    }

    /// Shifts the list so it starts at `first`, keeping the order.
    pub async fn renumber_product_list(
        &self,
        key: &SessionKey,
        first: u32,
    ) -> Vec<ProductReference> {
        let (references, snapshot) = self
            .mutate(key, |session, _| {
                let references = session.renumber_products(first);
                (references, session.to_snapshot())
            })
            .await;
        self.enqueue_snapshot(snapshot);
        references
    }

    pub async fn product_list(&self, key: &SessionKey) -> Vec<ProductReference> {
        self.read(key, |session| session.product_list.clone()).await.unwrap_or_default()
    }

    pub async fn resolve_by_sequence(
        &self,
        key: &SessionKey,
        sequence: u32,
    ) -> Option<ProductReference> {
        self.read(key, |session| session.find_sequence(sequence).cloned()).await.flatten()
    }

    /// First product whose name contains `text`, ignoring case.
    pub async fn resolve_by_name(&self, key: &SessionKey, text: &str) -> Option<ProductReference> {
        self.read(key, |session| session.find_name(text).cloned()).await.flatten()
    }

    pub async fn put_scratch(&self, key: &SessionKey, name: &str, value: ScratchValue) {
        self.mutate(key, |session, _| {
            session.scratch.insert(name.to_string(), value);
        })
        .await;
    }

    pub async fn scratch(&self, key: &SessionKey, name: &str) -> Option<ScratchValue> {
        self.read(key, |session| session.scratch.get(name).cloned()).await.flatten()
    }

    /// Drops the session. Durable snapshots are left as they are.
    pub async fn clear(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.write().await.remove(key).is_some();
        if removed {
            debug!(
                event_name = "session.cleared",
                tenant_id = %key.tenant_id,
                identity = %key.masked_identity(),
                "session dropped"
            );
        }
        removed
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Removes every session idle for longer than `max_idle`, whatever ttl it was created with.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, max_idle));
        let evicted = before - sessions.len();
        drop(sessions);

        let live = self.sessions.read().await;
        self.turn_gates
            .lock()
            .await
            .retain(|key, gate| live.contains_key(key) || Arc::strong_count(gate) > 1);
        evicted
    }

    /// Seeds the store from snapshots, keeping any session that is already live.
    pub async fn restore(&self, snapshots: Vec<SessionSnapshot>) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let mut restored = 0;
        for snapshot in snapshots {
            if sessions.contains_key(&snapshot.key) {
                continue;
            }
            let session = Session::from_snapshot(snapshot, self.settings.default_ttl);
            if session.is_expired(now, self.settings.max_idle) {
                continue;
            }
            sessions.insert(session.key.clone(), session);
            restored += 1;
        }
        restored
    }

    pub async fn warm_start(
        &self,
        repository: &dyn SessionSnapshotRepository,
    ) -> Result<usize, RepositoryError> {
        let max_idle = chrono::Duration::from_std(self.settings.max_idle)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let since = self.clock.now() - max_idle;
        let snapshots = repository.load_recent(since).await?;
        let restored = self.restore(snapshots).await;
        info!(
            event_name = "session.warm_start",
            correlation_id = "bootstrap",
            restored,
            "sessions restored from durable snapshots"
        );
        Ok(restored)
    }

    fn live_entry<'a>(
        sessions: &'a mut HashMap<SessionKey, Session>,
        key: &SessionKey,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
        settings: &SessionSettings,
    ) -> &'a mut Session {
        let entry = sessions.entry(key.clone()).or_insert_with(|| {
            Session::new(key.clone(), now, ttl.unwrap_or(settings.default_ttl))
        });
        let ttl = ttl.unwrap_or(entry.ttl);
        if entry.is_expired(now, ttl) {
            *entry = Session::new(key.clone(), now, ttl);
        }
        entry
    }

    async fn mutate<T>(
        &self,
        key: &SessionKey,
        apply: impl FnOnce(&mut Session, &SessionSettings) -> T,
    ) -> T {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = Self::live_entry(&mut sessions, key, now, None, &self.settings);
        session.last_touched = now;
        apply(session, &self.settings)
    }

    async fn read<T>(&self, key: &SessionKey, view: impl FnOnce(&Session) -> T) -> Option<T> {
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        sessions.get(key).filter(|session| !session.is_expired(now, session.ttl)).map(view)
    }

    fn enqueue_snapshot(&self, snapshot: SessionSnapshot) {
        let Some(queue) = &self.snapshots else {
            return;
        };
        let tenant_id = snapshot.key.tenant_id.clone();
        let identity = snapshot.key.masked_identity();
        match queue.try_enqueue(snapshot) {
            Ok(()) => debug!(
                event_name = "session.snapshot.enqueued",
                tenant_id = %tenant_id,
                identity = %identity,
                "session snapshot queued"
            ),
            Err(SnapshotQueueError::Full) => warn!(
                event_name = "session.snapshot.queue_full",
                tenant_id = %tenant_id,
                identity = %identity,
                "snapshot queue full; snapshot dropped"
            ),
            Err(SnapshotQueueError::Closed) => warn!(
                event_name = "session.snapshot.queue_closed",
                tenant_id = %tenant_id,
                identity = %identity,
                "snapshot writer stopped; snapshot dropped"
            ),
        }
    }
}

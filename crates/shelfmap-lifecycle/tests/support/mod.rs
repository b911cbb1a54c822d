//! In-memory collaborators shared by the lifecycle integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shelfmap_cache::{LocalCache, ManualClock, MemoryBackend};
use shelfmap_core::{
    Coordinate, DispatchError, NewStore, Notification, NotificationDispatcher, NotificationOutbox,
    OutboxMessage, OwnerContact, OwnerDirectory, RepositoryError, StatusChange, StatusUpdate,
    Store, StorePatch, StoreRepository, StoreStatus,
};
use shelfmap_lifecycle::{LifecycleManager, LifecyclePorts, LifecycleSettings, StoreDirectory};
use shelfmap_notify::DeliveryPolicy;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn store(id: &str, owner_id: &str, status: StoreStatus) -> Store {
    Store {
        id: id.to_string(),
        name: format!("Store {id}"),
        address: "Rizal St".to_string(),
        description: None,
        location: Coordinate {
            latitude: 12.675,
            longitude: 123.871,
        },
        owner_id: owner_id.to_string(),
        status,
        contact_email: None,
        image_ref: None,
        permit_image_refs: Vec::new(),
        revision: 1,
        reviewed_by: None,
        reviewed_at: None,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowState {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub message: OutboxMessage,
    pub state: RowState,
}

/// Stores and outbox rows behind one lock, like a single database.
#[derive(Default)]
pub struct InMemoryStores {
    stores: Mutex<HashMap<String, Store>>,
    outbox: Mutex<Vec<OutboxRow>>,
    pub status_writes: AtomicU32,
    pub reads: AtomicU32,
    pub fail_writes: AtomicBool,
    /// Commit status changes without their notification.
    pub drop_notifications: AtomicBool,
}

impl InMemoryStores {
    pub fn with(stores: impl IntoIterator<Item = Store>) -> Arc<Self> {
        let repo = Self::default();
        {
            let mut map = repo.stores.lock().unwrap();
            for s in stores {
                map.insert(s.id.clone(), s);
            }
        }
        Arc::new(repo)
    }

    pub fn get(&self, id: &str) -> Option<Store> {
        self.stores.lock().unwrap().get(id).cloned()
    }

    /// Simulate a write from another process.
    pub fn bump_revision(&self, id: &str) {
        if let Some(s) = self.stores.lock().unwrap().get_mut(id) {
            s.revision += 1;
        }
    }

    pub fn outbox_rows(&self) -> Vec<OutboxRow> {
        self.outbox.lock().unwrap().clone()
    }

    pub fn enqueue(&self, store_id: &str, notification: Notification, at: DateTime<Utc>) -> i64 {
        let mut rows = self.outbox.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap() + 1;
        rows.push(OutboxRow {
            message: OutboxMessage {
                id,
                store_id: store_id.to_string(),
                notification,
                attempts: 0,
                next_attempt_at: at,
                last_error: None,
            },
            state: RowState::Pending,
        });
        id
    }

    fn update_row(&self, id: i64, f: impl FnOnce(&mut OutboxRow)) -> Result<(), RepositoryError> {
        let mut rows = self.outbox.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.message.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("outbox {id}")))?;
        f(row);
        Ok(())
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for InMemoryStores {
    async fn create_store(&self, new_store: &NewStore) -> Result<Store, RepositoryError> {
        self.check_writable()?;
        let mut map = self.stores.lock().unwrap();
        let id = format!("s{}", map.len() + 1);
        let mut created = store(&id, &new_store.owner_id, StoreStatus::Pending);
        created.name.clone_from(&new_store.name);
        created.address.clone_from(&new_store.address);
        created.location = new_store.location;
        created.contact_email.clone_from(&new_store.contact_email);
        map.insert(id, created.clone());
        Ok(created)
    }

    async fn fetch_stores_by_status(
        &self,
        status: Option<StoreStatus>,
    ) -> Result<Vec<Store>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut out: Vec<Store> = self
            .stores
            .lock()
            .unwrap()
            .values()
            .filter(|s| status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn fetch_stores_by_owner(&self, owner_id: &str) -> Result<Vec<Store>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut out: Vec<Store> = self
            .stores
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Ids are matched case-insensitively, like UUIDs in Postgres.
    async fn fetch_store_by_id(&self, id: &str) -> Result<Store, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.get(&id.trim().to_ascii_lowercase())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn update_store_status(
        &self,
        change: &StatusChange,
    ) -> Result<StatusUpdate, RepositoryError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let updated = {
            let mut map = self.stores.lock().unwrap();
            let current = map
                .get_mut(&change.store_id)
                .ok_or_else(|| RepositoryError::NotFound(change.store_id.clone()))?;
            if current.revision != change.expected_revision {
                return Err(RepositoryError::RevisionConflict {
                    store_id: change.store_id.clone(),
                    expected_revision: change.expected_revision,
                });
            }
            current.status = change.status;
            current.revision += 1;
            current.reviewed_by = Some(change.actor.id.clone());
            current.reviewed_at = Some(epoch());
            current.clone()
        };
        let outbox_id = change
            .notification
            .clone()
            .filter(|_| !self.drop_notifications.load(Ordering::SeqCst))
            .map(|n| self.enqueue(&change.store_id, n, change.deliver_after));
        Ok(StatusUpdate {
            store: updated,
            outbox_id,
        })
    }

    async fn update_store_fields(
        &self,
        id: &str,
        patch: &StorePatch,
    ) -> Result<Store, RepositoryError> {
        self.check_writable()?;
        let mut map = self.stores.lock().unwrap();
        let current = map
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if let Some(name) = &patch.name {
            current.name.clone_from(name);
        }
        if let Some(address) = &patch.address {
            current.address.clone_from(address);
        }
        if let Some(email) = &patch.contact_email {
            current.contact_email.clone_from(email);
        }
        current.revision += 1;
        Ok(current.clone())
    }

    async fn delete_store(&self, id: &str) -> Result<Store, RepositoryError> {
        self.check_writable()?;
        self.stores
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl NotificationOutbox for InMemoryStores {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let mut rows = self.outbox.lock().unwrap();
        Ok(rows
            .iter_mut()
            .filter(|r| r.state == RowState::Pending && r.message.next_attempt_at <= now)
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|r| {
                r.message.next_attempt_at = lease_until;
                r.message.clone()
            })
            .collect())
    }

    async fn mark_sent(&self, id: i64, attempts: i32) -> Result<(), RepositoryError> {
        self.update_row(id, |r| {
            r.state = RowState::Sent;
            r.message.attempts = attempts;
        })
    }

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        self.update_row(id, |r| {
            r.message.attempts = attempts;
            r.message.next_attempt_at = next_attempt_at;
            r.message.last_error = Some(error.to_string());
        })
    }

    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        self.update_row(id, |r| {
            r.state = RowState::Failed;
            r.message.attempts = attempts;
            r.message.last_error = Some(error.to_string());
        })
    }
}

#[derive(Default)]
pub struct FakeOwners {
    contacts: HashMap<String, OwnerContact>,
    pub fail: bool,
    pub lookups: AtomicU32,
}

impl FakeOwners {
    pub fn with_email(owner_id: &str, email: &str) -> Self {
        let mut owners = Self::default();
        owners.contacts.insert(
            owner_id.to_string(),
            OwnerContact {
                owner_id: owner_id.to_string(),
                email: Some(email.to_string()),
                display_name: None,
            },
        );
        owners
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl OwnerDirectory for FakeOwners {
    async fn fetch_owner_contact(
        &self,
        owner_id: &str,
    ) -> Result<Option<OwnerContact>, RepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RepositoryError::Unavailable("directory offline".to_string()));
        }
        Ok(self.contacts.get(owner_id).cloned())
    }
}

/// Records every message; fails the first `failures` sends.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<Notification>>,
    pub calls: AtomicU32,
    failures: u32,
    latency: Duration,
}

impl RecordingDispatcher {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    /// Succeeds after `latency`.
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if n < self.failures {
            return Err(DispatchError::new("smtp relay refused connection"));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        profile_ttl: Duration::from_secs(900),
        delivery: DeliveryPolicy {
            attempt_timeout: Duration::from_millis(500),
            max_retries: 1,
            backoff_base_ms: 0,
        },
        outbox_backoff_base: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryStores>,
    pub owners: Arc<FakeOwners>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualClock>,
    pub cache: LocalCache,
    pub manager: LifecycleManager,
    pub directory: StoreDirectory,
}

impl Harness {
    pub fn new(
        stores: impl IntoIterator<Item = Store>,
        owners: FakeOwners,
        dispatcher: RecordingDispatcher,
    ) -> Self {
        let repo = InMemoryStores::with(stores);
        let owners = Arc::new(owners);
        let dispatcher = Arc::new(dispatcher);
        let clock = Arc::new(ManualClock::new(epoch()));
        let cache = LocalCache::new(Arc::new(MemoryBackend::new()), clock.clone());
        let manager = LifecycleManager::new(
            LifecyclePorts {
                stores: repo.clone(),
                outbox: repo.clone(),
                owners: owners.clone(),
                dispatcher: dispatcher.clone(),
                clock: clock.clone(),
            },
            cache.clone(),
            fast_settings(),
        );
        let directory = StoreDirectory::new(
            repo.clone(),
            cache.clone(),
            Duration::from_secs(300),
            shelfmap_core::ProximityPolicy::default(),
        );
        Self {
            repo,
            owners,
            dispatcher,
            clock,
            cache,
            manager,
            directory,
        }
    }
}

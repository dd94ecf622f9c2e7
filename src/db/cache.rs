//! Process-wide tenant → database handle cache.
//!
//! Every tenant key is provisioned by at most one task at a time. The first
//! caller for a cold key inserts an in-flight slot holding a shared future;
//! concurrent callers for the same key await that future instead of starting
//! their own attempt. The attempt itself runs on a spawned task so it always
//! reaches a terminal state, even when every caller has gone away.
//!
//! Slot lifecycle for one key:
//!
//! ```text
//!   (absent) --claim--> InFlight --ok--> Ready --invalidate/evict--> (absent)
//!                          |
//!                          +--error/timeout/panic--> (absent)
//! ```
//!
//! The map lock is only held for map edits, never across provisioning I/O,
//! so tenants never wait on each other.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::db::provisioner::Provisioner;
use crate::db::tenant_key::TenantKey;
use crate::error::TenantDbError;
use crate::services::metrics::{CACHED_TENANTS, CACHE_HITS, PROVISION_ATTEMPTS, PROVISION_DURATION};

type Attempt<H> = Shared<BoxFuture<'static, Result<H, TenantDbError>>>;

/// Observable provisioning state of one tenant key. A failed attempt leaves
/// the key `Unstarted` again so the next call can retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Unstarted,
    InProgress,
    Ready,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Deadline for one full attempt (database, pool, schema).
    pub provision_timeout: Duration,
    /// Maximum number of ready handles; `None` keeps every tenant for the process lifetime.
    pub capacity: Option<NonZeroUsize>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            provision_timeout: Duration::from_secs(30),
            capacity: None,
        }
    }
}

enum Slot<H> {
    InFlight { attempt: Attempt<H>, id: u64 },
    Ready { handle: H, last_used: u64 },
}

struct Slots<H> {
    map: HashMap<TenantKey, Slot<H>>,
    clock: u64,
}

impl<H> Slots<H> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn ready_count(&self) -> usize {
        self.map
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }
}

struct Inner<P: Provisioner> {
    provisioner: P,
    slots: Mutex<Slots<P::Handle>>,
    options: CacheOptions,
}

/// Lazily provisioned, shared tenant database handles. Cheap to clone.
pub struct TenantCache<P: Provisioner> {
    inner: Arc<Inner<P>>,
}

impl<P: Provisioner> Clone for TenantCache<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Provisioner> TenantCache<P> {
    pub fn new(provisioner: P, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                provisioner,
                slots: Mutex::new(Slots {
                    map: HashMap::new(),
                    clock: 0,
                }),
                options,
            }),
        }
    }

    pub fn provisioner(&self) -> &P {
        &self.inner.provisioner
    }

    /// Returns the ready handle for `key`, provisioning the tenant first if needed.
    ///
    /// Concurrent callers for the same key share one attempt and receive the
    /// same handle or the same error. Errors are not cached.
    pub async fn get_or_create(&self, key: &TenantKey) -> Result<P::Handle, TenantDbError> {
        let attempt = {
            let mut guard = self.inner.lock();
            let slots = &mut *guard;
            let now = slots.tick();
            match slots.map.get_mut(key) {
                Some(Slot::Ready { handle, last_used }) => {
                    *last_used = now;
                    CACHE_HITS.inc();
                    return Ok(handle.clone());
                }
                Some(Slot::InFlight { attempt, .. }) => attempt.clone(),
                None => {
                    let attempt = Inner::spawn_attempt(&self.inner, key.clone(), now);
                    slots.map.insert(
                        key.clone(),
                        Slot::InFlight {
                            attempt: attempt.clone(),
                            id: now,
                        },
                    );
                    attempt
                }
            }
        };
        attempt.await
    }

    pub fn state(&self, key: &TenantKey) -> ProvisioningState {
        match self.inner.lock().map.get(key) {
            None => ProvisioningState::Unstarted,
            Some(Slot::InFlight { .. }) => ProvisioningState::InProgress,
            Some(Slot::Ready { .. }) => ProvisioningState::Ready,
        }
    }

    /// Number of tenants with a ready handle.
    pub fn len(&self) -> usize {
        self.inner.lock().ready_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets the ready handle for `key`; the next `get_or_create`
    /// provisions the tenant again. Requests still holding a clone keep
    /// using it, and the pool shuts down once the last clone is dropped.
    /// In-flight attempts are left alone; returns whether a ready handle was
    /// removed.
    pub fn invalidate(&self, key: &TenantKey) -> bool {
        let mut slots = self.inner.lock();
        match slots.map.remove(key) {
            Some(Slot::Ready { .. }) => {
                CACHED_TENANTS.dec();
                tracing::info!("Invalidated tenant database handle: {key}");
                true
            }
            Some(in_flight @ Slot::InFlight { .. }) => {
                slots.map.insert(key.clone(), in_flight);
                false
            }
            None => false,
        }
    }

    /// Provisions `keys` one after another. Failures are logged and skipped;
    /// returns the number of tenants that ended up ready.
    pub async fn warm(&self, keys: impl IntoIterator<Item = TenantKey>) -> usize {
        let mut ready = 0;
        for key in keys {
            match self.get_or_create(&key).await {
                Ok(_) => ready += 1,
                Err(e) => tracing::warn!("Warm-up of tenant {key} failed: {e}"),
            }
        }
        ready
    }
}

impl<P: Provisioner> Inner<P> {
    fn lock(&self) -> MutexGuard<'_, Slots<P::Handle>> {
        // Slot edits never panic halfway, so a poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_attempt(this: &Arc<Self>, key: TenantKey, id: u64) -> Attempt<P::Handle> {
        let database = this.provisioner.database_name(&key);
        let task = tokio::spawn(Arc::clone(this).run_attempt(key, id));
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Provisioning task for {database} aborted: {e}");
                    Err(TenantDbError::provisioning(database, sqlx::Error::WorkerCrashed))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn run_attempt(self: Arc<Self>, key: TenantKey, id: u64) -> Result<P::Handle, TenantDbError> {
        // Clears the in-flight slot on every exit that does not install a handle, panics included.
        let _release = ReleaseInFlight {
            inner: &self,
            key: &key,
            id,
        };

        let database = self.provisioner.database_name(&key);
        let started = Instant::now();
        let timeout = self.options.provision_timeout;

        let deadline = tokio::time::Instant::now() + timeout;
        let result = match provision(&self.provisioner, &key, deadline).await {
            Ok(handle) => Ok(handle),
            Err(Some(e)) => Err(e),
            Err(None) => Err(TenantDbError::Timeout {
                database: database.clone(),
                after: timeout,
            }),
        };
        PROVISION_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(handle) => {
                PROVISION_ATTEMPTS.with_label_values(&["ok"]).inc();
                tracing::info!(
                    "Tenant database ready: {database} ({} ms)",
                    started.elapsed().as_millis()
                );
                // Evicted handles may still be borrowed by running requests,
                // so only the cache's reference is released here.
                drop(self.install(&key, handle.clone()));
            }
            Err(e) => {
                PROVISION_ATTEMPTS.with_label_values(&[e.kind()]).inc();
                tracing::warn!("Provisioning of {database} failed: {e}");
            }
        }
        result
    }

    /// Marks `key` ready and returns the cache's references to the handles
    /// evicted to stay within capacity.
    fn install(&self, key: &TenantKey, handle: P::Handle) -> Vec<P::Handle> {
        let mut slots = self.lock();
        let now = slots.tick();
        slots.map.insert(
            key.clone(),
            Slot::Ready {
                handle,
                last_used: now,
            },
        );
        CACHED_TENANTS.inc();

        let mut evicted = Vec::new();
        let Some(capacity) = self.options.capacity else {
            return evicted;
        };
        while slots.ready_count() > capacity.get() {
            let victim = slots
                .map
                .iter()
                .filter_map(|(k, slot)| match slot {
                    Slot::Ready { last_used, .. } if k != key => Some((*last_used, k.clone())),
                    _ => None,
                })
                .min();
            let Some((_, victim)) = victim else { break };
            if let Some(Slot::Ready { handle, .. }) = slots.map.remove(&victim) {
                tracing::info!("Evicted least recently used tenant handle: {victim}");
                CACHED_TENANTS.dec();
                evicted.push(handle);
            }
        }
        evicted
    }
}

struct ReleaseInFlight<'a, P: Provisioner> {
    inner: &'a Inner<P>,
    key: &'a TenantKey,
    id: u64,
}

impl<P: Provisioner> Drop for ReleaseInFlight<'_, P> {
    fn drop(&mut self) {
        let mut slots = self.inner.lock();
        if matches!(slots.map.get(self.key), Some(Slot::InFlight { id, .. }) if *id == self.id) {
            slots.map.remove(self.key);
        }
    }
}

/// Database, then pool, then bootstrap schema, all before `deadline`.
///
/// `Err(None)` means the deadline passed. A handle whose schema pass failed
/// or ran out of time has never been handed out, so it is closed here.
async fn provision<P: Provisioner>(
    provisioner: &P,
    key: &TenantKey,
    deadline: tokio::time::Instant,
) -> Result<P::Handle, Option<TenantDbError>> {
    let opened = tokio::time::timeout_at(deadline, async {
        provisioner.ensure_database_exists(key).await?;
        provisioner.open(key).await
    })
    .await;
    let handle = opened.map_err(|_| None)?.map_err(Some)?;

    match tokio::time::timeout_at(deadline, provisioner.ensure_schema(&handle)).await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            provisioner.close(handle).await;
            Err(Some(e))
        }
        Err(_) => {
            provisioner.close(handle).await;
            Err(None)
        }
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arkive_tenantdb::db::provisioner::Provisioner;
use arkive_tenantdb::db::schema::BOOTSTRAP_SCHEMA;
use arkive_tenantdb::db::tenant_key::TenantKey;
use arkive_tenantdb::error::TenantDbError;
use async_trait::async_trait;

/// Handle returned by [`FakeProvisioner`]; identity is compared with `Arc::ptr_eq`.
#[derive(Debug)]
pub struct FakeHandle {
    pub database: String,
    pub closed: AtomicBool,
}

impl FakeHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory stand-in for a PostgreSQL server that records every call.
#[derive(Default)]
pub struct FakeServer {
    /// database name → bootstrap tables present
    pub databases: Mutex<HashMap<String, HashSet<&'static str>>>,
    /// database name → CREATE DATABASE statements issued
    pub creates: Mutex<HashMap<String, usize>>,
    pub ensure_calls: AtomicUsize,
    pub schema_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub unreachable: AtomicBool,
    /// Fail the schema pass at this table index when set.
    pub fail_schema_at: Mutex<Option<usize>>,
    /// Databases whose provisioning never completes.
    pub hanging: Mutex<HashSet<String>>,
    /// Databases whose schema pass never completes.
    pub hanging_schema: Mutex<HashSet<String>>,
    pub latency: Duration,
}

#[derive(Clone)]
pub struct FakeProvisioner(pub Arc<FakeServer>);

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self(Arc::new(FakeServer {
            latency,
            ..FakeServer::default()
        }))
    }

    pub fn server(&self) -> Arc<FakeServer> {
        Arc::clone(&self.0)
    }

    fn check_reachable(&self, database: &str) -> Result<(), TenantDbError> {
        if self.0.unreachable.load(Ordering::SeqCst) {
            let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
            return Err(TenantDbError::provisioning(database, sqlx::Error::Io(refused)));
        }
        Ok(())
    }

    async fn hang_if_requested(&self, hanging: &Mutex<HashSet<String>>, database: &str) {
        let hang = hanging.lock().unwrap().contains(database);
        if hang {
            std::future::pending::<()>().await;
        }
    }
}

impl FakeServer {
    pub fn creates_for(&self, database: &str) -> usize {
        self.creates.lock().unwrap().get(database).copied().unwrap_or(0)
    }

    pub fn total_creates(&self) -> usize {
        self.creates.lock().unwrap().values().sum()
    }

    pub fn tables_in(&self, database: &str) -> HashSet<&'static str> {
        self.databases
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    pub fn fail_schema_at(&self, index: Option<usize>) {
        *self.fail_schema_at.lock().unwrap() = index;
    }

    pub fn hang(&self, database: &str, hang: bool) {
        toggle(&self.hanging, database, hang);
    }

    pub fn hang_schema(&self, database: &str, hang: bool) {
        toggle(&self.hanging_schema, database, hang);
    }
}

fn toggle(set: &Mutex<HashSet<String>>, database: &str, on: bool) {
    let mut set = set.lock().unwrap();
    if on {
        set.insert(database.to_string());
    } else {
        set.remove(database);
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    type Handle = Arc<FakeHandle>;

    fn database_name(&self, key: &TenantKey) -> String {
        key.database_name("tenant_")
    }

    async fn ensure_database_exists(&self, key: &TenantKey) -> Result<(), TenantDbError> {
        let database = self.database_name(key);
        self.0.ensure_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.0.latency).await;
        self.check_reachable(&database)?;
        self.hang_if_requested(&self.0.hanging, &database).await;

        let mut databases = self.0.databases.lock().unwrap();
        if !databases.contains_key(&database) {
            *self.0.creates.lock().unwrap().entry(database.clone()).or_default() += 1;
            databases.insert(database, HashSet::new());
        }
        Ok(())
    }

    async fn open(&self, key: &TenantKey) -> Result<Self::Handle, TenantDbError> {
        let database = self.database_name(key);
        self.check_reachable(&database)?;
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeHandle {
            database,
            closed: AtomicBool::new(false),
        }))
    }

    async fn ensure_schema(&self, handle: &Self::Handle) -> Result<(), TenantDbError> {
        self.0.schema_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.0.latency).await;
        self.hang_if_requested(&self.0.hanging_schema, &handle.database).await;

        let fail_at = *self.0.fail_schema_at.lock().unwrap();
        let mut databases = self.0.databases.lock().unwrap();
        let tables = databases.entry(handle.database.clone()).or_default();
        for (index, table) in BOOTSTRAP_SCHEMA.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(TenantDbError::schema(
                    table.name,
                    sqlx::Error::Protocol("could not extend file: No space left on device".into()),
                ));
            }
            tables.insert(table.name);
        }
        Ok(())
    }

    async fn close(&self, handle: Self::Handle) {
        handle.closed.store(true, Ordering::SeqCst);
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn all_tables() -> HashSet<&'static str> {
    BOOTSTRAP_SCHEMA.iter().map(|t| t.name).collect()
}

/// Polls `cond` until it holds or one second passes.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

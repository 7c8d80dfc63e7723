use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::SystemClock;
use crate::engine::{Engine, EngineConfig};
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::store::{InMemoryStore, run_compactor};

/// One tenant's schedule: its WAL-backed store and the engine over it.
/// Catalog writes go to the store directly; the engine only reads them.
pub struct Tenant {
    pub store: Arc<InMemoryStore>,
    pub engine: Arc<Engine>,
}

/// Manages per-tenant schedules. Each tenant gets its own store, WAL and compactor.
/// Tenant = database name from the pgwire connection.
pub struct TenantManager {
    tenants: DashMap<String, Arc<Tenant>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    engine_config: EngineConfig,
    max_tenants: usize,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, engine_config: EngineConfig) -> Self {
        Self {
            tenants: DashMap::new(),
            data_dir,
            compact_threshold,
            engine_config,
            max_tenants: MAX_TENANTS,
        }
    }

    #[cfg(test)]
    fn with_max_tenants(mut self, max_tenants: usize) -> Self {
        self.max_tenants = max_tenants;
        self
    }

    /// Get or lazily open the tenant's schedule.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Tenant>> {
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }

        // Keeps the WAL path inside data_dir. Names that sanitise alike share one tenant.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        if let Some(existing) = self.tenants.get(&safe_name) {
            return Ok(existing.value().clone());
        }
        if self.tenants.len() >= self.max_tenants {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Two connections may race to open the same tenant; only one store may own the WAL.
        let entry = self.tenants.entry(safe_name.clone());
        if let dashmap::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let store = Arc::new(InMemoryStore::open(wal_path)?);
        let engine = Arc::new(Engine::new(
            store.clone(),
            Arc::new(SystemClock),
            Arc::new(NotifyHub::new()),
            self.engine_config,
        ));

        let compactor_store = store.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            run_compactor(compactor_store, threshold).await;
        });

        let opened = Arc::new(Tenant { store, engine });
        entry.or_insert(opened.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.tenants.len() as f64);
        tracing::info!("opened tenant {safe_name}");
        Ok(opened)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use chrono::NaiveDate;
    use ulid::Ulid;

    use crate::engine::AppointmentRequest;
    use crate::model::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotwise_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, EngineConfig::default())
    }

    fn request(team_member_id: Ulid, service_id: Ulid) -> AppointmentRequest {
        AppointmentRequest {
            id: None,
            customer_user_id: Ulid::new(),
            team_member_id,
            service_id,
            appointment_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: "10:00".into(),
            duration_minutes: None,
            customer_notes: None,
        }
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = manager(dir);

        let a = tm.get_or_create("tenant_a").unwrap();
        let b = tm.get_or_create("tenant_b").unwrap();

        let member = Ulid::new();
        let service = Ulid::new();
        a.store
            .put_service(ServiceInfo {
                id: service,
                duration_minutes: 30,
            })
            .await
            .unwrap();

        // Same ids, but tenant B has never heard of the service.
        a.engine.create_appointment(request(member, service)).await.unwrap();
        assert!(b.engine.create_appointment(request(member, service)).await.is_err());

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(a.engine.appointments_for_day(member, date).await.unwrap().len(), 1);
        assert!(b.engine.appointments_for_day(member, date).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        let _tenant = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
        assert_eq!(tm.tenant_count(), 1);
    }

    #[tokio::test]
    async fn tenant_same_instance_returned() {
        let dir = test_data_dir("same_tenant");
        let tm = manager(dir);

        let t1 = tm.get_or_create("foo").unwrap();
        let t2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&t1, &t2));
        assert!(Arc::ptr_eq(&t1.engine, &t2.engine));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _tenant = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        // Nothing left after sanitizing.
        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn names_that_sanitise_alike_share_a_tenant() {
        let dir = test_data_dir("sanitise_alike");
        let tm = manager(dir.clone());

        let dotted = tm.get_or_create("a.b").unwrap();
        let plain = tm.get_or_create("ab").unwrap();
        assert!(Arc::ptr_eq(&dotted, &plain));
        assert_eq!(tm.tenant_count(), 1);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = manager(dir);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_name_at_limit() {
        let dir = test_data_dir("name_at_limit");
        let tm = manager(dir);

        let name = "x".repeat(MAX_TENANT_NAME_LEN);
        assert!(tm.get_or_create(&name).is_ok());
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = manager(dir).with_max_tenants(8);

        for i in 0..8 {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
        // Already-open tenants stay reachable at the cap.
        assert!(tm.get_or_create("t0").is_ok());
    }
}

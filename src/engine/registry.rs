use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::Predicate;
use crate::engine::Persistence;
use crate::{AccessMode, EntityRecord, EntityStore, Error, Principal, Result};

/// One model's records plus its id allocation counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub next_id: i64,
    #[serde(default)]
    pub records: BTreeMap<i64, EntityRecord>,
}

impl Collection {
    fn allocate_id(&mut self) -> i64 {
        if self.next_id <= 0 {
            // Recover the counter from data written by older versions.
            self.next_id = self.records.keys().max().map(|m| m + 1).unwrap_or(1);
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub type Collections = HashMap<String, Collection>;

/// Registration entry for one model: per-operation group restrictions plus
/// required-field constraints. `None` on a mode means any authenticated
/// principal may perform it.
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    read: Option<Vec<String>>,
    write: Option<Vec<String>>,
    create: Option<Vec<String>>,
    unlink: Option<Vec<String>>,
    required: Vec<String>,
}

impl ModelSpec {
    /// A model every authenticated principal can fully access.
    pub fn open() -> Self {
        Self::default()
    }

    /// Restricts one operation to the named groups.
    pub fn restrict(mut self, mode: AccessMode, groups: &[&str]) -> Self {
        let groups = Some(groups.iter().map(|g| g.to_string()).collect());
        match mode {
            AccessMode::Read => self.read = groups,
            AccessMode::Write => self.write = groups,
            AccessMode::Create => self.create = groups,
            AccessMode::Unlink => self.unlink = groups,
        }
        self
    }

    /// Marks a field as mandatory on create.
    pub fn require(mut self, field: &str) -> Self {
        self.required.push(field.to_string());
        self
    }

    fn allows(&self, principal: &Principal, mode: AccessMode) -> bool {
        let groups = match mode {
            AccessMode::Read => &self.read,
            AccessMode::Write => &self.write,
            AccessMode::Create => &self.create,
            AccessMode::Unlink => &self.unlink,
        };
        match groups {
            None => true,
            Some(allowed) => allowed.iter().any(|g| principal.is_member(g)),
        }
    }
}

/// In-memory entity store with optional per-model JSON persistence.
///
/// The model set is fixed at construction; record data is guarded by a
/// single `RwLock` and flushed to disk asynchronously after each mutation.
pub struct MemRegistry {
    data: RwLock<Collections>,
    specs: HashMap<String, ModelSpec>,
    persistence: Option<Arc<Persistence>>,
    pending_tasks: Arc<AtomicUsize>,
}

impl MemRegistry {
    pub fn new(
        initial_data: Collections,
        specs: HashMap<String, ModelSpec>,
        persistence: Option<Arc<Persistence>>,
    ) -> Self {
        Self {
            data: RwLock::new(initial_data),
            specs,
            persistence,
            pending_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Blocks until all pending disk writes have completed.
    pub async fn wait(&self) {
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    fn copy_collection(&self, model: &str) -> Option<Collection> {
        let data = self.data.read().unwrap();
        data.get(model).cloned()
    }

    async fn persist(&self, model: String) {
        if let Some(p) = &self.persistence {
            if let Some(collection) = self.copy_collection(&model) {
                let p = p.clone();
                let pending = self.pending_tasks.clone();
                pending.fetch_add(1, Ordering::SeqCst);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = p.save_model(&model, &collection) {
                        log::error!("Failed to persist model {}: {}", model, e);
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }

    fn check(&self, principal: &Principal, model: &str, mode: AccessMode) -> Result<&ModelSpec> {
        let spec = self
            .specs
            .get(model)
            .ok_or_else(|| Error::NotFound(format!("model '{}' is not registered", model)))?;
        if !spec.allows(principal, mode) {
            log::warn!(
                "principal '{}' denied {} access on {}",
                principal.login,
                mode,
                model
            );
            return Err(Error::Forbidden);
        }
        Ok(spec)
    }
}

fn record_not_found(model: &str, id: i64) -> Error {
    Error::NotFound(format!("record {} not found in model '{}'", id, model))
}

fn field_is_set(values: &EntityRecord, field: &str) -> bool {
    match values.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

#[async_trait]
impl EntityStore for MemRegistry {
    async fn has_model(&self, model: &str) -> bool {
        self.specs.contains_key(model)
    }

    async fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.keys().cloned().collect();
        names.sort();
        names
    }

    async fn search(
        &self,
        principal: &Principal,
        model: &str,
        predicate: &Predicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EntityRecord>> {
        self.check(principal, model, AccessMode::Read)?;
        let data = self.data.read().unwrap();
        let Some(collection) = data.get(model) else {
            return Ok(Vec::new());
        };
        Ok(collection
            .records
            .values()
            .filter(|r| predicate.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_count(
        &self,
        principal: &Principal,
        model: &str,
        predicate: &Predicate,
    ) -> Result<usize> {
        self.check(principal, model, AccessMode::Read)?;
        let data = self.data.read().unwrap();
        let Some(collection) = data.get(model) else {
            return Ok(0);
        };
        Ok(collection
            .records
            .values()
            .filter(|r| predicate.matches(r))
            .count())
    }

    async fn read(&self, principal: &Principal, model: &str, id: i64) -> Result<EntityRecord> {
        self.check(principal, model, AccessMode::Read)?;
        let data = self.data.read().unwrap();
        data.get(model)
            .and_then(|c| c.records.get(&id))
            .cloned()
            .ok_or_else(|| record_not_found(model, id))
    }

    async fn create(
        &self,
        principal: &Principal,
        model: &str,
        mut values: EntityRecord,
    ) -> Result<EntityRecord> {
        let spec = self.check(principal, model, AccessMode::Create)?;
        for field in &spec.required {
            if !field_is_set(&values, field) {
                return Err(Error::Validation(format!(
                    "{} is required on {}",
                    field, model
                )));
            }
        }
        // Ids are store-assigned, never client-supplied.
        values.remove("id");
        let record = {
            let mut data = self.data.write().unwrap();
            let collection = data.entry(model.to_string()).or_default();
            let id = collection.allocate_id();
            values.insert("id".to_string(), json!(id));
            collection.records.insert(id, values.clone());
            values
        };
        self.persist(model.to_string()).await;
        Ok(record)
    }

    async fn write(
        &self,
        principal: &Principal,
        model: &str,
        id: i64,
        mut values: EntityRecord,
    ) -> Result<EntityRecord> {
        self.check(principal, model, AccessMode::Write)?;
        values.remove("id");
        let record = {
            let mut data = self.data.write().unwrap();
            let record = data
                .get_mut(model)
                .and_then(|c| c.records.get_mut(&id))
                .ok_or_else(|| record_not_found(model, id))?;
            for (field, value) in values {
                record.insert(field, value);
            }
            record.clone()
        };
        self.persist(model.to_string()).await;
        Ok(record)
    }

    async fn unlink(&self, principal: &Principal, model: &str, id: i64) -> Result<()> {
        self.check(principal, model, AccessMode::Unlink)?;
        {
            let mut data = self.data.write().unwrap();
            data.get_mut(model)
                .and_then(|c| c.records.remove(&id))
                .ok_or_else(|| record_not_found(model, id))?;
        }
        self.persist(model.to_string()).await;
        Ok(())
    }
}

/// The model set the daemon registers out of the box.
pub fn default_models() -> HashMap<String, ModelSpec> {
    HashMap::from([
        ("hr.employee".to_string(), ModelSpec::open().require("name")),
        ("hr.department".to_string(), ModelSpec::open().require("name")),
        ("crm.lead".to_string(), ModelSpec::open().require("name")),
        ("res.partner".to_string(), ModelSpec::open().require("name")),
    ])
}

/// A small demo dataset for first runs without existing data on disk.
pub fn demo_data() -> Collections {
    let mut collections = Collections::new();
    let employees = [
        json!({"name": "Anna Keller", "job_title": "Accountant", "work_email": "anna@example.com", "active": true}),
        json!({"name": "Bruno Ortiz", "job_title": "Sales Manager", "work_email": "bruno@example.com", "active": true}),
        json!({"name": "Carla Meyer", "job_title": "Developer", "work_email": "carla@example.com", "active": false}),
    ];
    let leads = [
        json!({"name": "Website redesign", "partner_name": "Acme Corp", "expected_revenue": 12000.0}),
        json!({"name": "ERP rollout", "partner_name": "Globex", "expected_revenue": 48000.0}),
    ];
    for (model, rows) in [("hr.employee", &employees[..]), ("crm.lead", &leads[..])] {
        let collection: &mut Collection = collections.entry(model.to_string()).or_default();
        for row in rows {
            let id = collection.allocate_id();
            let mut record = row.as_object().cloned().unwrap_or_default();
            record.insert("id".to_string(), json!(id));
            collection.records.insert(id, record);
        }
    }
    collections
}

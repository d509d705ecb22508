use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::domain::{compile_domain, search_predicate, Predicate};
use crate::{
    DeleteReceipt, EntityRecord, Error, ListQuery, Page, Result, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

/// Mock-mode configuration, injected at client construction.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Artificial latency awaited before every simulated call.
    pub latency: Duration,
    /// Probability in `[0, 1]` that a call fails with a transient error.
    pub failure_rate: f64,
    /// Number of synthetic records per model.
    pub dataset_size: usize,
    /// Seed for the failure-injection RNG, so runs are reproducible.
    pub seed: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(100),
            failure_rate: 0.0,
            dataset_size: 40,
            seed: 42,
        }
    }
}

impl MockConfig {
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn dataset_size(mut self, size: usize) -> Self {
        self.dataset_size = size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Deterministic stand-in for the real gateway.
///
/// Responses carry exactly the shapes the gateway produces, and domains go
/// through the same compiler, so callers cannot tell the modes apart by
/// contract. No network I/O ever happens here.
pub struct MockBackend {
    config: MockConfig,
    rng: Mutex<StdRng>,
    next_id: AtomicI64,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(config.seed));
        let next_id = AtomicI64::new(config.dataset_size as i64 + 1);
        Self {
            config,
            rng,
            next_id,
        }
    }

    async fn simulate(&self) -> Result<()> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if self.config.failure_rate > 0.0 {
            let roll: f64 = self.rng.lock().unwrap().random();
            if roll < self.config.failure_rate {
                return Err(Error::Transient("simulated backend failure".to_string()));
            }
        }
        Ok(())
    }

    fn synth_record(&self, model: &str, id: i64) -> EntityRecord {
        let label = format!("{} {:03}", title(model), id);
        let mut record = EntityRecord::new();
        record.insert("id".to_string(), json!(id));
        record.insert("name".to_string(), json!(label));
        record.insert("display_name".to_string(), json!(label));
        record.insert("active".to_string(), json!(true));
        record
    }

    fn in_dataset(&self, id: i64) -> bool {
        id >= 1 && id <= self.config.dataset_size as i64
    }

    pub async fn list(&self, model: &str, query: &ListQuery) -> Result<Page<EntityRecord>> {
        self.simulate().await?;

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit > MAX_PAGE_SIZE {
            return Err(Error::BadRequest(format!(
                "limit must not exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        let offset = query.offset.unwrap_or(0);

        let mut parts = Vec::new();
        if let Some(tokens) = &query.domain {
            parts.push(compile_domain(tokens)?);
        }
        if let Some(text) = query.search.as_deref() {
            let text = text.trim();
            if !text.is_empty() {
                parts.push(search_predicate(text));
            }
        }
        let predicate = Predicate::all(parts);

        let matches: Vec<EntityRecord> = (1..=self.config.dataset_size as i64)
            .map(|id| self.synth_record(model, id))
            .filter(|r| predicate.matches(r))
            .collect();
        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| maybe_project(r, query.fields.as_deref()))
            .collect();

        Ok(Page {
            items,
            total,
            limit,
            offset,
            model: model.to_string(),
        })
    }

    pub async fn get(
        &self,
        model: &str,
        id: i64,
        fields: Option<&[String]>,
    ) -> Result<EntityRecord> {
        self.simulate().await?;
        if !self.in_dataset(id) {
            return Err(record_not_found(model, id));
        }
        Ok(maybe_project(self.synth_record(model, id), fields))
    }

    pub async fn create(&self, _model: &str, mut values: EntityRecord) -> Result<EntityRecord> {
        self.simulate().await?;
        values.remove("id");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        values.insert("id".to_string(), json!(id));
        Ok(values)
    }

    pub async fn update(&self, model: &str, id: i64, mut values: EntityRecord) -> Result<EntityRecord> {
        self.simulate().await?;
        if !self.in_dataset(id) {
            return Err(record_not_found(model, id));
        }
        values.remove("id");
        let mut record = self.synth_record(model, id);
        for (field, value) in values {
            record.insert(field, value);
        }
        Ok(record)
    }

    pub async fn delete(&self, model: &str, id: i64) -> Result<DeleteReceipt> {
        self.simulate().await?;
        if !self.in_dataset(id) {
            return Err(record_not_found(model, id));
        }
        Ok(DeleteReceipt {
            deleted_id: id,
            message: "Record deleted successfully".to_string(),
        })
    }

    pub async fn models(&self) -> Result<Vec<String>> {
        self.simulate().await?;
        Ok(vec![
            "crm.lead".to_string(),
            "hr.employee".to_string(),
            "res.partner".to_string(),
        ])
    }
}

fn record_not_found(model: &str, id: i64) -> Error {
    Error::NotFound(format!("record {} not found in model '{}'", id, model))
}

fn title(model: &str) -> String {
    let tail = model.rsplit('.').next().unwrap_or(model);
    let mut chars = tail.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn maybe_project(record: EntityRecord, fields: Option<&[String]>) -> EntityRecord {
    match fields {
        Some(fields) => record
            .into_iter()
            .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
            .collect(),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MockBackend {
        MockBackend::new(MockConfig::default().latency(Duration::ZERO))
    }

    #[tokio::test]
    async fn test_list_is_deterministic() {
        let mock = backend();
        let query = ListQuery::default().limit(5);
        let first = mock.list("hr.employee", &query).await.unwrap();
        let second = mock.list("hr.employee", &query).await.unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total, 40);
    }

    #[tokio::test]
    async fn test_window_invariants_hold() {
        let mock = backend();
        let page = mock
            .list("crm.lead", &ListQuery::default().limit(7).offset(38))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 40);
        assert!(page.items.len() <= page.limit);
    }

    #[tokio::test]
    async fn test_domain_goes_through_the_real_compiler() {
        let mock = backend();
        let bad = ListQuery::default().domain(vec![json!(["id", "child_of", 1])]);
        assert!(matches!(
            mock.list("hr.employee", &bad).await,
            Err(Error::BadRequest(_))
        ));

        let good = ListQuery::default().domain(vec![json!(["id", "<=", 3])]);
        let page = mock.list("hr.employee", &good).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_search_filters_synthetic_names() {
        let mock = backend();
        let page = mock
            .list("hr.employee", &ListQuery::default().search("004"))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].get("id").unwrap(), &json!(4));
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_fails() {
        let mock = MockBackend::new(
            MockConfig::default()
                .latency(Duration::ZERO)
                .failure_rate(1.0),
        );
        let err = mock
            .list("hr.employee", &ListQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_get_out_of_range_is_not_found() {
        let mock = backend();
        assert!(mock.get("hr.employee", 40, None).await.is_ok());
        assert!(matches!(
            mock.get("hr.employee", 41, None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_assigns_ids_past_the_dataset() {
        let mock = backend();
        let mut values = EntityRecord::new();
        values.insert("name".to_string(), json!("Ann"));
        let created = mock.create("hr.employee", values).await.unwrap();
        assert_eq!(created.get("id").unwrap(), &json!(41));
        assert_eq!(created.get("name").unwrap(), &json!("Ann"));
    }

    #[test]
    fn test_title_uses_last_model_segment() {
        assert_eq!(title("hr.employee"), "Employee");
        assert_eq!(title("lead"), "Lead");
    }
}

use crate::error::Result;
use crate::metrics::{CACHE_LOOKUPS_TOTAL, STORAGE_OPERATIONS_TOTAL, STORAGE_OPERATION_DURATION_SECONDS};
use crate::models::{Incident, Lesson, Solution};
use crate::state::{AppCache, CacheStats, IncidentFilter, KnowledgeStore, Page};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
enum CachedValue {
    Incident(Option<Incident>),
    Incidents(Page<Incident>),
    Solution(Option<Solution>),
    Solutions(Vec<Solution>),
    Lessons(Vec<Lesson>),
}

/// Read-through TTL cache in front of another store.
///
/// Reads are keyed by their stringified query parameters. Any write clears the
/// whole cache, so readers never observe a result older than their own writes.
///
/// A read that overlaps a write is returned to its caller but not cached:
/// `generation` is bumped on both sides of every write, and a fill only lands
/// when the generation seen before the backend read is still current.
pub struct CachedStore {
    inner: Arc<dyn KnowledgeStore>,
    cache: AppCache<String, CachedValue>,
    generation: AtomicU64,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn KnowledgeStore>, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: AppCache::new(max_capacity, ttl),
            generation: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn lookup(&self, key: &String) -> Option<CachedValue> {
        let value = self.cache.get(key).await;
        let result = if value.is_some() { "hit" } else { "miss" };
        CACHE_LOOKUPS_TOTAL
            .with_label_values(&["store", result])
            .inc();
        value
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache `value` unless a write started since `seen` was read
    async fn fill(&self, key: String, value: CachedValue, seen: u64) {
        if self.generation() != seen {
            return;
        }
        self.cache.insert(key.clone(), value).await;
        // A write may have begun between the check and the insert
        if self.generation() != seen {
            self.cache.invalidate(&key).await;
        }
    }

    /// Time a backend call and record it under `operation`
    async fn observe<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let backend = self.inner.backend_name();
        let start = Instant::now();
        let result = fut.await;
        STORAGE_OPERATIONS_TOTAL
            .with_label_values(&[operation, backend])
            .inc();
        STORAGE_OPERATION_DURATION_SECONDS
            .with_label_values(&[operation, backend])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    async fn write<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let result = self.observe(operation, fut).await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all().await;
        result
    }
}

#[async_trait]
impl KnowledgeStore for CachedStore {
    async fn create_incident(&self, incident: &Incident) -> Result<Incident> {
        self.write("create_incident", self.inner.create_incident(incident))
            .await
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let key = format!("incident:{}", id);
        if let Some(CachedValue::Incident(hit)) = self.lookup(&key).await {
            return Ok(hit);
        }

        let seen = self.generation();
        let value = self
            .observe("get_incident", self.inner.get_incident(id))
            .await?;
        self.fill(key, CachedValue::Incident(value.clone()), seen)
            .await;
        Ok(value)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<Incident> {
        self.write("update_incident", self.inner.update_incident(incident))
            .await
    }

    async fn delete_incident(&self, id: &str) -> Result<()> {
        self.write("delete_incident", self.inner.delete_incident(id))
            .await
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>> {
        let key = format!("incidents:{}:{}:{}", filter.cache_key(), page, per_page);
        if let Some(CachedValue::Incidents(hit)) = self.lookup(&key).await {
            return Ok(hit);
        }

        let seen = self.generation();
        let value = self
            .observe(
                "list_incidents",
                self.inner.list_incidents(filter, page, per_page),
            )
            .await?;
        self.fill(key, CachedValue::Incidents(value.clone()), seen)
            .await;
        Ok(value)
    }

    async fn create_solution(&self, solution: &Solution) -> Result<Solution> {
        self.write("create_solution", self.inner.create_solution(solution))
            .await
    }

    async fn get_solution(&self, id: &str) -> Result<Option<Solution>> {
        let key = format!("solution:{}", id);
        if let Some(CachedValue::Solution(hit)) = self.lookup(&key).await {
            return Ok(hit);
        }

        let seen = self.generation();
        let value = self
            .observe("get_solution", self.inner.get_solution(id))
            .await?;
        self.fill(key, CachedValue::Solution(value.clone()), seen)
            .await;
        Ok(value)
    }

    async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>> {
        let key = format!("solutions:{}", incident_id);
        if let Some(CachedValue::Solutions(hit)) = self.lookup(&key).await {
            return Ok(hit);
        }

        let seen = self.generation();
        let value = self
            .observe("list_solutions", self.inner.list_solutions(incident_id))
            .await?;
        self.fill(key, CachedValue::Solutions(value.clone()), seen)
            .await;
        Ok(value)
    }

    async fn update_solution(&self, solution: &Solution) -> Result<Solution> {
        self.write("update_solution", self.inner.update_solution(solution))
            .await
    }

    async fn delete_solution(&self, id: &str) -> Result<()> {
        self.write("delete_solution", self.inner.delete_solution(id))
            .await
    }

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        self.write("create_lesson", self.inner.create_lesson(lesson))
            .await
    }

    async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>> {
        let key = format!("lessons:{}", incident_id.unwrap_or("*"));
        if let Some(CachedValue::Lessons(hit)) = self.lookup(&key).await {
            return Ok(hit);
        }

        let seen = self.generation();
        let value = self
            .observe("list_lessons", self.inner.list_lessons(incident_id))
            .await?;
        self.fill(key, CachedValue::Lessons(value.clone()), seen)
            .await;
        Ok(value)
    }

    async fn delete_lesson(&self, id: &str) -> Result<()> {
        self.write("delete_lesson", self.inner.delete_lesson(id))
            .await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

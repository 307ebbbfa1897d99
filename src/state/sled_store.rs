use crate::error::{AppError, Result};
use crate::models::{Incident, Lesson, Solution};
use crate::pocketbase::collections;
use crate::state::{IncidentFilter, KnowledgeStore, Page};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Persistent knowledge store using the Sled embedded database.
///
/// Solutions and lessons are indexed by owning incident under
/// `{incident_id}/{record_id}` keys so per-incident listings are prefix scans.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    incidents_tree: sled::Tree,
    solutions_tree: sled::Tree,
    lessons_tree: sled::Tree,
    solution_index: sled::Tree,
    lesson_index: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let open = |name: &str| {
            db.open_tree(name).map_err(|e| {
                AppError::Database(format!("Failed to open {} tree: {}", name, e))
            })
        };

        let incidents_tree = open(collections::INCIDENTS)?;
        let solutions_tree = open(collections::SOLUTIONS)?;
        let lessons_tree = open(collections::LESSONS)?;
        let solution_index = open("solutions_by_incident")?;
        let lesson_index = open("lessons_by_incident")?;

        tracing::info!(path = ?path.as_ref(), "Initialized Sled store");

        Ok(Self {
            db: Arc::new(db),
            incidents_tree,
            solutions_tree,
            lessons_tree,
            solution_index,
            lesson_index,
        })
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| AppError::Serialization(format!("Failed to encode record: {}", e)))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes)
            .map_err(|e| AppError::Serialization(format!("Failed to decode record: {}", e)))
    }

    fn index_key(incident_id: &str, record_id: &str) -> Vec<u8> {
        format!("{}/{}", incident_id, record_id).into_bytes()
    }

    fn index_prefix(incident_id: &str) -> Vec<u8> {
        format!("{}/", incident_id).into_bytes()
    }

    fn get<T: DeserializeOwned>(tree: &sled::Tree, id: &str) -> Result<Option<T>> {
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record ids referenced from an incident index
    fn indexed_ids(index: &sled::Tree, incident_id: &str) -> Result<Vec<String>> {
        let prefix = Self::index_prefix(incident_id);
        let mut ids = Vec::new();
        for entry in index.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            ids.push(id);
        }
        Ok(ids)
    }

    fn load_indexed<T: DeserializeOwned>(
        tree: &sled::Tree,
        index: &sled::Tree,
        incident_id: &str,
    ) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for id in Self::indexed_ids(index, incident_id)? {
            if let Some(record) = Self::get(tree, &id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn require_incident(&self, incident_id: &str) -> Result<()> {
        if self.incidents_tree.contains_key(incident_id.as_bytes())? {
            Ok(())
        } else {
            Err(AppError::not_found(collections::INCIDENTS, incident_id))
        }
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Database(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

#[async_trait]
impl KnowledgeStore for SledStore {
    async fn create_incident(&self, incident: &Incident) -> Result<Incident> {
        let value = Self::encode(incident)?;
        let inserted = self
            .incidents_tree
            .compare_and_swap(incident.id.as_bytes(), None as Option<&[u8]>, Some(value))?;

        if inserted.is_err() {
            return Err(AppError::Validation(format!(
                "Incident {} already exists",
                incident.id
            )));
        }

        self.incidents_tree.flush_async().await?;
        tracing::debug!(incident_id = %incident.id, "Incident saved to Sled");
        Ok(incident.clone())
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        Self::get(&self.incidents_tree, id)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<Incident> {
        self.require_incident(&incident.id)?;

        self.incidents_tree
            .insert(incident.id.as_bytes(), Self::encode(incident)?)?;
        self.incidents_tree.flush_async().await?;

        tracing::debug!(incident_id = %incident.id, "Incident updated in Sled");
        Ok(incident.clone())
    }

    async fn delete_incident(&self, id: &str) -> Result<()> {
        if self.incidents_tree.remove(id.as_bytes())?.is_none() {
            return Err(AppError::not_found(collections::INCIDENTS, id));
        }

        for solution_id in Self::indexed_ids(&self.solution_index, id)? {
            self.solutions_tree.remove(solution_id.as_bytes())?;
            self.solution_index
                .remove(Self::index_key(id, &solution_id))?;
        }
        for lesson_id in Self::indexed_ids(&self.lesson_index, id)? {
            self.lessons_tree.remove(lesson_id.as_bytes())?;
            self.lesson_index.remove(Self::index_key(id, &lesson_id))?;
        }

        self.db.flush_async().await?;
        tracing::debug!(incident_id = %id, "Incident deleted from Sled");
        Ok(())
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>> {
        let mut incidents = Vec::new();

        for result in self.incidents_tree.iter() {
            let (_, value) = result?;
            let incident: Incident = Self::decode(&value)?;
            if filter.matches(&incident) {
                incidents.push(incident);
            }
        }

        filter.sort.sort(&mut incidents);
        Ok(Page::paginate(incidents, page, per_page))
    }

    async fn create_solution(&self, solution: &Solution) -> Result<Solution> {
        self.require_incident(&solution.incident_id)?;

        self.solutions_tree
            .insert(solution.id.as_bytes(), Self::encode(solution)?)?;
        self.solution_index
            .insert(Self::index_key(&solution.incident_id, &solution.id), Vec::<u8>::new())?;
        self.db.flush_async().await?;

        tracing::debug!(solution_id = %solution.id, incident_id = %solution.incident_id, "Solution saved to Sled");
        Ok(solution.clone())
    }

    async fn get_solution(&self, id: &str) -> Result<Option<Solution>> {
        Self::get(&self.solutions_tree, id)
    }

    async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>> {
        let mut solutions: Vec<Solution> =
            Self::load_indexed(&self.solutions_tree, &self.solution_index, incident_id)?;
        solutions.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(solutions)
    }

    async fn update_solution(&self, solution: &Solution) -> Result<Solution> {
        if !self.solutions_tree.contains_key(solution.id.as_bytes())? {
            return Err(AppError::not_found(collections::SOLUTIONS, &solution.id));
        }

        self.solutions_tree
            .insert(solution.id.as_bytes(), Self::encode(solution)?)?;
        self.solutions_tree.flush_async().await?;
        Ok(solution.clone())
    }

    async fn delete_solution(&self, id: &str) -> Result<()> {
        let Some(bytes) = self.solutions_tree.remove(id.as_bytes())? else {
            return Err(AppError::not_found(collections::SOLUTIONS, id));
        };
        let solution: Solution = Self::decode(&bytes)?;
        self.solution_index
            .remove(Self::index_key(&solution.incident_id, id))?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        self.require_incident(&lesson.incident_id)?;

        self.lessons_tree
            .insert(lesson.id.as_bytes(), Self::encode(lesson)?)?;
        self.lesson_index
            .insert(Self::index_key(&lesson.incident_id, &lesson.id), Vec::<u8>::new())?;
        self.db.flush_async().await?;
        Ok(lesson.clone())
    }

    async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = match incident_id {
            Some(id) => Self::load_indexed(&self.lessons_tree, &self.lesson_index, id)?,
            None => {
                let mut all = Vec::new();
                for result in self.lessons_tree.iter() {
                    let (_, value) = result?;
                    all.push(Self::decode(&value)?);
                }
                all
            }
        };
        lessons.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(lessons)
    }

    async fn delete_lesson(&self, id: &str) -> Result<()> {
        let Some(bytes) = self.lessons_tree.remove(id.as_bytes())? else {
            return Err(AppError::not_found(collections::LESSONS, id));
        };
        let lesson: Lesson = Self::decode(&bytes)?;
        self.lesson_index
            .remove(Self::index_key(&lesson.incident_id, id))?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.size_on_disk().map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

//! SQLite-backed remediation store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CandidateResource, InsertOutcome, RemediationStore};
use crate::error::{RemediationError, Result};
use crate::rules::{NewRule, Rule, RuleAction, RuleCondition, RuleId, TriggerType};
use crate::types::{
    Concept, ConceptId, ConceptLink, ConceptUpdate, DifficultyTier, InteractionKind, LinkParent, NewConcept,
    NewInteraction, NewResource, Recommendation, RecommendationId, RecommendationWithResource, Resource,
    ResourceFilter, ResourceId, ResourceInteraction, ResourceKind, ResourceUpdate, StudentId, TaskId,
};

const CONCEPT_COLUMNS: &str = "id, name, description, category, tier, created_at";
const RESOURCE_COLUMNS: &str =
    "r.id, r.title, r.kind, r.url, r.file_ref, r.description, r.author, r.duration_minutes, r.tier, r.active, r.created_at";
const RECOMMENDATION_COLUMNS: &str = "id, student_id, task_id, resource_id, created_at, viewed, viewed_at";
const JOINED_RECOMMENDATION_COLUMNS: &str =
    "rec.id, rec.student_id, rec.task_id, rec.resource_id, rec.created_at, rec.viewed, rec.viewed_at";
const RULE_COLUMNS: &str = "id, name, trigger_type, condition_json, actions_json, active, created_at";
const INTERACTION_COLUMNS: &str =
    "id, student_id, resource_id, kind, rating, seconds_watched, improved_grade, created_at";

/// SQLite remediation store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RemediationError::PersistenceFailure(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;

        debug!("Opened remediation store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Ephemeral store, mainly for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                category TEXT,
                tier TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                kind TEXT NOT NULL,
                url TEXT,
                file_ref TEXT,
                description TEXT,
                author TEXT,
                duration_minutes INTEGER,
                tier TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            -- Tasks live in the course CRUD layer; only their ids are referenced here
            CREATE TABLE IF NOT EXISTS task_concepts (
                task_id INTEGER NOT NULL,
                concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                weight REAL NOT NULL DEFAULT 1.0,
                PRIMARY KEY (task_id, concept_id)
            );

            CREATE TABLE IF NOT EXISTS resource_concepts (
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                weight REAL NOT NULL DEFAULT 1.0,
                PRIMARY KEY (resource_id, concept_id)
            );

            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                viewed INTEGER NOT NULL DEFAULT 0,
                viewed_at TEXT,
                UNIQUE (student_id, task_id, resource_id)
            );

            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                trigger_type TEXT NOT NULL,
                condition_json TEXT,
                actions_json TEXT NOT NULL DEFAULT '[]',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resource_interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                rating INTEGER,
                seconds_watched INTEGER,
                improved_grade INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_resource_concepts_concept ON resource_concepts(concept_id);
            CREATE INDEX IF NOT EXISTS idx_recommendations_student ON recommendations(student_id, viewed);
            CREATE INDEX IF NOT EXISTS idx_recommendations_task ON recommendations(task_id);
            CREATE INDEX IF NOT EXISTS idx_rules_trigger ON rules(trigger_type, active);
            CREATE INDEX IF NOT EXISTS idx_interactions_resource ON resource_interactions(resource_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_student ON resource_interactions(student_id);
        "#,
        )?;

        Ok(())
    }

    fn fetch_concept(conn: &Connection, id: ConceptId) -> Result<Option<Concept>> {
        let sql = format!("SELECT {} FROM concepts WHERE id = ?1", CONCEPT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_concept).optional()?)
    }

    fn fetch_resource(conn: &Connection, id: ResourceId) -> Result<Option<Resource>> {
        let sql = format!("SELECT {} FROM resources r WHERE r.id = ?1", RESOURCE_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_resource).optional()?)
    }

    fn fetch_recommendation(conn: &Connection, id: RecommendationId) -> Result<Option<Recommendation>> {
        let sql = format!("SELECT {} FROM recommendations WHERE id = ?1", RECOMMENDATION_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_recommendation).optional()?)
    }

    fn fetch_rule(conn: &Connection, id: RuleId) -> Result<Option<Rule>> {
        let sql = format!("SELECT {} FROM rules WHERE id = ?1", RULE_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_rule).optional()?)
    }

    fn write_resource(conn: &Connection, id: ResourceId, r: &Resource) -> Result<()> {
        conn.execute(
            r#"UPDATE resources SET title = ?2, kind = ?3, url = ?4, file_ref = ?5, description = ?6,
               author = ?7, duration_minutes = ?8, tier = ?9, active = ?10 WHERE id = ?1"#,
            params![
                id,
                r.title,
                r.kind.as_str(),
                r.url,
                r.file_ref,
                r.description,
                r.author,
                r.duration_minutes,
                r.tier.map(|t| t.as_str()),
                r.active,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RemediationStore for SqliteStore {
    async fn create_concept(&self, concept: &NewConcept) -> Result<Concept> {
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO concepts (name, description, category, tier, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                concept.name,
                concept.description,
                concept.category,
                concept.tier.map(|t| t.as_str()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| unique_conflict(e, format!("concept '{}' already exists", concept.name)))?;

        let id = conn.last_insert_rowid();
        Self::fetch_concept(&conn, id)?.ok_or_else(|| RemediationError::not_found("concept", id))
    }

    async fn get_concept(&self, id: ConceptId) -> Result<Option<Concept>> {
        let conn = self.conn.lock().await;
        Self::fetch_concept(&conn, id)
    }

    async fn list_concepts(&self, category: Option<String>) -> Result<Vec<Concept>> {
        let conn = self.conn.lock().await;

        let concepts = match category {
            Some(category) => {
                let sql = format!("SELECT {} FROM concepts WHERE category = ?1 ORDER BY name", CONCEPT_COLUMNS);
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![category], row_to_concept)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM concepts ORDER BY name", CONCEPT_COLUMNS);
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map([], row_to_concept)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        Ok(concepts)
    }

    async fn update_concept(&self, id: ConceptId, update: &ConceptUpdate) -> Result<Option<Concept>> {
        let conn = self.conn.lock().await;

        let Some(mut concept) = Self::fetch_concept(&conn, id)? else {
            return Ok(None);
        };
        update.apply_to(&mut concept);

        conn.execute(
            "UPDATE concepts SET name = ?2, description = ?3, category = ?4, tier = ?5 WHERE id = ?1",
            params![
                id,
                concept.name,
                concept.description,
                concept.category,
                concept.tier.map(|t| t.as_str()),
            ],
        )
        .map_err(|e| unique_conflict(e, format!("concept '{}' already exists", concept.name)))?;

        Self::fetch_concept(&conn, id)
    }

    async fn delete_concept(&self, id: ConceptId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM concepts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn create_resource(&self, resource: &NewResource) -> Result<Resource> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"INSERT INTO resources
               (title, kind, url, file_ref, description, author, duration_minutes, tier, active, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                resource.title,
                resource.kind.as_str(),
                resource.url,
                resource.file_ref,
                resource.description,
                resource.author,
                resource.duration_minutes,
                resource.tier.map(|t| t.as_str()),
                resource.active,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::fetch_resource(&conn, id)?.ok_or_else(|| RemediationError::not_found("resource", id))
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        let conn = self.conn.lock().await;
        Self::fetch_resource(&conn, id)
    }

    async fn update_resource(&self, id: ResourceId, update: &ResourceUpdate) -> Result<Option<Resource>> {
        let conn = self.conn.lock().await;

        let Some(mut resource) = Self::fetch_resource(&conn, id)? else {
            return Ok(None);
        };
        update.apply_to(&mut resource);

        Self::write_resource(&conn, id, &resource)?;
        Self::fetch_resource(&conn, id)
    }

    async fn toggle_resource_active(&self, id: ResourceId) -> Result<Option<Resource>> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE resources SET active = 1 - active WHERE id = ?1", params![id])?;
        Self::fetch_resource(&conn, id)
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM resources WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        let conn = self.conn.lock().await;

        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if !filter.include_inactive {
            clauses.push("r.active = 1".to_string());
        }
        if let Some(kind) = filter.kind {
            values.push(Value::Text(kind.as_str().to_string()));
            clauses.push(format!("r.kind = ?{}", values.len()));
        }
        if let Some(tier) = filter.tier {
            values.push(Value::Text(tier.as_str().to_string()));
            clauses.push(format!("r.tier = ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        values.push(Value::Integer(limit));
        values.push(Value::Integer(filter.offset as i64));

        let sql = format!(
            "SELECT {} FROM resources r {} ORDER BY r.id LIMIT ?{} OFFSET ?{}",
            RESOURCE_COLUMNS,
            where_sql,
            values.len() - 1,
            values.len()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_resource)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn resources_by_categories(&self, categories: &[String], include_inactive: bool) -> Result<Vec<Resource>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT DISTINCT {} FROM resources r
               JOIN resource_concepts rc ON rc.resource_id = r.id
               JOIN concepts c ON c.id = rc.concept_id
               WHERE c.category IN ({}) {}
               ORDER BY r.id"#,
            RESOURCE_COLUMNS,
            placeholders(categories.len()),
            if include_inactive { "" } else { "AND r.active = 1" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(categories.iter()), row_to_resource)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn replace_concept_links(&self, parent: LinkParent, links: &[ConceptLink]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        if let LinkParent::Resource(id) = parent {
            if Self::fetch_resource(&tx, id)?.is_none() {
                return Err(RemediationError::not_found("resource", id));
            }
        }
        for link in links {
            if Self::fetch_concept(&tx, link.concept_id)?.is_none() {
                return Err(RemediationError::not_found("concept", link.concept_id));
            }
        }

        let (table, column) = link_table(parent);
        tx.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, column), params![parent.id()])?;
        {
            let sql = format!(
                "INSERT INTO {table} ({column}, concept_id, weight) VALUES (?1, ?2, ?3)
                 ON CONFLICT({column}, concept_id) DO UPDATE SET weight = excluded.weight",
                table = table,
                column = column
            );
            let mut stmt = tx.prepare(&sql)?;
            for link in links {
                stmt.execute(params![parent.id(), link.concept_id, link.weight])?;
            }
        }
        tx.commit()?;

        debug!("Replaced concept links of {} ({} links)", parent, links.len());
        Ok(())
    }

    async fn concept_links(&self, parent: LinkParent) -> Result<Vec<ConceptLink>> {
        let conn = self.conn.lock().await;
        let (table, column) = link_table(parent);
        let sql = format!("SELECT concept_id, weight FROM {} WHERE {} = ?1 ORDER BY concept_id", table, column);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![parent.id()], |row| {
            Ok(ConceptLink {
                concept_id: row.get(0)?,
                weight: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn clear_concept_links(&self, parent: LinkParent) -> Result<usize> {
        let conn = self.conn.lock().await;
        let (table, column) = link_table(parent);
        let removed = conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, column), params![parent.id()])?;
        debug!("Cleared {} concept link(s) of {}", removed, parent);
        Ok(removed)
    }

    async fn active_resources_for_concepts(&self, concept_ids: &[ConceptId]) -> Result<Vec<CandidateResource>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT {}, rc.concept_id FROM resources r
               JOIN resource_concepts rc ON rc.resource_id = r.id
               WHERE r.active = 1 AND rc.concept_id IN ({})
               ORDER BY r.id, rc.concept_id"#,
            RESOURCE_COLUMNS,
            placeholders(concept_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(concept_ids.iter()), |row| {
            Ok((row_to_resource(row)?, row.get::<_, ConceptId>(11)?))
        })?;

        let mut candidates: Vec<CandidateResource> = Vec::new();
        for row in rows {
            let (resource, concept_id) = row?;
            match candidates.last_mut() {
                Some(last) if last.resource.id == resource.id => last.matched_concepts.push(concept_id),
                _ => candidates.push(CandidateResource {
                    resource,
                    matched_concepts: vec![concept_id],
                }),
            }
        }
        Ok(candidates)
    }

    async fn recommended_resource_ids(&self, student_id: StudentId, task_id: TaskId) -> Result<Vec<ResourceId>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT resource_id FROM recommendations WHERE student_id = ?1 AND task_id = ?2 ORDER BY resource_id",
        )?;
        let rows = stmt.query_map(params![student_id, task_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_recommendation(
        &self,
        student_id: StudentId,
        task_id: TaskId,
        resource_id: ResourceId,
    ) -> Result<(Recommendation, InsertOutcome)> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx
            .query_row(
                &format!(
                    r#"INSERT INTO recommendations (student_id, task_id, resource_id, created_at, viewed, viewed_at)
                       VALUES (?1, ?2, ?3, ?4, 0, NULL)
                       ON CONFLICT(student_id, task_id, resource_id) DO NOTHING
                       RETURNING {}"#,
                    RECOMMENDATION_COLUMNS
                ),
                params![student_id, task_id, resource_id, Utc::now().to_rfc3339()],
                row_to_recommendation,
            )
            .optional()?;

        let result = match inserted {
            Some(rec) => (rec, InsertOutcome::Created),
            None => {
                let existing = tx.query_row(
                    &format!(
                        "SELECT {} FROM recommendations WHERE student_id = ?1 AND task_id = ?2 AND resource_id = ?3",
                        RECOMMENDATION_COLUMNS
                    ),
                    params![student_id, task_id, resource_id],
                    row_to_recommendation,
                )?;
                (existing, InsertOutcome::DuplicateIgnored)
            }
        };
        tx.commit()?;

        Ok(result)
    }

    async fn get_recommendation(&self, id: RecommendationId) -> Result<Option<Recommendation>> {
        let conn = self.conn.lock().await;
        Self::fetch_recommendation(&conn, id)
    }

    async fn list_recommendations(&self, student_id: StudentId, unseen_only: bool) -> Result<Vec<Recommendation>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM recommendations WHERE student_id = ?1 {} ORDER BY created_at DESC, id DESC",
            RECOMMENDATION_COLUMNS,
            if unseen_only { "AND viewed = 0" } else { "" }
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![student_id], row_to_recommendation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_recommendations_with_resources(
        &self,
        student_id: StudentId,
        unseen_only: bool,
    ) -> Result<Vec<RecommendationWithResource>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            r#"SELECT {}, {} FROM recommendations rec
               JOIN resources r ON r.id = rec.resource_id
               WHERE rec.student_id = ?1 {}
               ORDER BY rec.created_at DESC, rec.id DESC"#,
            JOINED_RECOMMENDATION_COLUMNS,
            RESOURCE_COLUMNS,
            if unseen_only { "AND rec.viewed = 0" } else { "" }
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![student_id], |row| {
            Ok(RecommendationWithResource {
                recommendation: recommendation_at(row, 0)?,
                resource: resource_at(row, 7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn recommendations_for_task(&self, task_id: TaskId) -> Result<Vec<Recommendation>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM recommendations WHERE task_id = ?1 ORDER BY id", RECOMMENDATION_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![task_id], row_to_recommendation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn mark_viewed(&self, id: RecommendationId, at: DateTime<Utc>) -> Result<Option<Recommendation>> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE recommendations SET viewed = 1, viewed_at = ?2 WHERE id = ?1 AND viewed = 0",
            params![id, at.to_rfc3339()],
        )?;
        Self::fetch_recommendation(&conn, id)
    }

    async fn delete_recommendation(&self, id: RecommendationId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM recommendations WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn delete_recommendations_for_task(&self, task_id: TaskId) -> Result<usize> {
        let conn = self.conn.lock().await;
        Ok(conn.execute("DELETE FROM recommendations WHERE task_id = ?1", params![task_id])?)
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule> {
        let conn = self.conn.lock().await;
        let actions_json = serde_json::to_string(&rule.actions)?;

        conn.execute(
            r#"INSERT INTO rules (name, trigger_type, condition_json, actions_json, active, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                rule.name,
                rule.trigger.as_str(),
                rule.condition.encode(),
                actions_json,
                rule.active,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| unique_conflict(e, format!("rule '{}' already exists", rule.name)))?;

        let id = conn.last_insert_rowid();
        Self::fetch_rule(&conn, id)?.ok_or_else(|| RemediationError::not_found("rule", id))
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>> {
        let conn = self.conn.lock().await;
        Self::fetch_rule(&conn, id)
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM rules ORDER BY id", RULE_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], row_to_rule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn active_rules_for(&self, trigger: &TriggerType) -> Result<Vec<Rule>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM rules WHERE trigger_type = ?1 AND active = 1 ORDER BY id",
            RULE_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![trigger.as_str()], row_to_rule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn set_rule_active(&self, id: RuleId, active: bool) -> Result<bool> {
        let conn = self.conn.lock().await;
        let updated = conn.execute("UPDATE rules SET active = ?2 WHERE id = ?1", params![id, active])?;
        Ok(updated > 0)
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM rules WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn record_interaction(&self, interaction: &NewInteraction) -> Result<ResourceInteraction> {
        let conn = self.conn.lock().await;

        if Self::fetch_resource(&conn, interaction.resource_id)?.is_none() {
            return Err(RemediationError::not_found("resource", interaction.resource_id));
        }

        conn.execute(
            r#"INSERT INTO resource_interactions
               (student_id, resource_id, kind, rating, seconds_watched, improved_grade, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                interaction.student_id,
                interaction.resource_id,
                interaction.kind.as_str(),
                interaction.rating,
                interaction.seconds_watched,
                interaction.improved_grade,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {} FROM resource_interactions WHERE id = ?1", INTERACTION_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_interaction)?)
    }

    async fn interactions_for_resource(&self, resource_id: ResourceId) -> Result<Vec<ResourceInteraction>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM resource_interactions WHERE resource_id = ?1 ORDER BY created_at DESC, id DESC",
            INTERACTION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![resource_id], row_to_interaction)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn interactions_for_student(&self, student_id: StudentId) -> Result<Vec<ResourceInteraction>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM resource_interactions WHERE student_id = ?1 ORDER BY created_at DESC, id DESC",
            INTERACTION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![student_id], row_to_interaction)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn link_table(parent: LinkParent) -> (&'static str, &'static str) {
    match parent {
        LinkParent::Task(_) => ("task_concepts", "task_id"),
        LinkParent::Resource(_) => ("resource_concepts", "resource_id"),
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Map a UNIQUE violation to `Conflict`, anything else to a persistence failure
fn unique_conflict(err: rusqlite::Error, message: String) -> RemediationError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
            RemediationError::Conflict(message)
        }
        _ => err.into(),
    }
}

/// Stored timestamps are RFC 3339; anything else is a corrupt row
fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            conversion_error(
                column,
                Type::Text,
                RemediationError::PersistenceFailure(format!("bad timestamp '{}': {}", raw, e)),
            )
        })
}

/// Narrow a nullable integer column, rejecting values the field cannot hold
fn bounded<T: TryFrom<i64>>(column: usize, name: &str, raw: Option<i64>) -> rusqlite::Result<Option<T>> {
    raw.map(|v| {
        T::try_from(v).map_err(|_| {
            conversion_error(
                column,
                Type::Integer,
                RemediationError::PersistenceFailure(format!("{} out of range: {}", name, v)),
            )
        })
    })
    .transpose()
}

fn conversion_error(column: usize, ty: Type, err: RemediationError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

fn row_to_concept(row: &Row) -> rusqlite::Result<Concept> {
    let tier: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Concept {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        tier: tier.as_deref().and_then(DifficultyTier::parse_lenient),
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn row_to_resource(row: &Row) -> rusqlite::Result<Resource> {
    resource_at(row, 0)
}

/// Read the `RESOURCE_COLUMNS` block starting at column `base`
fn resource_at(row: &Row, base: usize) -> rusqlite::Result<Resource> {
    let kind: String = row.get(base + 2)?;
    let duration: Option<i64> = row.get(base + 7)?;
    let tier: Option<String> = row.get(base + 8)?;
    let created_at: String = row.get(base + 10)?;
    Ok(Resource {
        id: row.get(base)?,
        title: row.get(base + 1)?,
        kind: kind
            .parse::<ResourceKind>()
            .map_err(|e| conversion_error(base + 2, Type::Text, e))?,
        url: row.get(base + 3)?,
        file_ref: row.get(base + 4)?,
        description: row.get(base + 5)?,
        author: row.get(base + 6)?,
        duration_minutes: bounded(base + 7, "duration_minutes", duration)?,
        tier: tier.as_deref().and_then(DifficultyTier::parse_lenient),
        active: row.get(base + 9)?,
        created_at: parse_timestamp(base + 10, &created_at)?,
    })
}

fn row_to_recommendation(row: &Row) -> rusqlite::Result<Recommendation> {
    recommendation_at(row, 0)
}

fn recommendation_at(row: &Row, base: usize) -> rusqlite::Result<Recommendation> {
    let created_at: String = row.get(base + 4)?;
    let viewed_at: Option<String> = row.get(base + 6)?;
    Ok(Recommendation {
        id: row.get(base)?,
        student_id: row.get(base + 1)?,
        task_id: row.get(base + 2)?,
        resource_id: row.get(base + 3)?,
        created_at: parse_timestamp(base + 4, &created_at)?,
        viewed: row.get(base + 5)?,
        viewed_at: viewed_at
            .as_deref()
            .map(|raw| parse_timestamp(base + 6, raw))
            .transpose()?,
    })
}

fn row_to_rule(row: &Row) -> rusqlite::Result<Rule> {
    let name: String = row.get(1)?;
    let trigger: String = row.get(2)?;
    let condition: Option<String> = row.get(3)?;
    let actions_json: String = row.get(4)?;
    let created_at: String = row.get(6)?;

    // An unreadable action list leaves the rule inert instead of failing the whole load
    let actions = serde_json::from_str::<Vec<RuleAction>>(&actions_json).unwrap_or_else(|e| {
        warn!("Rule '{}' has unreadable actions, treating as none: {}", name, e);
        Vec::new()
    });

    Ok(Rule {
        id: row.get(0)?,
        name,
        trigger: TriggerType::from(trigger),
        condition: RuleCondition::decode(condition.as_deref()),
        actions,
        active: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn row_to_interaction(row: &Row) -> rusqlite::Result<ResourceInteraction> {
    let kind: String = row.get(3)?;
    let rating: Option<i64> = row.get(4)?;
    let seconds: Option<i64> = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(ResourceInteraction {
        id: row.get(0)?,
        student_id: row.get(1)?,
        resource_id: row.get(2)?,
        kind: kind
            .parse::<InteractionKind>()
            .map_err(|e| conversion_error(3, Type::Text, e))?,
        rating: bounded(4, "rating", rating)?,
        seconds_watched: bounded(5, "seconds_watched", seconds)?,
        improved_grade: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

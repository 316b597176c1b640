//! Per-user profile documents.
//!
//! A document is read whole and written by dot-path field updates
//! (`study_data.xp`, `study_data.past_quizzes`, ...). Every write carries the
//! version the caller read; the store rejects it with
//! [`StoreError::VersionConflict`] if another writer got there first, so a
//! logical update is never silently lost.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Document};
use mongodb::Database;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::metrics::track_store_operation;
use crate::models::UserProfile;

const PROFILES_COLLECTION: &str = "profiles";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("{0} was modified concurrently")]
    VersionConflict(String),
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
    #[error("failed to serialize document: {0}")]
    Serialization(String),
    #[error("store unavailable: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY_CODE
    )
}

/// One named-field write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn set<T: Serialize>(path: &str, value: &T) -> Result<Self, StoreError> {
        validate_path(path)?;
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            path: path.to_string(),
            value,
        })
    }
}

/// Paths are dot-separated snake_case segments. Identity and version fields are
/// owned by the store and cannot be written through an update.
fn validate_path(path: &str) -> Result<(), StoreError> {
    let valid_segments = path.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    });
    if !valid_segments || matches!(path, "uid" | "version" | "_id") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Inserts the profile unless one already exists. Returns true if inserted.
    async fn create_if_absent(&self, profile: &UserProfile) -> Result<bool, StoreError>;

    /// Applies `updates` only if the stored version equals `expected_version`.
    /// Returns the new version.
    async fn update_fields(
        &self,
        uid: &str,
        expected_version: u64,
        updates: &[FieldUpdate],
    ) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub struct MongoProfileStore {
    db: Database,
}

impl MongoProfileStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(PROFILES_COLLECTION)
    }
}

#[async_trait]
impl ProfileStore for MongoProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        let found = track_store_operation("find_one", PROFILES_COLLECTION, async {
            self.collection()
                .find_one(doc! { "_id": uid })
                .await
                .map_err(StoreError::from)
        })
        .await?;

        match found {
            Some(mut document) => {
                document.remove("_id");
                let profile = bson::from_document::<UserProfile>(document)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn create_if_absent(&self, profile: &UserProfile) -> Result<bool, StoreError> {
        let mut document =
            bson::to_document(profile).map_err(|e| StoreError::Serialization(e.to_string()))?;
        document.insert("_id", profile.uid.as_str());

        let result = track_store_operation("insert_one", PROFILES_COLLECTION, async {
            self.collection()
                .insert_one(document)
                .await
                .map_err(|e| {
                    if is_duplicate_key(&e) {
                        StoreError::Duplicate(format!("profile {}", profile.uid))
                    } else {
                        StoreError::from(e)
                    }
                })
        })
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn update_fields(
        &self,
        uid: &str,
        expected_version: u64,
        updates: &[FieldUpdate],
    ) -> Result<u64, StoreError> {
        let mut set_doc = Document::new();
        for update in updates {
            validate_path(&update.path)?;
            let value = bson::to_bson(&update.value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            set_doc.insert(update.path.clone(), value);
        }

        let expected = i64::try_from(expected_version)
            .map_err(|_| StoreError::Serialization("version overflow".to_string()))?;

        let result = track_store_operation("update_one", PROFILES_COLLECTION, async {
            self.collection()
                .update_one(
                    doc! { "_id": uid, "version": expected },
                    doc! { "$set": set_doc, "$inc": { "version": 1_i64 } },
                )
                .await
                .map_err(StoreError::from)
        })
        .await?;

        if result.matched_count == 0 {
            let exists = self
                .collection()
                .find_one(doc! { "_id": uid })
                .projection(doc! { "_id": 1 })
                .await?
                .is_some();
            return Err(if exists {
                crate::metrics::PROFILE_WRITE_CONFLICTS_TOTAL.inc();
                StoreError::VersionConflict(format!("profile {}", uid))
            } else {
                StoreError::NotFound(format!("profile {}", uid))
            });
        }

        Ok(expected_version + 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match tokio::time::timeout(
            Duration::from_secs(1),
            self.db.run_command(doc! { "ping": 1 }),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StoreError::Backend(format!("MongoDB error: {}", e))),
            Err(_) => Err(StoreError::Backend("MongoDB timeout after 1s".to_string())),
        }
    }
}

/// Keeps documents as JSON trees so dot-path updates behave like the document
/// database they stand in for. Used by tests and local runs without MongoDB.
#[derive(Default)]
pub struct InMemoryProfileStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let mut segments = path.split('.').peekable();
    let mut current = root;

    while let Some(segment) = segments.next() {
        let object = current
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }

        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }

    Err(StoreError::InvalidPath(path.to_string()))
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(uid)
            .map(|doc| {
                serde_json::from_value::<UserProfile>(doc.clone())
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn create_if_absent(&self, profile: &UserProfile) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&profile.uid) {
            return Ok(false);
        }
        let document =
            serde_json::to_value(profile).map_err(|e| StoreError::Serialization(e.to_string()))?;
        documents.insert(profile.uid.clone(), document);
        Ok(true)
    }

    async fn update_fields(
        &self,
        uid: &str,
        expected_version: u64,
        updates: &[FieldUpdate],
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", uid)))?;

        let current_version = document.get("version").and_then(Value::as_u64).unwrap_or(0);
        if current_version != expected_version {
            crate::metrics::PROFILE_WRITE_CONFLICTS_TOTAL.inc();
            return Err(StoreError::VersionConflict(format!("profile {}", uid)));
        }

        let mut candidate = document.clone();
        for update in updates {
            validate_path(&update.path)?;
            set_path(&mut candidate, &update.path, update.value.clone())?;
        }
        let new_version = expected_version + 1;
        set_path(&mut candidate, "version", Value::from(new_version))?;

        // Reject writes that would leave a document the service cannot read back
        serde_json::from_value::<UserProfile>(candidate.clone())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        *document = candidate;
        Ok(new_version)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seeded() -> InMemoryProfileStore {
        let store = InMemoryProfileStore::new();
        let profile = UserProfile::new("u1", "student@example.com", Utc::now());
        assert!(store.create_if_absent(&profile).await.unwrap());
        store
    }

    #[tokio::test]
    async fn create_if_absent_keeps_first_document() {
        let store = seeded().await;
        let other = UserProfile::new("u1", "someone-else@example.com", Utc::now());
        assert!(!store.create_if_absent(&other).await.unwrap());

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.email, "student@example.com");
    }

    #[tokio::test]
    async fn dot_path_update_touches_only_named_fields() {
        let store = seeded().await;
        let updates = vec![
            FieldUpdate::set("study_data.xp", &130u64).unwrap(),
            FieldUpdate::set("study_data.coins", &33u64).unwrap(),
        ];

        let version = store.update_fields("u1", 0, &updates).await.unwrap();
        assert_eq!(version, 1);

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.study_data.xp, 130);
        assert_eq!(stored.study_data.coins, 33);
        assert_eq!(stored.study_data.level, 1);
        assert_eq!(stored.email, "student@example.com");
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = seeded().await;
        let update = [FieldUpdate::set("study_data.xp", &10u64).unwrap()];
        store.update_fields("u1", 0, &update).await.unwrap();

        let err = store.update_fields("u1", 0, &update).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let store = InMemoryProfileStore::new();
        let update = [FieldUpdate::set("study_data.xp", &10u64).unwrap()];
        let err = store.update_fields("ghost", 0, &update).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn schema_breaking_write_is_rejected() {
        let store = seeded().await;
        let update = [FieldUpdate::set("study_data.xp", &"lots").unwrap()];
        let err = store.update_fields("u1", 0, &update).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.version, 0);
    }

    #[test]
    fn reserved_and_malformed_paths_are_rejected() {
        assert!(FieldUpdate::set("version", &1u64).is_err());
        assert!(FieldUpdate::set("uid", &"x").is_err());
        assert!(FieldUpdate::set("study_data..xp", &1u64).is_err());
        assert!(FieldUpdate::set("study_data.$where", &1u64).is_err());
        assert!(FieldUpdate::set("plan", &"pro").is_ok());
    }
}

//! Sign-in credentials, kept apart from the profile document.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use tokio::sync::RwLock;

use super::profile_store::{is_duplicate_key, StoreError};
use crate::metrics::track_store_operation;
use crate::models::account::Account;

const ACCOUNTS_COLLECTION: &str = "accounts";

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the email is already registered.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

pub struct MongoAccountStore {
    db: Database,
}

impl MongoAccountStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(ACCOUNTS_COLLECTION)
    }

    /// Unique index on email; run once at startup.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection().create_index(index).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let found = track_store_operation("find_one", ACCOUNTS_COLLECTION, async {
            self.collection()
                .find_one(doc! { "email": email })
                .await
                .map_err(StoreError::from)
        })
        .await?;

        found
            .map(|mut document| {
                document.remove("_id");
                bson::from_document::<Account>(document)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut document =
            bson::to_document(account).map_err(|e| StoreError::Serialization(e.to_string()))?;
        document.insert("_id", account.uid.as_str());

        track_store_operation("insert_one", ACCOUNTS_COLLECTION, async {
            self.collection()
                .insert_one(document)
                .await
                .map_err(|e| {
                    if is_duplicate_key(&e) {
                        StoreError::Duplicate(format!("account {}", account.email))
                    } else {
                        StoreError::from(e)
                    }
                })
        })
        .await?;
        Ok(())
    }

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = bson::to_bson(&at).map_err(|e| StoreError::Serialization(e.to_string()))?;
        track_store_operation("update_one", ACCOUNTS_COLLECTION, async {
            self.collection()
                .update_one(doc! { "_id": uid }, doc! { "$set": { "last_login_at": at } })
                .await
                .map_err(StoreError::from)
        })
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(email).cloned())
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.email) {
            return Err(StoreError::Duplicate(format!("account {}", account.email)));
        }
        accounts.insert(account.email.clone(), account.clone());
        Ok(())
    }

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|a| a.uid == uid)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", uid)))?;
        account.last_login_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(uid: &str, email: &str) -> Account {
        Account {
            uid: uid.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryAccountStore::new();
        store.insert(&account("u1", "a@example.com")).await.unwrap();
        let err = store
            .insert(&account("u2", "a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn touch_last_login_updates_account() {
        let store = InMemoryAccountStore::new();
        store.insert(&account("u1", "a@example.com")).await.unwrap();
        let at = Utc::now();
        store.touch_last_login("u1", at).await.unwrap();

        let found = store.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(found.last_login_at, Some(at));
    }
}

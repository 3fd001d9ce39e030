use crate::errors::{DbError, DomainError, DomainResult};
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_scalar, SqlitePool};

/// Document store the emergency information lives in
pub const INFO_STORE: &str = "info";
/// Key of the single emergency document
pub const INFO_KEY: &str = "data";

/// One block of the emergency page. Which fields are used depends on the block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyInfo {
    pub hospital: EmergencySection,
    pub clinic: EmergencySection,
    pub food: EmergencySection,
    pub emergency: EmergencySection,
}

fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}

impl Default for EmergencyInfo {
    fn default() -> Self {
        Self {
            hospital: EmergencySection {
                name: text("Hope General Hospital"),
                address: text("123 Mercy Street, SafeTown"),
                contact: text("+123 456 7890"),
                ..Default::default()
            },
            clinic: EmergencySection {
                name: text("Healing Hands Clinic"),
                address: text("45 Wellness Ave, Refugee Zone"),
                contact: text("+123 987 6543"),
                ..Default::default()
            },
            food: EmergencySection {
                location: text("Community Hall, Block C"),
                hours: text("9:00 AM – 6:00 PM daily"),
                ..Default::default()
            },
            emergency: EmergencySection {
                agency: text("Refugee Support Hotline"),
                phone: text("112 or +123 222 3333"),
                ..Default::default()
            },
        }
    }
}

/// Local copy of the emergency information, readable without a network
#[derive(Clone)]
pub struct EmergencyInfoStore {
    pool: SqlitePool,
}

impl EmergencyInfoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The stored document, `None` if it was never saved
    pub async fn load(&self) -> DomainResult<Option<EmergencyInfo>> {
        let raw = query_scalar::<_, String>("SELECT value FROM offline_documents WHERE store = ? AND key = ?")
            .bind(INFO_STORE)
            .bind(INFO_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::from(e)))?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Never fails: anything short of a readable document yields the defaults
    pub async fn load_or_default(&self) -> EmergencyInfo {
        match self.load().await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!("No emergency info stored, using defaults");
                EmergencyInfo::default()
            }
            Err(e) => {
                warn!("Could not read emergency info, using defaults: {}", e);
                EmergencyInfo::default()
            }
        }
    }

    pub async fn save(&self, info: &EmergencyInfo) -> DomainResult<()> {
        let value = serde_json::to_string(info)?;
        query(
            "INSERT INTO offline_documents (store, key, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(store, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(INFO_STORE)
        .bind(INFO_KEY)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::from(e)))?;

        debug!("Emergency info saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::memory_pool;

    async fn store() -> EmergencyInfoStore {
        let pool = memory_pool().await.unwrap();
        crate::db_migration::initialize_database(&pool).await.unwrap();
        EmergencyInfoStore::new(pool)
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        let store = store().await;
        assert!(store.load().await.unwrap().is_none());

        let info = store.load_or_default().await;
        assert_eq!(info.hospital.name.as_deref(), Some("Hope General Hospital"));
        assert_eq!(info.emergency.phone.as_deref(), Some("112 or +123 222 3333"));
        assert!(info.food.name.is_none());
    }

    #[tokio::test]
    async fn saved_document_replaces_defaults() {
        let store = store().await;
        let mut info = EmergencyInfo::default();
        info.food.hours = Some("8:00 AM – 4:00 PM".to_string());
        store.save(&info).await.unwrap();

        info.clinic.contact = Some("+123 000 0000".to_string());
        store.save(&info).await.unwrap();

        assert_eq!(store.load_or_default().await, info);
    }

    #[tokio::test]
    async fn unreadable_document_falls_back_to_defaults() {
        let store = store().await;
        query("INSERT INTO offline_documents (store, key, value, updated_at) VALUES (?, ?, '{broken', '')")
            .bind(INFO_STORE)
            .bind(INFO_KEY)
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.load().await.is_err());
        assert_eq!(store.load_or_default().await, EmergencyInfo::default());
    }

    #[tokio::test]
    async fn missing_table_falls_back_to_defaults() {
        let store = EmergencyInfoStore::new(memory_pool().await.unwrap());
        assert_eq!(store.load_or_default().await, EmergencyInfo::default());
    }
}

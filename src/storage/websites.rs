//! Website registration.

use chrono::Utc;
use log::info;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{from_millis, to_millis, Storage};
use crate::error_handling::DatabaseError;
use crate::models::Website;
use crate::probe::{normalize_url, parse_probe_url, website_domain};

/// Selected from `websites w`; aliased so joins do not clash.
pub(super) const WEBSITE_COLUMNS: &str = "w.id AS id, w.name AS name, w.url AS url, \
     w.normalized_url AS normalized_url, w.domain AS domain, w.is_active AS is_active, \
     w.created_at_ms AS created_at_ms";

pub(super) fn website_from_row(row: &SqliteRow) -> Result<Website, DatabaseError> {
    Ok(Website {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        normalized_url: row.try_get("normalized_url")?,
        domain: row.try_get("domain")?,
        is_active: row.try_get("is_active")?,
        created_at: from_millis(row.try_get("created_at_ms")?)?,
    })
}

impl Storage {
    /// Registers a website. The raw URL must be unique.
    pub async fn add_website(&self, name: &str, url: &str) -> Result<Website, DatabaseError> {
        let url = url.trim();
        parse_probe_url(url).map_err(|reason| DatabaseError::InvalidUrl {
            url: url.to_string(),
            reason,
        })?;
        let normalized = normalize_url(url);
        let domain = website_domain(url);
        let created_at_ms = to_millis(Utc::now());

        let result = sqlx::query(
            "INSERT INTO websites (name, url, normalized_url, domain, is_active, created_at_ms)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(name)
        .bind(url)
        .bind(&normalized)
        .bind(&domain)
        .bind(created_at_ms)
        .execute(self.pool())
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(DatabaseError::DuplicateWebsite(url.to_string()));
            }
            Err(e) => return Err(DatabaseError::SqlError(e)),
        };

        info!("Registered website {id} ({url})");
        self.get_website(id).await
    }

    pub async fn get_website(&self, id: i64) -> Result<Website, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {WEBSITE_COLUMNS} FROM websites w WHERE w.id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DatabaseError::SqlError)?
            .ok_or(DatabaseError::NotFound {
                entity: "website",
                id,
            })?;
        website_from_row(&row)
    }

    /// Inactive websites are skipped by every detection cycle.
    pub async fn set_website_active(&self, id: i64, active: bool) -> Result<(), DatabaseError> {
        let done = sqlx::query("UPDATE websites SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DatabaseError::SqlError)?;
        if done.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                entity: "website",
                id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_website_normalizes() {
        let storage = Storage::in_memory().await.unwrap();
        let site = storage.add_website("Example", "www.Example.com/home").await.unwrap();
        assert_eq!(site.url, "www.Example.com/home");
        assert_eq!(site.normalized_url, "http://www.Example.com/home");
        assert_eq!(site.domain, "example.com");
        assert!(site.is_active);
        assert_eq!(storage.get_website(site.id).await.unwrap(), site);
    }

    #[tokio::test]
    async fn test_duplicate_url_is_rejected() {
        let storage = Storage::in_memory().await.unwrap();
        storage.add_website("a", "https://a.test").await.unwrap();
        let err = storage.add_website("again", "https://a.test").await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateWebsite(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let storage = Storage::in_memory().await.unwrap();
        let err = storage.add_website("bad", "ftp://files.test").await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_toggle_activation() {
        let storage = Storage::in_memory().await.unwrap();
        let site = storage.add_website("a", "a.test").await.unwrap();
        storage.set_website_active(site.id, false).await.unwrap();
        assert!(!storage.get_website(site.id).await.unwrap().is_active);
        assert!(matches!(
            storage.set_website_active(999, true).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}

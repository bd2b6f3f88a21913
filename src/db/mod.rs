//! Database module
//!
//! The visit log is append-only: rows are inserted by the collect endpoint
//! and only ever read back by the stats queries. No update or delete path
//! exists, so readers and the single writer never conflict.

mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;

/// One recorded page view, as read back from the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    pub id: i64,
    pub site_id: String,
    pub ip: String,
    pub country: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// A visit accepted by the collect endpoint, not yet persisted.
/// The insert timestamp is assigned by the database layer.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub site_id: String,
    pub ip: String,
    pub country: String,
    pub path: String,
}

/// Site scope for the stats queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteFilter {
    All,
    Site(String),
}

impl SiteFilter {
    /// Parse the raw `site_id` query value: absent, blank, or `"all"` means
    /// no filter; anything else is an exact site match.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => SiteFilter::All,
            Some(site) => SiteFilter::Site(site.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryStat {
    pub country: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteStat {
    pub site_id: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to a single connection: every
    /// new `:memory:` connection would otherwise be a separate empty database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_SITE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_SITE_IP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_COUNTRY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append one visit. The timestamp is taken here, at insert time,
    /// never from the caller.
    pub async fn insert_event(&self, visit: &NewVisit) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO visits (site_id, ip, country, path, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&visit.site_id)
        .bind(&visit.ip)
        .bind(&visit.country)
        .bind(&visit.path)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Total page views in scope
    pub async fn count_events(&self, filter: &SiteFilter) -> Result<i64> {
        let row: (i64,) = match filter {
            SiteFilter::All => {
                sqlx::query_as("SELECT COUNT(*) FROM visits")
                    .fetch_one(&self.pool)
                    .await?
            }
            SiteFilter::Site(site) => {
                sqlx::query_as("SELECT COUNT(*) FROM visits WHERE site_id = ?")
                    .bind(site)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.0)
    }

    /// Distinct source addresses in scope (coarse unique-visitor proxy)
    pub async fn count_unique_ips(&self, filter: &SiteFilter) -> Result<i64> {
        let row: (i64,) = match filter {
            SiteFilter::All => {
                sqlx::query_as("SELECT COUNT(DISTINCT ip) FROM visits")
                    .fetch_one(&self.pool)
                    .await?
            }
            SiteFilter::Site(site) => {
                sqlx::query_as("SELECT COUNT(DISTINCT ip) FROM visits WHERE site_id = ?")
                    .bind(site)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.0)
    }

    /// Countries in scope ranked by view count
    pub async fn top_countries(&self, filter: &SiteFilter, limit: i32) -> Result<Vec<CountryStat>> {
        let rows: Vec<(String, i64)> = match filter {
            SiteFilter::All => {
                sqlx::query_as(
                    r#"
                    SELECT country, COUNT(*) as count
                    FROM visits
                    GROUP BY country
                    ORDER BY count DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            SiteFilter::Site(site) => {
                sqlx::query_as(
                    r#"
                    SELECT country, COUNT(*) as count
                    FROM visits
                    WHERE site_id = ?
                    GROUP BY country
                    ORDER BY count DESC
                    LIMIT ?
                    "#,
                )
                .bind(site)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(country, count)| CountryStat { country, count })
            .collect())
    }

    /// Most recent visits in scope, newest first. Insert order (`id`) is the
    /// recency order, not the stored timestamp.
    pub async fn recent_events(&self, filter: &SiteFilter, limit: i32) -> Result<Vec<VisitEvent>> {
        let rows: Vec<(i64, String, String, String, String, i64)> = match filter {
            SiteFilter::All => {
                sqlx::query_as(
                    r#"
                    SELECT id, site_id, ip, country, path, timestamp
                    FROM visits
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            SiteFilter::Site(site) => {
                sqlx::query_as(
                    r#"
                    SELECT id, site_id, ip, country, path, timestamp
                    FROM visits
                    WHERE site_id = ?
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(site)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(id, site_id, ip, country, path, ts)| VisitEvent {
                id,
                site_id,
                ip,
                country,
                path,
                timestamp: DateTime::from_timestamp_millis(ts).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    /// Every site id ever seen, ascending. Deliberately ignores the active
    /// filter: this powers the site picker, which must list all sites
    /// regardless of the current selection.
    pub async fn known_sites(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT site_id FROM visits ORDER BY site_id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(site_id,)| site_id).collect())
    }

    /// Sites ranked by view count over the whole log. Ignores the active
    /// filter, same reason as [`known_sites`](Self::known_sites).
    pub async fn top_sites(&self, limit: i32) -> Result<Vec<SiteStat>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT site_id, COUNT(*) as count
            FROM visits
            GROUP BY site_id
            ORDER BY count DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(site_id, count)| SiteStat { site_id, count })
            .collect())
    }
}

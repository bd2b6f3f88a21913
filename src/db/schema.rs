//! Database schema definitions

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id TEXT NOT NULL,
    ip TEXT NOT NULL,
    country TEXT NOT NULL,
    path TEXT NOT NULL,
    timestamp BIGINT NOT NULL
)
"#;

// For per-site counts, the recent feed, and DISTINCT site_id scans
pub const CREATE_INDEX_SITE: &str =
    "CREATE INDEX IF NOT EXISTS idx_visits_site ON visits(site_id, id DESC)";

// For COUNT(DISTINCT ip), per site and global
pub const CREATE_INDEX_SITE_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_visits_site_ip ON visits(site_id, ip)";

// For country ranking aggregation
pub const CREATE_INDEX_COUNTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_visits_country ON visits(country)";

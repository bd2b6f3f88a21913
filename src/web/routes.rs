//! HTTP routes: the collect (ingestion) and stats (aggregation) handlers

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use super::{error::ApiError, AppState};
use crate::db::{CountryStat, NewVisit, SiteFilter, SiteStat, VisitEvent};
use crate::geoip::SharedGeoIp;

/// Truncation limits for the ranking and feed views
const TOP_COUNTRIES_LIMIT: i32 = 50;
const RECENT_FEED_LIMIT: i32 = 100;
const TOP_SITES_LIMIT: i32 = 100;

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > socket address
fn client_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // X-Forwarded-For may carry a chain of IPs, first is the original client
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    fallback_ip.to_string()
}

/// Resolve the visitor's country: edge-provided region header first,
/// GeoIP second, "Unknown" last. Never taken from the request body.
fn resolve_country(headers: &HeaderMap, geoip: &SharedGeoIp, ip: &str) -> String {
    if let Some(value) = headers.get("cf-ipcountry") {
        if let Ok(code) = value.to_str() {
            let code = code.trim();
            if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                let code = code.to_ascii_uppercase();
                if code != "XX" {
                    return code;
                }
            }
        }
    }

    geoip
        .lookup(ip)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Trimmed site id, or "default" when absent or blank. Grouping queries
/// never see an empty site id.
fn normalize_site_id(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => "default".to_string(),
        Some(site) => site.to_string(),
    }
}

fn normalize_path(raw: Option<&str>) -> String {
    match raw {
        None => "/".to_string(),
        Some(path) => path.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub status: &'static str,
}

/// API: Record one page view
///
/// Blocklisted sites get the same successful acknowledgment as recorded
/// ones; the response never reveals which sites are blocked. Duplicate
/// calls record duplicate rows — this counts views, it does not dedup them.
pub async fn collect(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<CollectRequest>, JsonRejection>,
) -> Result<Json<CollectResponse>, ApiError> {
    let Json(report) = body.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;

    let site_id = normalize_site_id(report.site_id.as_deref());
    if state.blocklist.contains(&site_id) {
        tracing::info!("Ignored visit for blocklisted site: {}", site_id);
        return Ok(Json(CollectResponse { status: "ignored" }));
    }

    let fallback_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let ip = client_ip(&headers, &fallback_ip);
    let country = resolve_country(&headers, &state.geoip, &ip);
    let path = normalize_path(report.path.as_deref());

    let visit = NewVisit {
        site_id,
        ip,
        country,
        path,
    };
    state.db.insert_event(&visit).await?;

    tracing::info!("Visit recorded: {} {} from {}", visit.site_id, visit.path, visit.ip);
    Ok(Json(CollectResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub site_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total: i64,
    pub unique_visitors: i64,
    pub countries: Vec<CountryStat>,
    pub recent: Vec<VisitEvent>,
    /// Every site ever seen — unaffected by the active filter, so the site
    /// picker can always discover other sites.
    pub sites: Vec<String>,
    /// Also computed over the whole log, same reason as `sites`.
    pub top_sites: Vec<SiteStat>,
}

/// API: Aggregated stats snapshot behind the access guard
///
/// Six independent reads fanned out concurrently. Any single failure fails
/// the whole request; the views share no transaction, so a write landing
/// between two reads may skew them slightly. Acceptable for a dashboard.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    credential: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    state
        .guard
        .verify(credential.as_ref().map(|header| header.token()))?;

    let filter = SiteFilter::parse(query.site_id.as_deref());

    let (total, unique_visitors, countries, recent, sites, top_sites) = tokio::try_join!(
        state.db.count_events(&filter),
        state.db.count_unique_ips(&filter),
        state.db.top_countries(&filter, TOP_COUNTRIES_LIMIT),
        state.db.recent_events(&filter, RECENT_FEED_LIMIT),
        state.db.known_sites(),
        state.db.top_sites(TOP_SITES_LIMIT),
    )?;

    Ok(Json(StatsResponse {
        total,
        unique_visitors,
        countries,
        recent,
        sites,
        top_sites,
    }))
}

/// Liveness probe
pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

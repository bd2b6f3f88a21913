//! GeoIP lookup module using a MaxMind country database
//!
//! Used as a fallback when the edge did not supply a region header.

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// GeoIP reader wrapper
pub struct GeoIp {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoIp {
    /// Create a new GeoIP instance, loading the database if available
    pub fn new(database_path: &str) -> Self {
        let path = Path::new(database_path);

        if database_path.is_empty() || !path.exists() {
            warn!("GeoIP database not found at: {}", database_path);
            warn!("Country resolution will fall back to \"Unknown\" without an edge header");
            return Self { reader: None };
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!("GeoIP database loaded: {}", database_path);
                Self {
                    reader: Some(reader),
                }
            }
            Err(e) => {
                warn!("Failed to load GeoIP database: {}", e);
                Self { reader: None }
            }
        }
    }

    /// Look up an IP address and return its 2-letter country code
    pub fn lookup(&self, ip: &str) -> Option<String> {
        let reader = self.reader.as_ref()?;

        let ip_addr: IpAddr = ip.parse().ok()?;

        // Private/local IPs have no meaningful country
        if is_private_ip(&ip_addr) {
            return None;
        }

        let country: geoip2::Country = reader.lookup(ip_addr).ok()?.decode().ok()??;
        country.country.iso_code.map(|code| code.to_string())
    }

    /// Check if the GeoIP database is loaded
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }
}

/// Check if an IP address is private/local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unspecified(),
    }
}

/// Thread-safe GeoIP wrapper
pub type SharedGeoIp = Arc<GeoIp>;

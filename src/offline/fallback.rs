use crate::errors::{DomainError, DomainResult};
use crate::offline::emergency::{EmergencyInfo, EmergencyInfoStore};
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Name of the current asset cache; any other cache is stale
pub const CACHE_NAME: &str = "refugeeaid-cache-v1";
/// Path the offline page is served under
pub const OFFLINE_URL: &str = "/offline.html";

const STATIC_ASSETS: &[&str] = &[OFFLINE_URL, "/logo.png", "/manifest.json"];
const EMERGENCY_BUNDLE_PREFIX: &str = "assets/emergency-main-";

/// Caches to delete when a new version activates
pub fn stale_caches(cache_names: &[String]) -> Vec<&str> {
    cache_names
        .iter()
        .map(String::as_str)
        .filter(|name| *name != CACHE_NAME)
        .collect()
}

/// URLs to store in the asset cache on install.
///
/// `manifest` is the bundler manifest; the hashed emergency bundle is added
/// when it can be found there.
pub fn precache_urls(manifest: Option<&Value>) -> Vec<String> {
    let mut urls: Vec<String> = STATIC_ASSETS.iter().map(|url| url.to_string()).collect();

    let bundle = manifest.and_then(Value::as_object).and_then(|entries| {
        entries
            .values()
            .filter_map(|entry| entry.get("file").and_then(Value::as_str))
            .find(|file| file.starts_with(EMERGENCY_BUNDLE_PREFIX))
    });
    match bundle {
        Some(file) => urls.push(format!("/{}", file)),
        None => debug!("No emergency bundle in manifest"),
    }
    urls
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_card(title: &str, rows: &[(&str, &Option<String>)]) -> String {
    let mut card = format!("    <section class=\"info-card\">\n      <h2>{}</h2>\n", title);
    for (label, value) in rows {
        card.push_str(&format!(
            "      <p><strong>{}:</strong> {}</p>\n",
            label,
            escape_html(value.as_deref().unwrap_or(""))
        ));
    }
    card.push_str("    </section>\n");
    card
}

/// The page shown when the network is unreachable
pub fn render_offline_page(info: &EmergencyInfo) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n  \
         <title>Emergency Information</title>\n</head>\n<body class=\"offline-page\">\n  \
         <header class=\"header\">\n    <h1>Emergency Information</h1>\n    \
         <p class=\"offline-note\">You are currently offline. This page provides essential info.</p>\n  \
         </header>\n  <main class=\"info-sections\">\n",
    );

    html.push_str(&render_card(
        "Nearest Hospital",
        &[
            ("Name", &info.hospital.name),
            ("Address", &info.hospital.address),
            ("Contact", &info.hospital.contact),
        ],
    ));
    html.push_str(&render_card(
        "Medical Clinic",
        &[
            ("Name", &info.clinic.name),
            ("Address", &info.clinic.address),
            ("Contact", &info.clinic.contact),
        ],
    ));
    html.push_str(&render_card(
        "Food Distribution Center",
        &[("Location", &info.food.location), ("Hours", &info.food.hours)],
    ));
    html.push_str(&render_card(
        "Emergency Contact",
        &[("Agency", &info.emergency.agency), ("Phone", &info.emergency.phone)],
    ));

    html.push_str(
        "  </main>\n  <footer class=\"footer\">\n    <p>Stay calm. Help is nearby.</p>\n    \
         <p>This page is available offline in case of emergency.</p>\n  </footer>\n</body>\n</html>\n",
    );
    html
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedPage {
    /// The network answered, whatever the status
    Network { status: u16, body: String },
    /// The network could not be reached
    Offline(String),
}

/// Network fetch that serves the offline page when the network is unreachable
pub struct OfflineFallback {
    client: Client,
    emergency: EmergencyInfoStore,
}

impl OfflineFallback {
    pub fn new(emergency: EmergencyInfoStore, timeout: Duration) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, emergency })
    }

    pub async fn offline_page(&self) -> String {
        render_offline_page(&self.emergency.load_or_default().await)
    }

    /// HTTP error statuses are passed through; only transport failures fall back
    pub async fn fetch(&self, url: &str) -> FetchedPage {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Network unreachable, serving {}: {}", OFFLINE_URL, e);
                return FetchedPage::Offline(self.offline_page().await);
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => FetchedPage::Network { status, body },
            Err(e) => {
                warn!("Response body from {} lost, serving {}: {}", url, OFFLINE_URL, e);
                FetchedPage::Offline(self.offline_page().await)
            }
        }
    }
}

use anyhow::Result;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Best-effort reverse geocoder against an OpenCage-style endpoint.
/// Every failure path collapses to `None`; alerts are created without a
/// location string when this fails.
pub struct ReverseGeocoder {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ReverseGeocoder {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn reverse(&self, lat: f64, lon: f64) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }

        let response = self
            .client
            .get(&self.url)
            .query(&[("q", format!("{lat},{lon}")), ("key", self.api_key.clone())])
            .send()
            .await;

        let body: Value = match response {
            Ok(r) => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!("Reverse geocoding returned an unreadable body: {}", e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Reverse geocoding request failed: {}", e);
                return None;
            }
        };

        body["results"][0]["formatted"].as_str().map(str::to_string)
    }
}

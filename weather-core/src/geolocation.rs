//! Device position lookup for "use my location".
//!
//! A terminal has no positioning hardware, so the default locator asks an
//! IP geolocation service. Failures are reported as a denial carrying the reason.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};

use crate::{error::WeatherError, model::Coordinates};

pub const DEFAULT_IP_LOOKUP_URL: &str = "http://ip-api.com/json/";

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait Geolocator: Send + Sync + Debug {
    async fn current_position(&self) -> Result<Coordinates, WeatherError>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocator(pub Coordinates);

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<Coordinates, WeatherError> {
        Ok(self.0)
    }
}

/// Resolves the public IP address to an approximate position.
#[derive(Debug, Clone)]
pub struct IpGeolocator {
    url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpGeolocator {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_IP_LOOKUP_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build geolocation client, using defaults: {}", e);
                Client::new()
            });

        Self { url: url.into(), http }
    }
}

impl Default for IpGeolocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn current_position(&self) -> Result<Coordinates, WeatherError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("fields", "status,message,lat,lon")])
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("Geolocation request failed: {}", e);
                WeatherError::GeolocationDenied(String::new())
            })?;

        if !response.status().is_success() {
            tracing::debug!("Geolocation returned status {}", response.status());
            return Err(WeatherError::GeolocationDenied(String::new()));
        }

        let body: IpLookupResponse = response.json().await.map_err(|e| {
            tracing::debug!("Geolocation parse error: {}", e);
            WeatherError::GeolocationDenied(String::new())
        })?;

        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => {
                tracing::info!(lat, lon, "Resolved position from IP address");
                Ok(Coordinates::new(lat, lon))
            }
            _ => Err(WeatherError::GeolocationDenied(
                body.message.unwrap_or_default(),
            )),
        }
    }
}

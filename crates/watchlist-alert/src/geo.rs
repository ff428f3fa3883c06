//! Public-IP geolocation via ip-api.com.

use crate::dispatcher::Geolocator;
use crate::error::AlertError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use watchlist_core::Location;

pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of an ip-api.com `/json/` response. Position fields are absent on failure.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

impl IpApiResponse {
    fn into_location(self) -> Option<Location> {
        if self.status != "success" {
            tracing::warn!(status = %self.status, message = ?self.message, "geolocation lookup failed");
            return None;
        }
        Some(Location {
            lat: self.lat?,
            lon: self.lon?,
            city: self.city,
            country: self.country,
        })
    }
}

pub struct IpApiGeolocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiGeolocator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Geolocator for IpApiGeolocator {
    async fn locate(&self) -> Result<Option<Location>, AlertError> {
        let response: IpApiResponse = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.into_location())
    }
}

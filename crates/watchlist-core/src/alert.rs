//! Alerting data model: sightings, locations, contacts and message text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A matched identity that passed de-duplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub name: String,
    pub seen_at: DateTime<Utc>,
}

impl Sighting {
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen_at: Utc::now(),
        }
    }
}

/// Receives sightings from the detection loop.
///
/// Implementations must return without waiting on any network I/O.
pub trait AlertSink {
    /// Returns whether the sighting was accepted for delivery.
    fn dispatch(&self, sighting: Sighting) -> bool;
}

/// Where the detector currently is, as reported by IP geolocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub city: String,
    pub country: String,
}

/// A phone number registered to receive alerts near a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub phone: String,
    pub lat: f64,
    pub lon: f64,
}

/// Contact closest to (`lat`, `lon`).
///
/// Plain Euclidean distance in degrees, not geodesic. Ties keep the first.
pub fn nearest_contact(contacts: &[Contact], lat: f64, lon: f64) -> Option<&Contact> {
    let mut best: Option<(&Contact, f64)> = None;
    for contact in contacts {
        let d = ((lat - contact.lat).powi(2) + (lon - contact.lon).powi(2)).sqrt();
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((contact, d));
        }
    }
    best.map(|(c, _)| c)
}

/// SMS body for a sighting at `location`.
pub fn alert_message(name: &str, location: &Location) -> String {
    let Location { lat, lon, city, country } = location;
    format!(
        "Criminal Detected: Name: {name}\n\
         Current Location: {city}, {country} (Latitude: {lat}, Longitude: {lon}).\n\
         Google Maps Link: https://www.google.com/maps?q={lat},{lon}"
    )
}

//! Asynchronous alert pipeline: locate, pick a contact, send.

use crate::error::AlertError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use watchlist_core::alert::alert_message;
use watchlist_core::{AlertSink, Contact, Location, Sighting};

#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Current position, or `None` when the provider could not resolve one.
    async fn locate(&self) -> Result<Option<Location>, AlertError>;
}

#[async_trait]
pub trait ContactLookup: Send + Sync {
    async fn nearest(&self, lat: f64, lon: f64) -> Result<Option<Contact>, AlertError>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send `body` to `to`, returning the gateway's message id.
    async fn send(&self, to: &str, body: &str) -> Result<String, AlertError>;
}

/// What became of one sighting.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sent { to: String, message_id: String },
    NoLocation,
    NoContact,
    /// A recipient was found but no SMS gateway is configured.
    SmsDisabled { to: String },
}

pub struct AlertDispatcher {
    geo: Box<dyn Geolocator>,
    contacts: Box<dyn ContactLookup>,
    sms: Option<Box<dyn SmsGateway>>,
}

impl AlertDispatcher {
    pub fn new(
        geo: Box<dyn Geolocator>,
        contacts: Box<dyn ContactLookup>,
        sms: Option<Box<dyn SmsGateway>>,
    ) -> Self {
        if sms.is_none() {
            tracing::warn!("no SMS gateway configured, alerts will only be logged");
        }
        Self { geo, contacts, sms }
    }

    /// Run one sighting through the pipeline.
    pub async fn deliver(&self, sighting: &Sighting) -> Result<Delivery, AlertError> {
        let Some(location) = self.geo.locate().await? else {
            return Ok(Delivery::NoLocation);
        };
        let Some(contact) = self.contacts.nearest(location.lat, location.lon).await? else {
            return Ok(Delivery::NoContact);
        };

        let body = alert_message(&sighting.name, &location);
        let Some(sms) = &self.sms else {
            tracing::info!(to = %contact.phone, body = %body, "alert not sent (SMS disabled)");
            return Ok(Delivery::SmsDisabled { to: contact.phone });
        };

        let message_id = sms.send(&contact.phone, &body).await?;
        Ok(Delivery::Sent {
            to: contact.phone,
            message_id,
        })
    }

    /// Spawn the dispatcher on the current tokio runtime.
    ///
    /// The task ends once every [`AlertHandle`] has been dropped and the
    /// queue has drained.
    pub fn spawn(self, queue: usize) -> (AlertHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let task = tokio::spawn(self.run(rx));
        (AlertHandle { tx }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<Sighting>) {
        tracing::info!("alert dispatcher started");
        while let Some(sighting) = rx.recv().await {
            match self.deliver(&sighting).await {
                Ok(Delivery::Sent { to, message_id }) => {
                    tracing::info!(name = %sighting.name, to, message_id, "alert sent");
                }
                Ok(Delivery::NoLocation) => {
                    tracing::warn!(name = %sighting.name, "could not determine location, alert dropped");
                }
                Ok(Delivery::NoContact) => {
                    tracing::warn!(name = %sighting.name, "no contacts registered, alert dropped");
                }
                Ok(Delivery::SmsDisabled { .. }) => {}
                Err(e) => {
                    tracing::warn!(name = %sighting.name, error = %e, "alert delivery failed");
                }
            }
        }
        tracing::info!("alert dispatcher stopped");
    }
}

/// Sending half of the dispatcher queue. Never blocks.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<Sighting>,
}

impl AlertSink for AlertHandle {
    fn dispatch(&self, sighting: Sighting) -> bool {
        match self.tx.try_send(sighting) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(s)) => {
                tracing::warn!(name = %s.name, "alert queue full, sighting dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(s)) => {
                tracing::error!(name = %s.name, "alert dispatcher is gone, sighting dropped");
                false
            }
        }
    }
}

//! watchlist-alert: Turns sightings into SMS alerts.
//!
//! Each sighting is geolocated by public IP, routed to the registered
//! contact nearest that position and sent through the SMS gateway. All of
//! this runs on a tokio task behind [`AlertHandle`], so the detection loop
//! never waits on the network.

pub mod contacts;
pub mod dispatcher;
pub mod error;
pub mod geo;
pub mod sms;

pub use contacts::ContactDirectory;
pub use dispatcher::{AlertDispatcher, AlertHandle, ContactLookup, Delivery, Geolocator, SmsGateway};
pub use error::AlertError;
pub use geo::IpApiGeolocator;
pub use sms::TwilioSms;

//! Uplink network connectivity
//!
//! This module handles:
//! - Bounded association attempts against a network link
//! - Live status checks while associated
//! - Fast reassociation after a drop, slow retry after a failed attempt

mod link;
mod manager;

pub use link::{Credentials, NetworkLink, WifiLink};
pub use manager::{ConnectivityEvent, ConnectivityManager};

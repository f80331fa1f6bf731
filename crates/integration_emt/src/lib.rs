//! EMT Madrid bus API client
//!
//! Queries the [EMT Madrid](https://openbus.emtmadrid.es) open data API for bus
//! arrivals at a stop, stops near a location, the stops of a line, and node
//! metadata for a list of stops.
//!
//! # Architecture
//!
//! [`EmtClient`] defines the operations and [`EmtHttpClient`] implements them
//! over `reqwest`. Each client owns an [`EmtCache`]: line details and confirmed
//! stop ids are memoized for the lifetime of the client. Upstream failures are
//! classified into [`EmtError`] variants so callers can tell transport problems,
//! rejected credentials, unknown entities and bad input apart.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_emt::{EmtClient, EmtConfig, EmtHttpClient};
//!
//! let config = EmtConfig::new("my-client-id", "my-passkey");
//! let client = EmtHttpClient::new(&config)?;
//!
//! let arrivals = client.incoming_buses(69.into()).await?;
//! let line = client.stops_on_line("21", Some("1")).await?;
//! ```

mod cache;
mod client;
mod config;
mod error;
mod models;

pub use cache::{CacheStats, EmtCache, LineKey};
pub use client::{EmtClient, EmtHttpClient};
pub use config::{DirectionTokens, EmtConfig};
pub use error::EmtError;
pub use models::{
    Arrival, Direction, LineStops, Location, NearbyStop, NodeLines, ReturnCode, StopArg, StopId,
    StopIds,
};

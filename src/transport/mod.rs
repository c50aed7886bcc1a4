pub mod client;
pub mod state;

pub use client::{build_endpoint_url, Subscription, TransportClient};
pub use state::{AuthParams, ConnectionState, ReconnectConfig};

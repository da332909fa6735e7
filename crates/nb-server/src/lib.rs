//! nb-server: HTTP surface of the Nimbus orchestrator
//!
//! Exposes the node registry to self-registering daemons, the provisioning
//! routes backed by the active VM provider, and the streaming reverse proxy
//! that relays client traffic to nodes.

pub mod proxy;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;

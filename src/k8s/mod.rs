pub mod client;
pub mod client_manager;
pub mod resources;

pub use resources::{KubeResourceClient, ResourceClient, Subscription};

/// User agent sent with every api request, so exporter traffic is easy to
/// pick out of audit logs.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

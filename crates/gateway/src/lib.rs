// Lobby Gateway - real-time WebSocket surface
//
// Clients open a WebSocket on the hub path, call presence methods and
// receive presence change events for the tenants they subscribed to.

pub mod broadcast;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use broadcast::GatewayBroadcaster;
pub use handlers::MethodHandlers;
pub use protocol::*;
pub use server::{GatewayServer, Subscription};

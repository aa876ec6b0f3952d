//! Server side: event loop, per-connection state, routing, admin console

pub mod admin;
pub mod connection;
pub mod dispatch;
pub mod reactor;

pub use reactor::Reactor;

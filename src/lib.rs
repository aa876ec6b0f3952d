//! roomcast: a multi-room chat server over a length-prefixed frame protocol
//!
//! A single-threaded reactor multiplexes all client connections. Roommates
//! (named, password-protected identities) and rooms live in a membership
//! index the administrator edits from the server console; messages fan out
//! through a broker that shares each committed message across every
//! addressee without copying.

pub mod broker;
pub mod config;
pub mod error;
pub mod membership;
pub mod protocol;
pub mod server;

pub use broker::MessageBroker;
pub use config::ServerConfig;
pub use error::{CastError, Result};
pub use membership::MembershipIndex;
pub use server::Reactor;

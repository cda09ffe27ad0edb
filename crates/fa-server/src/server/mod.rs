//! TLS listener and tunnel dispatch

mod handler;
mod listener;

pub use handler::TunnelAcceptor;
pub use listener::ServerEndpoint;

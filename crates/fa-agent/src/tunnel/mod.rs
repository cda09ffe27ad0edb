//! Tunnel management for connecting to the server endpoint

mod dialer;

pub use dialer::TunnelDialer;

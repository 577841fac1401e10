//! Interactive test client for the Meridian services.
//!
//! Sends one request per command line over a single outbound connection and
//! reports every packet the service sends back.

pub mod client;
pub mod command;

pub use client::{Client, describe_packet};
pub use command::ClientCommand;

//! The Meridian backend services and the runner that hosts them.
//!
//! Each service is a [`ConnectionHandler`](meridian_net::ConnectionHandler)
//! run by a [`ServiceManager`](meridian_net::ServiceManager). [`run_service`]
//! binds it from config, starts it, drives the operator console until `quit`
//! or Ctrl-C, then drains it.

pub mod console;
pub mod runner;
pub mod service;
pub mod services;

pub use console::{Console, ConsoleCommand};
pub use runner::{RunContext, RunError, run_service, socket_config};
pub use service::Service;
pub use services::{AuthService, GameService, GatewayService, ZoneMap, ZoneService};

//! What the runner and console need from a service beyond packet handling.

use std::future::Future;

use meridian_config::ServiceKind;
use meridian_net::ConnectionHandler;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A hosted service: a connection handler plus operator-facing hooks.
pub trait Service: ConnectionHandler {
    /// Which service this is.
    fn kind(&self) -> ServiceKind;

    /// Service-specific lines appended to the `status` report.
    fn status(&self) -> impl Future<Output = Vec<String>> + Send {
        async { Vec::new() }
    }

    /// One line per tracked player, or `None` if the service tracks none.
    fn players(&self) -> impl Future<Output = Option<Vec<String>>> + Send {
        async { None }
    }

    /// A rendering of the service's map, or `None` if it has none.
    fn map(&self) -> Option<Vec<String>> {
        None
    }

    /// Spawn background work that runs until `shutdown` turns `true`.
    fn start_background(&self, _shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        None
    }
}

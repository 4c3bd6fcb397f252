// ── Control channel seam ──
//
// The device session drives the reader through this trait so it can be
// exercised against a scripted fake as well as the real hub connection.

use std::future::Future;
use std::time::Duration;

use rfidly_api::{Error, HubConnection, HubEvent};
use serde_json::Value;
use tokio::sync::broadcast;

/// A bidirectional command connection to the device hub.
pub trait ControlChannel: Send + Sync + 'static {
    /// Open the connection. Opening an open connection is a no-op.
    fn start(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Call a hub method and wait for its completion.
    fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, Error>> + Send;

    /// Like [`invoke`](Self::invoke), waiting up to `timeout` for the
    /// completion instead of the channel default.
    fn invoke_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, Error>> + Send;

    /// Server notifications and the close event, from now on.
    fn notifications(&self) -> broadcast::Receiver<HubEvent>;

    /// Close the connection. Safe in any state.
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

impl ControlChannel for HubConnection {
    fn start(&self) -> impl Future<Output = Result<(), Error>> + Send {
        HubConnection::start(self)
    }

    fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, Error>> + Send {
        HubConnection::invoke(self, method, args)
    }

    fn invoke_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, Error>> + Send {
        HubConnection::invoke_with_timeout(self, method, args, timeout)
    }

    fn notifications(&self) -> broadcast::Receiver<HubEvent> {
        self.subscribe()
    }

    fn stop(&self) -> impl Future<Output = ()> + Send {
        HubConnection::stop(self)
    }
}

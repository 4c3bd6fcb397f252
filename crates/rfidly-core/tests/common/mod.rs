// Scripted in-process control channel shared by the integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rfidly_api::{Error, HubEvent};
use rfidly_core::ControlChannel;
use serde_json::Value;
use tokio::sync::broadcast;

/// Completion wait for plain `invoke`, as on the real hub connection.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the fake hub does when a method is invoked.
#[derive(Clone)]
pub struct Reply {
    /// Notifications pushed before the completion.
    pub events: Vec<HubEvent>,
    pub result: Result<Value, String>,
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Self {
            events: Vec::new(),
            result: Ok(value),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            events: Vec::new(),
            result: Err(message.to_owned()),
        }
    }

    #[must_use]
    pub fn after(mut self, events: Vec<HubEvent>) -> Self {
        self.events = events;
        self
    }
}

pub fn notify(target: &str, arguments: Vec<Value>) -> HubEvent {
    HubEvent::Notification {
        target: target.to_owned(),
        arguments,
    }
}

pub struct FakeChannel {
    events: broadcast::Sender<HubEvent>,
    replies: Mutex<HashMap<String, Reply>>,
    hanging: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    timeouts: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl Default for FakeChannel {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            replies: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reply(self, method: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(method.to_owned(), reply);
        self
    }

    /// The method never completes.
    #[must_use]
    pub fn hang(self, method: &str) -> Self {
        self.hanging.lock().unwrap().insert(method.to_owned());
        self
    }

    /// The method replies only after `delay`.
    #[must_use]
    pub fn delay(self, method: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(method.to_owned(), delay);
        self
    }

    /// Completion wait the last call of `method` was given.
    pub fn timeout_for(&self, method: &str) -> Option<Duration> {
        self.timeouts.lock().unwrap().get(method).copied()
    }

    /// Push a notification as the hub would.
    pub fn emit(&self, event: HubEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn args(&self, method: &str) -> Option<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, a)| a.clone())
    }
}

impl ControlChannel for FakeChannel {
    fn start(&self) -> impl Future<Output = Result<(), Error>> + Send {
        self.starts.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }

    fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, Error>> + Send {
        self.invoke_with_timeout(method, args, INVOKE_TIMEOUT)
    }

    fn invoke_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, Error>> + Send {
        let method = method.to_owned();
        async move {
            self.calls.lock().unwrap().push((method.clone(), args));
            self.timeouts.lock().unwrap().insert(method.clone(), timeout);
            if self.hanging.lock().unwrap().contains(&method) {
                std::future::pending::<()>().await;
            }
            let delay = self.delays.lock().unwrap().get(&method).copied();
            if let Some(delay) = delay {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(Error::Timeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
                tokio::time::sleep(delay).await;
            }
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(&method)
                .cloned()
                .unwrap_or_else(|| Reply::ok(Value::Null));
            for event in reply.events {
                let _ = self.events.send(event);
            }
            reply.result.map_err(|message| Error::Invocation {
                method: method.clone(),
                message,
            })
        }
    }

    fn notifications(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    fn stop(&self) -> impl Future<Output = ()> + Send {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(HubEvent::Closed { error: None });
        async {}
    }
}

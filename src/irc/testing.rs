//! In-process stand-ins for network clients.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{self, FutureExt};

use super::client::{ClientError, ConnectFuture, Connector, NetworkClient};
use crate::model::{AccountId, ConnectionParams};

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<String>>,
    clients: Mutex<Vec<Arc<AtomicBool>>>,
    connects: AtomicUsize,
    quits: AtomicUsize,
    refusal: Mutex<Option<String>>,
    fail_calls: AtomicBool,
}

/// Hands out [`MockClient`]s that record every call as a short string such
/// as `join #x` or `privmsg #x hi`.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn quit_count(&self) -> usize {
        self.shared.quits.load(Ordering::SeqCst)
    }

    /// Makes further connection attempts fail.
    pub fn refuse(&self, reason: &str) {
        *self.shared.refusal.lock().unwrap() = Some(reason.to_string());
    }

    /// Makes every client call fail from now on.
    pub fn fail_calls(&self) {
        self.shared.fail_calls.store(true, Ordering::SeqCst);
    }

    /// Marks every client handed out so far as disconnected.
    pub fn drop_connections(&self) {
        for connected in self.shared.clients.lock().unwrap().iter() {
            connected.store(false, Ordering::SeqCst);
        }
    }
}

impl Connector for MockConnector {
    fn connect(&self, _account: AccountId, _params: ConnectionParams) -> ConnectFuture {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let result: Result<Box<dyn NetworkClient>, ClientError> = match self.shared.refusal.lock().unwrap().clone() {
            Some(reason) => Err(ClientError::Unavailable(reason)),
            None => {
                let connected = Arc::new(AtomicBool::new(true));
                self.shared.clients.lock().unwrap().push(Arc::clone(&connected));
                Ok(Box::new(MockClient {
                    shared: Arc::clone(&self.shared),
                    connected,
                }))
            }
        };
        future::ready(result).boxed_local()
    }
}

pub struct MockClient {
    shared: Arc<Shared>,
    connected: Arc<AtomicBool>,
}

impl MockClient {
    fn record(&self, call: String) -> Result<(), ClientError> {
        if self.shared.fail_calls.load(Ordering::SeqCst) {
            return Err(ClientError::Disconnected);
        }
        self.shared.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl NetworkClient for MockClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn join_channel(&self, channel: &str) -> Result<(), ClientError> {
        self.record(format!("join {}", channel))
    }

    fn part_channel(&self, channel: &str, _message: Option<&str>) -> Result<(), ClientError> {
        self.record(format!("part {}", channel))
    }

    fn post_message(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.record(format!("privmsg {} {}", target, text))
    }

    fn post_raw(&self, line: &str) -> Result<(), ClientError> {
        self.record(format!("raw {}", line))
    }

    fn list_channels(&self) -> Result<(), ClientError> {
        self.record("list".to_string())
    }

    fn change_nick(&self, nick: &str) -> Result<(), ClientError> {
        self.record(format!("nick {}", nick))
    }

    fn quit_and_close(&self, message: Option<&str>) -> Result<(), ClientError> {
        self.shared.quits.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.record(format!("quit {}", message.unwrap_or_default()))
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::FutureExt;
use futures::StreamExt;
use irc::client::prelude::*;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::client::{ClientError, ConnectFuture, Connector, NetworkClient};
use crate::app::event::{EventSender, SessionEvent};
use crate::config::nickname::alternate_nicks;
use crate::model::{AccountId, ConnectionParams};

/// Commands issued before the server welcomed us wait here.
#[derive(Default)]
struct Registration {
    complete: bool,
    pending: Vec<Command>,
}

/// A client backed by the `irc` crate. Inbound messages are forwarded to the
/// session queue by a reader task.
pub struct IrcConnection {
    account: AccountId,
    sender: irc::client::Sender,
    connected: Arc<AtomicBool>,
    registration: Arc<Mutex<Registration>>,
    reader: AbortHandle,
}

impl IrcConnection {
    fn send(&self, command: Command) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::Disconnected);
        }
        {
            let mut registration = self.registration.lock().unwrap_or_else(PoisonError::into_inner);
            if !registration.complete {
                debug!(account = %self.account, ?command, "Queueing command until registered");
                registration.pending.push(command);
                return Ok(());
            }
        }
        self.sender.send(command)?;
        Ok(())
    }
}

impl NetworkClient for IrcConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
    }

    fn join_channel(&self, channel: &str) -> Result<(), ClientError> {
        self.send(Command::JOIN(channel.to_string(), None, None))
    }

    fn part_channel(&self, channel: &str, message: Option<&str>) -> Result<(), ClientError> {
        self.send(Command::PART(channel.to_string(), message.map(|m| m.to_string())))
    }

    fn post_message(&self, target: &str, text: &str) -> Result<(), ClientError> {
        // No CTCP injection in outbound messages
        let clean = text.replace('\x01', "");
        for line in clean.lines().filter(|l| !l.is_empty()) {
            self.send(Command::PRIVMSG(target.to_string(), line.to_string()))?;
        }
        Ok(())
    }

    fn post_raw(&self, line: &str) -> Result<(), ClientError> {
        self.send(Command::Raw(line.trim_end().to_string(), vec![]))
    }

    fn list_channels(&self) -> Result<(), ClientError> {
        self.send(Command::LIST(None, None))
    }

    fn change_nick(&self, nick: &str) -> Result<(), ClientError> {
        self.send(Command::NICK(nick.to_string()))
    }

    fn quit_and_close(&self, message: Option<&str>) -> Result<(), ClientError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            self.sender.send_quit(message.unwrap_or("Leaving"))?;
        }
        Ok(())
    }
}

/// Opens `irc` crate connections and wires them to the session queue.
pub struct IrcConnector {
    event_tx: EventSender,
}

impl IrcConnector {
    pub fn new(event_tx: EventSender) -> Self {
        Self { event_tx }
    }
}

impl Connector for IrcConnector {
    fn connect(&self, account: AccountId, params: ConnectionParams) -> ConnectFuture {
        spawn_connection(account, params, self.event_tx.clone()).boxed_local()
    }
}

pub async fn spawn_connection(
    account: AccountId,
    params: ConnectionParams,
    event_tx: EventSender,
) -> Result<Box<dyn NetworkClient>, ClientError> {
    info!(%account, host = %params.host, port = params.port, tls = params.tls, "Connecting");
    let config = Config {
        server: Some(params.host),
        port: Some(params.port),
        use_tls: Some(params.tls),
        alt_nicks: alternate_nicks(&params.preferred_nick),
        nickname: Some(params.preferred_nick),
        username: params.username,
        realname: params.realname,
        password: params.password,
        nick_password: params.nick_password,
        dangerously_accept_invalid_certs: Some(params.accept_invalid_certs),
        ..Config::default()
    };

    let mut client = Client::from_config(config).await?;
    client.identify()?;

    let sender = client.sender();
    let mut stream = client.stream()?;

    let connected = Arc::new(AtomicBool::new(true));
    let registration = Arc::new(Mutex::new(Registration::default()));

    let reader_connected = Arc::clone(&connected);
    let reader_registration = Arc::clone(&registration);
    let reader_sender = sender.clone();
    let reader = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(message) => {
                    if let Command::Response(Response::RPL_WELCOME, _) = message.command {
                        release_pending(account, &reader_registration, &reader_sender);
                    }
                    if event_tx
                        .send(SessionEvent::IrcMessage { account, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    let _ = event_tx.send(SessionEvent::IrcError {
                        account,
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }
        reader_connected.store(false, Ordering::SeqCst);
        let _ = event_tx.send(SessionEvent::IrcDisconnected {
            account,
            reason: "Connection closed".to_string(),
        });
    });

    Ok(Box::new(IrcConnection {
        account,
        sender,
        connected,
        registration,
        reader: reader.abort_handle(),
    }))
}

fn release_pending(account: AccountId, registration: &Mutex<Registration>, sender: &irc::client::Sender) {
    let mut registration = registration.lock().unwrap_or_else(PoisonError::into_inner);
    registration.complete = true;
    for command in registration.pending.drain(..) {
        if let Err(e) = sender.send(command) {
            warn!(%account, error = %e, "Failed to send queued command");
        }
    }
}

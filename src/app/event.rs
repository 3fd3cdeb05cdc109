use tokio::sync::mpsc;

use crate::model::{AccountId, ChannelRef};

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Everything the session loop reacts to. Network reader tasks and model
/// listeners only ever post here; the loop applies events one at a time.
#[derive(Debug)]
pub enum SessionEvent {
    /// IRC message received from a server
    IrcMessage {
        account: AccountId,
        message: irc::client::prelude::Message,
    },

    /// IRC connection state changed
    IrcDisconnected {
        account: AccountId,
        reason: String,
    },
    IrcError {
        account: AccountId,
        error: String,
    },

    /// Follow-up work requested by model listeners
    FlushLog(ChannelRef),
    SaveAccounts,
    AutoJoin(AccountId),

    Shutdown,
}

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

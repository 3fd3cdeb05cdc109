use irc::client::prelude::{Command, Message, Prefix, Response};
use tracing::{debug, warn};

use crate::app::event::SessionEvent;
use crate::app::state::SessionState;
use crate::irc::{SessionController, SessionError};
use crate::model::{AccountId, ChannelRef};

/// Whether the session loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub async fn handle_event(state: &mut SessionState, event: SessionEvent) -> Flow {
    match event {
        SessionEvent::IrcMessage { account, message } => {
            if let Err(e) = handle_irc_message(&mut state.controller, account, message) {
                warn!(%account, error = %e, "Failed to apply IRC message");
            }
        }
        SessionEvent::IrcDisconnected { account, reason } => {
            state.controller.connection_lost(account, &reason);
        }
        SessionEvent::IrcError { account, error } => {
            warn!(%account, %error, "IRC connection error");
        }
        SessionEvent::FlushLog(channel) => {
            if let Err(e) = state.controller.flush_log(&channel) {
                warn!(%channel, error = %e, "Failed to save log");
            }
        }
        SessionEvent::SaveAccounts => {
            if let Err(e) = state.save_accounts() {
                warn!(error = %e, "Failed to save accounts");
            }
        }
        SessionEvent::AutoJoin(account) => {
            if let Err(e) = state.controller.auto_join(account).await {
                warn!(%account, error = %e, "Auto-join failed");
            }
        }
        SessionEvent::Shutdown => return Flow::Quit,
    }
    Flow::Continue
}

/// Applies one inbound protocol message to the model.
pub fn handle_irc_message(
    controller: &mut SessionController,
    account: AccountId,
    message: Message,
) -> Result<(), SessionError> {
    let (nick_from, username) = match &message.prefix {
        Some(Prefix::Nickname(nick, user, _)) => (Some(nick.clone()), Some(user.clone()).filter(|u| !u.is_empty())),
        Some(Prefix::ServerName(_)) | None => (None, None),
    };

    match message.command {
        Command::PRIVMSG(target, text) => {
            let Some(nick) = nick_from else {
                return Ok(());
            };
            let text = match ctcp_body(&text) {
                Some(body) => match body.strip_prefix("ACTION ") {
                    Some(action) => format!("/me {}", action),
                    None => {
                        debug!(%account, from = %nick, ctcp = body, "Ignoring CTCP request");
                        return Ok(());
                    }
                },
                None => text,
            };
            controller.message_arrived(account, &target, &nick, username.as_deref(), &text)?;
        }

        Command::NOTICE(target, text) => {
            controller.notice_arrived(account, &target, nick_from.as_deref(), &text);
        }

        Command::JOIN(channel, _, _) => {
            if let Some(nick) = nick_from {
                controller.user_joined(account, &channel, &nick)?;
            }
        }

        Command::PART(channel, reason) => {
            if let Some(nick) = nick_from {
                let channel = ChannelRef::named(account, &channel);
                if controller.model().channel(&channel).is_some() {
                    controller.user_left(&channel, &nick, reason.as_deref())?;
                }
            }
        }

        Command::KICK(channel, kicked, reason) => {
            let channel = ChannelRef::named(account, &channel);
            if controller.model().channel(&channel).is_some() {
                let by = nick_from.unwrap_or_else(|| "server".to_string());
                let message = match reason.filter(|r| !r.is_empty()) {
                    Some(reason) => format!("kicked by {} ({})", by, reason),
                    None => format!("kicked by {}", by),
                };
                controller.user_left(&channel, &kicked, Some(&message))?;
            }
        }

        Command::QUIT(reason) => {
            if let Some(nick) = nick_from {
                controller.user_quit(account, &nick, reason.as_deref())?;
            }
        }

        Command::NICK(new_nick) => {
            if let Some(nick) = nick_from {
                controller.nick_changed(account, &nick, &new_nick);
            }
        }

        Command::Response(resp, args) => handle_numeric(controller, account, resp, &args)?,

        _ => {}
    }
    Ok(())
}

fn ctcp_body(text: &str) -> Option<&str> {
    text.strip_prefix('\x01')?.strip_suffix('\x01')
}

fn handle_numeric(
    controller: &mut SessionController,
    account: AccountId,
    resp: Response,
    args: &[String],
) -> Result<(), SessionError> {
    match resp {
        // RPL_WELCOME (001): first argument is the nick we were given
        Response::RPL_WELCOME => {
            if let Some(nick) = args.first() {
                controller.account_online(account, nick);
            }
        }
        // RPL_NAMREPLY (353)
        Response::RPL_NAMREPLY => {
            if args.len() >= 4 {
                let nicks: Vec<String> = args[3]
                    .split_whitespace()
                    .map(|name| name.trim_start_matches(['@', '+', '%', '~', '&']).to_string())
                    .collect();
                controller.users_present(account, &args[2], &nicks);
            }
        }
        // RPL_LIST (322)
        Response::RPL_LIST => {
            if let Some(channel) = args.get(1) {
                controller.channel_listed(account, channel)?;
            }
        }
        Response::ERR_NOSUCHCHANNEL
        | Response::ERR_TOOMANYCHANNELS
        | Response::ERR_CHANNELISFULL
        | Response::ERR_INVITEONLYCHAN
        | Response::ERR_BANNEDFROMCHAN
        | Response::ERR_BADCHANNELKEY => {
            if let Some(channel) = args.get(1) {
                let reason = args.get(2).map_or("rejected", String::as_str);
                controller.join_rejected(account, channel, reason);
            }
        }
        other => {
            debug!(%account, response = ?other, "Unhandled numeric");
        }
    }
    Ok(())
}

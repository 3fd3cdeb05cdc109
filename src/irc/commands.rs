//! Detection of protocol commands typed into a chat input.
//!
//! A line such as `/whois bob` is sent to the server as the raw line
//! `whois bob` instead of being posted as chat. Only lines whose first word
//! is a known IRC command qualify, so `/shrug` or `hello /slash` stay chat.

/// Commands of RFC 1459/2812 plus common server extensions.
const KNOWN_COMMANDS: &[&str] = &[
    "ADMIN", "AWAY", "CNOTICE", "CONNECT", "CPRIVMSG", "DIE", "ENCAP", "ERROR", "HELP", "INFO",
    "INVITE", "ISON", "JOIN", "KICK", "KILL", "KNOCK", "LINKS", "LIST", "LUSERS", "MODE", "MOTD",
    "NAMES", "NICK", "NOTICE", "OPER", "PART", "PASS", "PING", "PONG", "PRIVMSG", "QUIT",
    "REHASH", "RESTART", "RULES", "SERVER", "SERVICE", "SERVLIST", "SETNAME", "SILENCE", "SQUERY",
    "SQUIT", "STATS", "SUMMON", "TIME", "TOPIC", "TRACE", "USER", "USERHOST", "USERIP", "USERS",
    "VERSION", "WALLOPS", "WATCH", "WHO", "WHOIS", "WHOWAS",
];

/// A protocol command found at the start of an input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    /// Upper-cased command name.
    pub name: String,
    /// The line without the marker, as typed.
    pub line: String,
}

pub fn is_known_command(name: &str) -> bool {
    KNOWN_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Returns the command if `input` starts with `marker` followed by a known
/// command name.
pub fn initial_command(input: &str, marker: char) -> Option<RawCommand> {
    let line = input.strip_prefix(marker)?;
    let name = line.split(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r')).next()?;
    if name.is_empty() || !is_known_command(name) {
        return None;
    }
    Some(RawCommand {
        name: name.to_ascii_uppercase(),
        line: line.to_string(),
    })
}

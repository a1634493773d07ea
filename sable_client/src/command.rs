//! Outbound commands and their wire format.

use crate::error::ConnectionError;

use std::fmt;

/// A command to be queued for sending to the server.
///
/// The `Display` implementation renders the wire line, including the
/// terminating CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pass(String),
    Nick(String),
    User { user: String, realname: String },
    Join(String),
    Part(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Action { target: String, text: String },
    Who(String),
    Whois(String),
    Mode { target: String, modes: Vec<String> },
    Ping(String),
    Pong(String),
    Quit(Option<String>),
    Raw(String),
}

impl Command {
    /// Render the wire line, refusing arguments that would split it in two.
    pub fn to_line(&self) -> Result<String, ConnectionError> {
        let line = self.to_string();
        let body = line.strip_suffix("\r\n").unwrap_or(&line);

        if body.contains(|c| c == '\r' || c == '\n') {
            return Err(ConnectionError::EmbeddedLineBreak);
        }
        Ok(line)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(password) => write!(f, "PASS {}", password)?,
            Self::Nick(nick) => write!(f, "NICK {}", nick)?,
            Self::User { user, realname } => write!(f, "USER {} 0.0.0.0 0.0.0.0 :{}", user, realname)?,
            Self::Join(channel) => write!(f, "JOIN {}", channel)?,
            Self::Part(channel) => write!(f, "PART {}", channel)?,
            Self::Privmsg { target, text } => write!(f, "PRIVMSG {} :{}", target, text)?,
            Self::Notice { target, text } => write!(f, "NOTICE {} :{}", target, text)?,
            Self::Action { target, text } => write!(f, "PRIVMSG {} :\x01ACTION {}\x01", target, text)?,
            Self::Who(target) => write!(f, "WHO {}", target)?,
            // Asking the target's own server gets us idle time as well
            Self::Whois(nick) => write!(f, "WHOIS {} {}", nick, nick)?,
            Self::Mode { target, modes } if modes.is_empty() => write!(f, "MODE {}", target)?,
            Self::Mode { target, modes } => write!(f, "MODE {} {}", target, modes.join(" "))?,
            Self::Ping(token) => write!(f, "PING {}", token)?,
            Self::Pong(token) => write!(f, "PONG {}", token)?,
            Self::Quit(None) => write!(f, "QUIT")?,
            Self::Quit(Some(reason)) => write!(f, "QUIT :{}", reason)?,
            Self::Raw(line) => write!(f, "{}", line)?,
        }
        f.write_str("\r\n")
    }
}

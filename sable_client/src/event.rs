use crate::error::FramingError;

/// A framed line received from the server.
///
/// Events are created once per inbound line, handed by reference to every
/// matching callback, and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The line as received, without its terminator
    pub raw: String,
    /// The origin prefix, without the leading ':'. Empty if there was none.
    pub source: String,
    /// Nick component of the origin, if it had the form `nick!user@host`
    pub nick: String,
    /// User component of the origin
    pub user: String,
    /// Host component of the origin
    pub host: String,
    /// The command or numeric, uppercased
    pub code: String,
    /// Positional arguments, followed by the trailing argument if present
    pub arguments: Vec<String>,
}

impl Event {
    /// Frame a line received from the server. The line terminator must already
    /// have been stripped.
    pub fn parse(raw: &str) -> Result<Self, FramingError> {
        if raw.is_empty() {
            return Err(FramingError::MalformedLine);
        }

        let mut source = "";
        let mut rest = raw;

        if let Some(prefixed) = raw.strip_prefix(':') {
            match prefixed.split_once(' ') {
                Some((origin, remainder)) => {
                    source = origin;
                    rest = remainder;
                }
                None => {
                    tracing::warn!("Malformed message from server: {}", raw);
                }
            }
        }

        let (nick, user, host) = split_origin(source).unwrap_or_else(|| {
            if !source.is_empty() {
                tracing::trace!(source, "Origin is not of the form nick!user@host");
            }
            ("", "", "")
        });

        let (positional, trailing) = match rest.split_once(" :") {
            Some((positional, trailing)) => (positional, Some(trailing)),
            None => (rest, None),
        };

        let mut tokens = positional.split(' ');
        let code = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let mut arguments: Vec<String> = tokens.map(str::to_string).collect();

        if let Some(trailing) = trailing {
            arguments.push(trailing.to_string());
        }

        Ok(Self {
            raw: raw.to_string(),
            source: source.to_string(),
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            code,
            arguments,
        })
    }

    /// The last argument, which for most commands is the free-text body.
    pub fn message(&self) -> &str {
        self.arguments.last().map(String::as_str).unwrap_or("")
    }
}

fn split_origin(source: &str) -> Option<(&str, &str, &str)> {
    let (nick, user_host) = source.split_once('!')?;
    let (user, host) = user_host.split_once('@')?;
    Some((nick, user, host))
}

use sable_client::*;

use std::env;

/// Joins a channel and echoes back anything said to it.
///
/// Usage: echo_bot <host:port> <channel> [nick]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let server = args.next().ok_or("no server given")?;
    let channel = args.next().ok_or("no channel given")?;
    let nick = args.next().unwrap_or_else(|| "echobot".to_string());

    let mut config = ClientConfig::new(nick.as_str(), "echobot");
    config.verbose = true;
    config.log = Some(LogEntry {
        target: LogTarget::Builtin(BuiltinLogTarget::Stdout),
        modules: Vec::new(),
        level: Some(LogLevel::Debug),
    });

    let conn = Connection::new(config)?;

    let handle = conn.clone();
    conn.add_callback("001", move |_| {
        handle.try_send(Command::Join(channel.clone()))?;
        Ok(())
    });

    let handle = conn.clone();
    conn.add_callback("PRIVMSG", move |event| {
        let Some(target) = event.arguments.first() else {
            return Ok(());
        };
        // Replies to private messages go back to the sender
        let reply_to = if target.starts_with('#') { target } else { &event.nick };
        handle.try_send(Command::Privmsg {
            target: reply_to.to_string(),
            text: event.message().to_string(),
        })?;
        Ok(())
    });

    conn.connect(&server).await?;
    conn.run().await?;

    Ok(())
}

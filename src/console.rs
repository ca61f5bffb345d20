//! Line-based chat transport over stdin/stdout.
//!
//! Every input line is a chat message from the console user, who sits in
//! the configured voice channel (or in none). Replies are printed to
//! stdout; logs go to stderr.

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::{
    command::Command,
    controller::{ControllerHandle, Origin, Reply},
    error::Result,
};

/// Name of the text channel console replies are addressed to.
pub const CONSOLE_CHANNEL: &str = "console";

pub struct ConsoleTransport {
    prefix: String,
    voice_channel: Option<String>,
}

impl ConsoleTransport {
    pub fn new(prefix: impl Into<String>, voice_channel: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            voice_channel,
        }
    }

    pub fn origin(&self) -> Origin {
        Origin {
            text_channel: CONSOLE_CHANNEL.to_string(),
            voice_channel: self.voice_channel.clone(),
        }
    }

    /// Forwards `line` if it is a command. Returns whether it was one.
    pub fn dispatch(&self, line: &str, handle: &ControllerHandle) -> Result<bool> {
        match Command::parse(line, &self.prefix) {
            Some(command) => {
                handle.submit(command, self.origin())?;
                Ok(true)
            }
            None => {
                debug!("Ignoring chat line without prefix");
                Ok(false)
            }
        }
    }
}

pub fn format_reply(reply: &Reply) -> String {
    format!("[{}] {}", reply.channel, reply.text)
}

/// Prints replies until every sender is gone.
pub async fn print_replies(mut replies: UnboundedReceiver<Reply>) {
    while let Some(reply) = replies.recv().await {
        println!("{}", format_reply(&reply));
    }
}

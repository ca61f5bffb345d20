//! Parsing chat messages into commands.

/// One chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `play <link>`; the argument may be empty.
    Play(String),
    Queue,
    Skip,
    Stop,
    Clear,
    Pause,
    Resume,
    Help,
    Unknown(String),
}

impl Command {
    /// Parses `message`, or returns `None` when it is not a command.
    pub fn parse(message: &str, prefix: &str) -> Option<Self> {
        let body = message.trim().strip_prefix(prefix)?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let argument = parts.next().unwrap_or_default().trim();

        let command = match name.to_lowercase().as_str() {
            "play" => Command::Play(argument.to_string()),
            "queue" => Command::Queue,
            "skip" => Command::Skip,
            "stop" => Command::Stop,
            "clear" => Command::Clear,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "help" => Command::Help,
            _ => Command::Unknown(name.to_string()),
        };
        Some(command)
    }
}

pub fn help_text(prefix: &str) -> String {
    format!(
        "Available commands:\n\
         `{p}play <link>` - play a YouTube track or add it to the queue\n\
         `{p}queue` - show the queue\n\
         `{p}skip` - skip the current track\n\
         `{p}stop` - disconnect and clear the queue\n\
         `{p}clear` - clear the queue\n\
         `{p}pause` - pause playback\n\
         `{p}resume` - resume playback\n\
         `{p}help` - show this help",
        p = prefix
    )
}

pub fn unknown_text(prefix: &str) -> String {
    format!("Unknown command. Use `{}help` to see the available commands.", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_argument() {
        assert_eq!(
            Command::parse("!play https://youtu.be/X", "!"),
            Some(Command::Play("https://youtu.be/X".to_string()))
        );
        assert_eq!(
            Command::parse("  !PLAY   https://youtu.be/X  ", "!"),
            Some(Command::Play("https://youtu.be/X".to_string()))
        );
    }

    #[test]
    fn play_without_argument_keeps_an_empty_link() {
        assert_eq!(Command::parse("!play", "!"), Some(Command::Play(String::new())));
    }

    #[test]
    fn simple_commands() {
        assert_eq!(Command::parse("!queue", "!"), Some(Command::Queue));
        assert_eq!(Command::parse("!skip", "!"), Some(Command::Skip));
        assert_eq!(Command::parse("!stop", "!"), Some(Command::Stop));
        assert_eq!(Command::parse("!clear", "!"), Some(Command::Clear));
        assert_eq!(Command::parse("!pause", "!"), Some(Command::Pause));
        assert_eq!(Command::parse("!resume", "!"), Some(Command::Resume));
        assert_eq!(Command::parse("!help", "!"), Some(Command::Help));
    }

    #[test]
    fn unknown_and_plain_messages() {
        assert_eq!(
            Command::parse("!dance", "!"),
            Some(Command::Unknown("dance".to_string()))
        );
        assert_eq!(Command::parse("hello there", "!"), None);
        assert_eq!(Command::parse("?play x", "!"), None);
    }

    #[test]
    fn custom_prefix() {
        assert_eq!(Command::parse("$$skip", "$$"), Some(Command::Skip));
        assert!(help_text("$$").contains("`$$play <link>`"));
        assert!(unknown_text("$$").contains("`$$help`"));
    }
}

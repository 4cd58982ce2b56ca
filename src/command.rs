/// A chat command recognized from the raw message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/topic <text>`
    Topic(String),
    /// `/phrase <text>`
    Phrase(String),
    /// `/anything <text>`
    Anything(String),
    Unrecognized,
}

impl Command {
    /// Classify message text by its literal command prefix.
    ///
    /// The prefix includes a single trailing space and is case-sensitive.
    /// The argument is the remainder with surrounding whitespace trimmed.
    pub fn parse(text: &str) -> Self {
        if let Some(arg) = text.strip_prefix("/topic ") {
            Command::Topic(arg.trim().to_string())
        } else if let Some(arg) = text.strip_prefix("/phrase ") {
            Command::Phrase(arg.trim().to_string())
        } else if let Some(arg) = text.strip_prefix("/anything ") {
            Command::Anything(arg.trim().to_string())
        } else {
            Command::Unrecognized
        }
    }

    /// The user argument, or None for unrecognized text
    pub fn argument(&self) -> Option<&str> {
        match self {
            Command::Topic(arg) | Command::Phrase(arg) | Command::Anything(arg) => Some(arg),
            Command::Unrecognized => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Topic(_) => "topic",
            Command::Phrase(_) => "phrase",
            Command::Anything(_) => "anything",
            Command::Unrecognized => "unrecognized",
        }
    }
}

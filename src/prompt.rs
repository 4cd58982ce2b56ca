use crate::command::Command;
use crate::config::SettingsConfig;

/// Build the completion prompt for a command: template, label, argument.
///
/// /topic and /phrase use the standard preamble, /anything the alternate one.
/// The argument is passed through verbatim.
pub fn build(command: &Command, settings: &SettingsConfig) -> Option<String> {
    let (template, label, argument) = match command {
        Command::Topic(arg) => (&settings.preamble_text, "TOPIC: ", arg),
        Command::Phrase(arg) => (&settings.preamble_text, "PHRASE: ", arg),
        Command::Anything(arg) => (&settings.preamble_text_alt, "QUESTION: ", arg),
        Command::Unrecognized => return None,
    };

    let mut prompt = String::with_capacity(template.len() + label.len() + argument.len());
    prompt.push_str(template);
    prompt.push_str(label);
    prompt.push_str(argument);
    Some(prompt)
}

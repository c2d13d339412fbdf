use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use thiserror::Error;

use crate::avatar::Gender;
use crate::form::{FormError, Grade, Medium, VoiceLanguage};

pub const HELP: &str = "\
Commands:
  /grade <1|2|3|none>        choose the grade (resets the subject)
  /medium <english|gujarati> choose the medium (needs a grade)
  /subject <name>            choose a subject
  /subjects                  list subjects for the current grade/medium
  /lang <en-IN|hi-IN|gu-IN>  voice language
  /avatar <male|female>      choose the teacher
  /attach <path>             attach a file to the next question
  /detach                    drop the attachment
  /listen, /stop             start/stop speech input (also Space or Ctrl+Shift+,)
  /send                      send the pending input
  /history                   show the conversation
  /status                    show the current selections
  /quit                      exit
Anything else is sent as a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Grade(Option<Grade>),
    Medium(Medium),
    Subject(String),
    Subjects,
    Language(VoiceLanguage),
    Avatar(Gender),
    Attach(PathBuf),
    Detach,
    Listen,
    Stop,
    Send,
    /// Plain text: becomes the input and is sent
    Say(String),
    History,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Unknown command '/{0}' (try /help)")]
    UnknownCommand(String),
    #[error("/{0} needs an argument (try /help)")]
    MissingArgument(&'static str),
    #[error("Unknown avatar '{0}' (expected male or female)")]
    UnknownAvatar(String),
    #[error(transparent)]
    Form(#[from] FormError),
}

fn required<'a>(command: &'static str, arg: &'a str) -> Result<&'a str, ConsoleError> {
    if arg.is_empty() {
        Err(ConsoleError::MissingArgument(command))
    } else {
        Ok(arg)
    }
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ConsoleCommand::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "grade" => match required("grade", arg)?.to_lowercase().as_str() {
            "none" | "-" => ConsoleCommand::Grade(None),
            other => ConsoleCommand::Grade(Some(other.parse()?)),
        },
        "medium" => ConsoleCommand::Medium(required("medium", arg)?.parse()?),
        "subject" => ConsoleCommand::Subject(required("subject", arg)?.to_string()),
        "subjects" => ConsoleCommand::Subjects,
        "lang" => ConsoleCommand::Language(required("lang", arg)?.parse()?),
        "avatar" => match required("avatar", arg)?.to_lowercase().as_str() {
            "male" => ConsoleCommand::Avatar(Gender::Male),
            "female" => ConsoleCommand::Avatar(Gender::Female),
            other => return Err(ConsoleError::UnknownAvatar(other.to_string())),
        },
        "attach" => ConsoleCommand::Attach(PathBuf::from(required("attach", arg)?)),
        "detach" => ConsoleCommand::Detach,
        "listen" => ConsoleCommand::Listen,
        "stop" => ConsoleCommand::Stop,
        "send" => ConsoleCommand::Send,
        "history" => ConsoleCommand::History,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

/// Read stdin on a background thread, handing each command to `deliver`
/// until it returns `false` or stdin closes.
pub fn spawn<F>(deliver: F) -> std::io::Result<thread::JoinHandle<()>>
where
    F: Fn(ConsoleCommand) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("Console read failed: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(command)) => {
                        if !deliver(command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            log::debug!("Console reader finished");
        })
}

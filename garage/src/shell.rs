//! Line commands for the interactive front-end.

use shared::protocol::{CarId, SortField};
use std::path::PathBuf;
use thiserror::Error;

pub const HELP: &str = "\
navigation:  goto <path> | back | forward | show | help | quit
garage:      create <#rrggbb> <name> | select <id> | update <#rrggbb> <name>
             delete <id> | generate [n] | next | prev
race:        race | reset | start <id> | stop <id>
winners:     sort wins|time | next | prev
wheel:       add <text>[,weight] | text <id> <text> | weight <id> <w>
             remove <id> | clear | paste <file> | export <file> | import <file>
             spin | duration <secs> | mute";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Goto(String),
    Back,
    Forward,
    Show,
    Help,
    Quit,
    Create { color: String, name: String },
    Select(CarId),
    Update { color: String, name: String },
    Delete(CarId),
    Generate(Option<usize>),
    Next,
    Prev,
    Race,
    Reset,
    StartCar(CarId),
    StopCar(CarId),
    Sort(SortField),
    AddOption { text: String, weight: Option<String> },
    SetText { id: u32, text: String },
    SetWeight { id: u32, weight: String },
    RemoveOption(u32),
    ClearOptions,
    Paste(PathBuf),
    Export(PathBuf),
    Import(PathBuf),
    Spin,
    Duration(String),
    Mute,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// `None` for a blank line.
pub fn parse_command(line: &str) -> Option<Result<Command, CommandError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    Some(parse_words(&word.to_lowercase(), rest))
}

fn parse_words(word: &str, rest: &str) -> Result<Command, CommandError> {
    let command = match word {
        "goto" | "go" => Command::Goto(required(rest, "goto <path>")?.to_string()),
        "back" => Command::Back,
        "forward" => Command::Forward,
        "show" | "ls" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "create" => {
            let (color, name) = color_and_name(rest, "create <#rrggbb> <name>")?;
            Command::Create { color, name }
        }
        "update" => {
            let (color, name) = color_and_name(rest, "update <#rrggbb> <name>")?;
            Command::Update { color, name }
        }
        "select" => Command::Select(number(rest, "select <id>")?),
        "delete" => Command::Delete(number(rest, "delete <id>")?),
        "generate" => match rest {
            "" => Command::Generate(None),
            n => Command::Generate(Some(number(n, "generate [count]")?)),
        },
        "next" => Command::Next,
        "prev" => Command::Prev,
        "race" => Command::Race,
        "reset" => Command::Reset,
        "start" => Command::StartCar(number(rest, "start <id>")?),
        "stop" => Command::StopCar(number(rest, "stop <id>")?),
        "sort" => match rest {
            "wins" => Command::Sort(SortField::Wins),
            "time" => Command::Sort(SortField::Time),
            _ => return Err(CommandError::Usage("sort wins|time")),
        },
        "add" => {
            // `text` may itself contain commas; only a numeric tail is a weight
            match rest.rsplit_once(',') {
                Some((text, weight)) if weight.trim().parse::<f64>().is_ok() => Command::AddOption {
                    text: text.trim().to_string(),
                    weight: Some(weight.trim().to_string()),
                },
                _ => Command::AddOption {
                    text: rest.to_string(),
                    weight: None,
                },
            }
        }
        "text" => {
            let (id, text) = id_and_rest(rest, "text <id> <text>")?;
            Command::SetText { id, text }
        }
        "weight" => {
            let (id, weight) = id_and_rest(rest, "weight <id> <weight>")?;
            Command::SetWeight { id, weight }
        }
        "remove" => Command::RemoveOption(number(rest, "remove <id>")?),
        "clear" => Command::ClearOptions,
        "paste" => Command::Paste(required(rest, "paste <file>")?.into()),
        "export" => Command::Export(required(rest, "export <file>")?.into()),
        "import" => Command::Import(required(rest, "import <file>")?.into()),
        "spin" => Command::Spin,
        "duration" => Command::Duration(required(rest, "duration <seconds>")?.to_string()),
        "mute" => Command::Mute,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(rest)
    }
}

fn number<T: std::str::FromStr>(rest: &str, usage: &'static str) -> Result<T, CommandError> {
    rest.parse().map_err(|_| CommandError::Usage(usage))
}

fn color_and_name(rest: &str, usage: &'static str) -> Result<(String, String), CommandError> {
    let (color, name) = rest
        .split_once(char::is_whitespace)
        .ok_or(CommandError::Usage(usage))?;
    Ok((color.to_string(), name.trim().to_string()))
}

fn id_and_rest(rest: &str, usage: &'static str) -> Result<(u32, String), CommandError> {
    let (id, value) = rest
        .split_once(char::is_whitespace)
        .ok_or(CommandError::Usage(usage))?;
    Ok((number(id, usage)?, value.trim().to_string()))
}

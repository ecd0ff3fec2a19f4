use std::fmt;

use super::command_registry::find_command;
use crate::queue::{InputMode, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Image,
    Text,
}

impl RouteTarget {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "image" | "img" => Some(Self::Image),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Text => f.write_str("text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioCommand {
    Noop,
    Help,
    Quit,
    Styles,
    List,
    Run,
    Clear,
    Accept,
    Mode(InputMode),
    Title { title: String, prompt: String },
    Url(String),
    Style(String),
    Provider { target: RouteTarget, provider: String },
    Model { target: RouteTarget, model: String },
    Refine { job_id: ItemId, instruction: String },
    Remove(ItemId),
    Export { archive: bool, dir: Option<String> },
    Analyze(String),
    /// A plain line, queued according to the current input mode.
    Text(String),
    Invalid { command: String, message: String },
    Unknown { command: String, arg: String },
}

impl StudioCommand {
    fn invalid(command: &str) -> Self {
        let usage = find_command(command)
            .map(|spec| spec.usage)
            .unwrap_or_default();
        Self::Invalid {
            command: command.to_string(),
            message: format!("usage: {usage}"),
        }
    }
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> Option<String> {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(parts.join(" ")),
    }
}

fn parse_id(raw: &str) -> Option<ItemId> {
    raw.trim().trim_start_matches('#').parse::<ItemId>().ok()
}

/// Splits `title | prompt`. Without a separator the whole line is the title.
pub fn split_title_prompt(text: &str) -> (String, String) {
    match text.split_once('|') {
        Some((title, prompt)) => (title.trim().to_string(), prompt.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

fn parse_route(arg: &str) -> Option<(RouteTarget, String)> {
    let (target, value) = arg.split_once(char::is_whitespace)?;
    let target = RouteTarget::parse(target)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((target, value.to_string()))
}

pub fn parse_command(text: &str) -> StudioCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return StudioCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return StudioCommand::Text(raw_trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return StudioCommand::Text(raw_trimmed.to_string());
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    match command.as_str() {
        "help" => StudioCommand::Help,
        "quit" | "exit" => StudioCommand::Quit,
        "styles" => StudioCommand::Styles,
        "list" => StudioCommand::List,
        "run" => StudioCommand::Run,
        "clear" => StudioCommand::Clear,
        "accept" => StudioCommand::Accept,
        "mode" => match arg.parse::<InputMode>() {
            Ok(mode) => StudioCommand::Mode(mode),
            Err(message) => StudioCommand::Invalid {
                command: command.clone(),
                message,
            },
        },
        "title" => {
            let (title, prompt) = split_title_prompt(arg);
            if title.is_empty() && prompt.is_empty() {
                return StudioCommand::invalid("title");
            }
            StudioCommand::Title { title, prompt }
        }
        "url" => match parse_single_path_arg(arg) {
            Some(url) => StudioCommand::Url(url),
            None => StudioCommand::invalid("url"),
        },
        "style" => {
            if arg.is_empty() {
                return StudioCommand::invalid("style");
            }
            StudioCommand::Style(arg.to_ascii_lowercase())
        }
        "provider" => match parse_route(arg) {
            Some((target, provider)) => StudioCommand::Provider {
                target,
                provider: provider.to_ascii_lowercase(),
            },
            None => StudioCommand::invalid("provider"),
        },
        "model" => match parse_route(arg) {
            Some((target, model)) => StudioCommand::Model { target, model },
            None => StudioCommand::invalid("model"),
        },
        "refine" => {
            let Some((id, instruction)) = arg.split_once(char::is_whitespace) else {
                return StudioCommand::invalid("refine");
            };
            match (parse_id(id), instruction.trim()) {
                (Some(job_id), instruction) if !instruction.is_empty() => StudioCommand::Refine {
                    job_id,
                    instruction: instruction.to_string(),
                },
                _ => StudioCommand::invalid("refine"),
            }
        }
        "remove" => match parse_id(arg) {
            Some(id) => StudioCommand::Remove(id),
            None => StudioCommand::invalid("remove"),
        },
        "zip" | "files" => StudioCommand::Export {
            archive: command == "zip",
            dir: parse_single_path_arg(arg),
        },
        "analyze" => {
            if arg.is_empty() {
                return StudioCommand::invalid("analyze");
            }
            StudioCommand::Analyze(arg.to_string())
        }
        _ => StudioCommand::Unknown {
            command: command.clone(),
            arg: arg.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, split_title_prompt, RouteTarget, StudioCommand};
    use crate::queue::InputMode;

    #[test]
    fn plain_lines_and_blank_input() {
        assert_eq!(parse_command("   "), StudioCommand::Noop);
        assert_eq!(
            parse_command("  a lighthouse at dusk "),
            StudioCommand::Text("a lighthouse at dusk".to_string())
        );
        assert_eq!(
            parse_command("/ not a command"),
            StudioCommand::Text("/ not a command".to_string())
        );
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_command("/run"), StudioCommand::Run);
        assert_eq!(parse_command("/LIST"), StudioCommand::List);
        assert_eq!(parse_command("/exit"), StudioCommand::Quit);
        assert_eq!(parse_command("/accept"), StudioCommand::Accept);
    }

    #[test]
    fn parse_mode_and_reject_unknown_mode() {
        assert_eq!(
            parse_command("/mode title"),
            StudioCommand::Mode(InputMode::TitlePrompt)
        );
        assert!(matches!(
            parse_command("/mode gallery"),
            StudioCommand::Invalid { .. }
        ));
    }

    #[test]
    fn parse_title_with_and_without_prompt() {
        assert_eq!(
            parse_command("/title Chapter 1 | a harbor at dawn"),
            StudioCommand::Title {
                title: "Chapter 1".to_string(),
                prompt: "a harbor at dawn".to_string(),
            }
        );
        assert_eq!(
            split_title_prompt("Only a title"),
            ("Only a title".to_string(), String::new())
        );
        assert!(matches!(
            parse_command("/title  | "),
            StudioCommand::Invalid { .. }
        ));
    }

    #[test]
    fn parse_routes() {
        assert_eq!(
            parse_command("/provider image Stability"),
            StudioCommand::Provider {
                target: RouteTarget::Image,
                provider: "stability".to_string(),
            }
        );
        assert_eq!(
            parse_command("/model text command-r"),
            StudioCommand::Model {
                target: RouteTarget::Text,
                model: "command-r".to_string(),
            }
        );
        assert!(matches!(
            parse_command("/provider audio openai"),
            StudioCommand::Invalid { .. }
        ));
    }

    #[test]
    fn parse_refine_requires_id_and_instruction() {
        assert_eq!(
            parse_command("/refine #3 make it night"),
            StudioCommand::Refine {
                job_id: 3,
                instruction: "make it night".to_string(),
            }
        );
        let invalid = parse_command("/refine 3");
        assert_eq!(
            invalid,
            StudioCommand::Invalid {
                command: "refine".to_string(),
                message: "usage: /refine <job-id> <instruction>".to_string(),
            }
        );
        assert!(matches!(
            parse_command("/refine three make it night"),
            StudioCommand::Invalid { .. }
        ));
    }

    #[test]
    fn parse_export_quoted_dir() {
        assert_eq!(
            parse_command("/zip \"/tmp/my exports\""),
            StudioCommand::Export {
                archive: true,
                dir: Some("/tmp/my exports".to_string()),
            }
        );
        assert_eq!(
            parse_command("/files"),
            StudioCommand::Export {
                archive: false,
                dir: None,
            }
        );
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_command("/magic foo bar"),
            StudioCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const STUDIO_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        usage: "/help",
        summary: "show this list",
    },
    CommandSpec {
        command: "mode",
        usage: "/mode url|title|prompt",
        summary: "how plain lines are queued",
    },
    CommandSpec {
        command: "title",
        usage: "/title <title> [| <prompt>]",
        summary: "queue a title, optionally followed by a prompt",
    },
    CommandSpec {
        command: "url",
        usage: "/url <image-url>",
        summary: "queue an external image reference",
    },
    CommandSpec {
        command: "style",
        usage: "/style <value>",
        summary: "select the style applied to new prompts",
    },
    CommandSpec {
        command: "styles",
        usage: "/styles",
        summary: "list available styles",
    },
    CommandSpec {
        command: "provider",
        usage: "/provider image|text <provider>",
        summary: "route image or text calls to a provider",
    },
    CommandSpec {
        command: "model",
        usage: "/model image|text <model>",
        summary: "pick the model for image or text calls",
    },
    CommandSpec {
        command: "list",
        usage: "/list",
        summary: "show the queue",
    },
    CommandSpec {
        command: "run",
        usage: "/run",
        summary: "generate every pending job",
    },
    CommandSpec {
        command: "refine",
        usage: "/refine <job-id> <instruction>",
        summary: "edit a generated image",
    },
    CommandSpec {
        command: "remove",
        usage: "/remove <item-id>",
        summary: "remove one queue item",
    },
    CommandSpec {
        command: "clear",
        usage: "/clear",
        summary: "empty the queue",
    },
    CommandSpec {
        command: "zip",
        usage: "/zip [dir]",
        summary: "export completed images as one archive",
    },
    CommandSpec {
        command: "files",
        usage: "/files [dir]",
        summary: "export completed images as individual files",
    },
    CommandSpec {
        command: "analyze",
        usage: "/analyze <text>|@<file>",
        summary: "extract prompts from a block of text",
    },
    CommandSpec {
        command: "accept",
        usage: "/accept",
        summary: "queue the prompts from the last /analyze",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
        summary: "finish the session",
    },
];

pub fn find_command(command: &str) -> Option<&'static CommandSpec> {
    STUDIO_COMMANDS.iter().find(|spec| spec.command == command)
}

pub fn help_lines() -> Vec<String> {
    let width = STUDIO_COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    STUDIO_COMMANDS
        .iter()
        .map(|spec| format!("{:<width$}  {}", spec.usage, spec.summary))
        .collect()
}

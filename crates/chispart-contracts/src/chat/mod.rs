mod command_parser;
mod command_registry;

pub use command_parser::{parse_command, split_title_prompt, RouteTarget, StudioCommand};
pub use command_registry::{find_command, help_lines, CommandSpec, STUDIO_COMMANDS};

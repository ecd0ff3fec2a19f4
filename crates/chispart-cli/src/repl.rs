use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::Result;
use chispart_contracts::chat::{help_lines, parse_command, split_title_prompt, RouteTarget, StudioCommand};
use chispart_contracts::providers::Capability;
use chispart_contracts::queue::{InputMode, InsertOutcome, QueueInput, QueueItem};
use chispart_engine::export::ExportMode;
use chispart_engine::studio::BulkInsertReport;
use chispart_engine::{ProviderRoute, RefinementOutcome, Studio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive studio session. `handle` turns one input line into output
/// lines; `run` wires it to stdin.
pub struct Repl {
    studio: Studio,
    mode: InputMode,
    export_dir: PathBuf,
}

impl Repl {
    pub fn new(studio: Studio, export_dir: PathBuf) -> Self {
        Self {
            studio,
            mode: InputMode::default(),
            export_dir,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut line = String::new();
        println!("Chispart studio started. Type /help for commands.");
        loop {
            print!("[{}] > ", self.mode);
            io::stdout().flush()?;

            line.clear();
            let read = match stdin.read_line(&mut line) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                break;
            }
            let (flow, output) = self.handle(line.trim_end_matches(['\n', '\r']));
            for row in output {
                println!("{row}");
            }
            if flow == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, line: &str) -> (Flow, Vec<String>) {
        let mut out = Vec::new();
        match parse_command(line) {
            StudioCommand::Noop => {}
            StudioCommand::Quit => return (Flow::Quit, out),
            StudioCommand::Help => out.extend(help_lines()),
            StudioCommand::Styles => {
                let current = self.studio.snapshot().style.value;
                for style in self.studio.styles().list() {
                    let marker = if style.value == current { "*" } else { " " };
                    out.push(format!("{marker} {:<18} {}", style.value, style.name));
                }
            }
            StudioCommand::List => out.extend(self.list_lines()),
            StudioCommand::Mode(mode) => {
                self.mode = mode;
                out.push(format!("Input mode: {mode}"));
            }
            StudioCommand::Title { title, prompt } => {
                let input = QueueInput::TitlePrompt { title, prompt };
                self.insert(input, &mut out);
            }
            StudioCommand::Url(url) => self.insert(QueueInput::Url(url), &mut out),
            StudioCommand::Text(text) => {
                let input = match self.mode {
                    InputMode::Url => QueueInput::Url(text),
                    InputMode::TitlePrompt => {
                        let (title, prompt) = split_title_prompt(&text);
                        QueueInput::TitlePrompt { title, prompt }
                    }
                    InputMode::PromptOnly => QueueInput::PromptOnly(text),
                };
                self.insert(input, &mut out);
            }
            StudioCommand::Style(value) => match self.studio.set_style(&value) {
                Ok(style) => out.push(format!("Style set to {}", style.name)),
                Err(err) => out.push(format!("{err} Use /styles to list them.")),
            },
            StudioCommand::Provider { target, provider } => {
                let route = ProviderRoute::new(provider, "");
                let label = route.provider.clone();
                match self.studio.set_route(capability_for(target), route) {
                    Ok(()) => out.push(format!("{target} provider set to {label} (default model)")),
                    Err(err) => out.push(err.to_string()),
                }
            }
            StudioCommand::Model { target, model } => {
                match self.studio.set_model(capability_for(target), &model) {
                    Ok(()) => out.push(format!("{target} model set to {model}")),
                    Err(err) => out.push(err.to_string()),
                }
            }
            StudioCommand::Run => match self.studio.run_batch() {
                Ok(report) => {
                    for job_id in &report.completed {
                        out.push(format!("#{job_id} completed"));
                    }
                    for failure in &report.failed {
                        out.push(format!("#{} failed: {}", failure.job_id, failure.error));
                    }
                    out.push(format!(
                        "Batch finished: {} completed, {} failed.",
                        report.completed.len(),
                        report.failed.len()
                    ));
                }
                Err(err) => out.push(err.to_string()),
            },
            StudioCommand::Refine {
                job_id,
                instruction,
            } => match self.studio.refine(job_id, &instruction) {
                Ok(RefinementOutcome::Refined { .. }) => out.push(format!("#{job_id} refined")),
                Ok(RefinementOutcome::Failed { error }) => {
                    out.push(format!("#{job_id} kept its previous image: {error}"))
                }
                Err(err) => out.push(err.to_string()),
            },
            StudioCommand::Remove(id) => match self.studio.remove(id) {
                Ok(item) => out.push(format!("Removed #{id} ({})", item.kind())),
                Err(err) => out.push(err.to_string()),
            },
            StudioCommand::Clear => match self.studio.clear() {
                Ok(removed) => out.push(format!("Cleared {removed} items.")),
                Err(err) => out.push(err.to_string()),
            },
            StudioCommand::Export { archive, dir } => {
                let mode = if archive {
                    ExportMode::Archive
                } else {
                    ExportMode::Individual
                };
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| self.export_dir.clone());
                match self.studio.export(mode, &dir) {
                    Ok(report) => {
                        for path in &report.written {
                            out.push(format!("Wrote {}", path.display()));
                        }
                        for skip in &report.skipped {
                            out.push(format!("Skipped #{}: {}", skip.job_id, skip.error));
                        }
                    }
                    Err(err) => out.push(err.to_string()),
                }
            }
            StudioCommand::Analyze(arg) => self.analyze(&arg, &mut out),
            StudioCommand::Accept => match self.studio.accept_extracted() {
                Ok(report) => bulk_lines(&report, &mut out),
                Err(err) => out.push(err.to_string()),
            },
            StudioCommand::Invalid { command, message } => out.push(format!("/{command}: {message}")),
            StudioCommand::Unknown { command, .. } => {
                out.push(format!("Unknown command /{command}. Type /help for commands."))
            }
        }
        (Flow::Continue, out)
    }

    fn insert(&self, input: QueueInput, out: &mut Vec<String>) {
        match self.studio.insert(input) {
            Ok(outcome) => out.extend(self.outcome_lines(&outcome)),
            Err(err) => out.push(err.to_string()),
        }
    }

    fn outcome_lines(&self, outcome: &InsertOutcome) -> Vec<String> {
        let snapshot = self.studio.snapshot();
        outcome
            .ids
            .iter()
            .filter_map(|id| snapshot.items.iter().find(|item| item.id() == *id))
            .map(describe_item)
            .collect()
    }

    fn analyze(&self, arg: &str, out: &mut Vec<String>) {
        let text = match arg.strip_prefix('@') {
            Some(path) => match fs::read_to_string(path.trim()) {
                Ok(text) => text,
                Err(err) => {
                    out.push(format!("Could not read {}: {err}", path.trim()));
                    return;
                }
            },
            None => arg.to_string(),
        };
        match self.studio.extract_prompts(&text) {
            Ok(prompts) if prompts.is_empty() => out.push("No prompts found.".to_string()),
            Ok(prompts) => {
                for (index, prompt) in prompts.iter().enumerate() {
                    out.push(format!("{:>2}. {prompt}", index + 1));
                }
                out.push("Use /accept to queue them.".to_string());
            }
            Err(err) => out.push(err.to_string()),
        }
    }

    fn list_lines(&self) -> Vec<String> {
        let snapshot = self.studio.snapshot();
        let mut lines = vec![format!(
            "{} items ({} max), {} jobs ({} max) | style {} | image {}:{} | text {}:{} | {}",
            snapshot.items.len(),
            snapshot.limits.max_items,
            snapshot.counts.total(),
            snapshot.limits.max_jobs,
            snapshot.style.value,
            snapshot.image_route.provider,
            route_model(&snapshot.image_route),
            snapshot.text_route.provider,
            route_model(&snapshot.text_route),
            snapshot.activity,
        )];
        if snapshot.items.is_empty() {
            lines.push("Queue is empty.".to_string());
        }
        lines.extend(snapshot.items.iter().map(describe_item));
        lines
    }
}

fn capability_for(target: RouteTarget) -> Capability {
    match target {
        RouteTarget::Image => Capability::ImageGeneration,
        RouteTarget::Text => Capability::TextGeneration,
    }
}

fn route_model(route: &ProviderRoute) -> &str {
    if route.model.is_empty() {
        "default"
    } else {
        route.model.as_str()
    }
}

fn describe_image(url: &str) -> String {
    match url.split_once(',') {
        Some((header, payload)) if url.starts_with("data:") => {
            let mime = header.trim_start_matches("data:").trim_end_matches(";base64");
            format!("inline {mime}, ~{} bytes", payload.len() * 3 / 4)
        }
        _ => url.to_string(),
    }
}

fn describe_item(item: &QueueItem) -> String {
    match item {
        QueueItem::TitleComment { id, text } => format!("#{id} [title] {text}"),
        QueueItem::ExternalImage { id, image_url } => {
            format!("#{id} [image] {}", describe_image(image_url))
        }
        QueueItem::SkippedPrompt { id, text, reason } => {
            format!("#{id} [skipped] {text} ({reason})")
        }
        QueueItem::PromptJob(job) => {
            let mut line = format!("#{} [{}] {}", job.id(), job.status(), job.styled_prompt());
            if let Some(url) = job.image_url() {
                line.push_str(&format!(" -> {}", describe_image(url)));
            }
            if let Some(error) = job.error() {
                line.push_str(&format!(" (error: {error})"));
            }
            if let Some(error) = job.refinement_error() {
                line.push_str(&format!(" (last refinement failed: {error})"));
            }
            line
        }
    }
}

fn bulk_lines(report: &BulkInsertReport, out: &mut Vec<String>) {
    out.push(format!("Queued {} prompts.", report.queued.len()));
    if let Some(rejection) = &report.rejection {
        out.push(format!(
            "{rejection} Not queued: {}",
            report.not_queued.join(" | ")
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chispart_contracts::config::StudioConfig;
    use chispart_engine::providers::DryrunProvider;
    use chispart_engine::{ProviderAdapter, Studio};

    use super::{Flow, Repl};

    fn repl(export_dir: std::path::PathBuf) -> Repl {
        let mut adapter = ProviderAdapter::new();
        adapter.register(DryrunProvider);
        let config = StudioConfig {
            image_provider: "dryrun".to_string(),
            image_model: String::new(),
            text_provider: "dryrun".to_string(),
            text_model: String::new(),
            ..StudioConfig::default()
        }
        .without_pacing();
        Repl::new(Studio::new(&config, Arc::new(adapter), Vec::new()), export_dir)
    }

    #[test]
    fn queue_run_refine_and_export() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut repl = repl(temp.path().to_path_buf());

        let (_, out) = repl.handle("a lighthouse");
        assert!(out[0].starts_with("#1 [pending] a lighthouse, futuristic cyberpunk style"));

        let (_, out) = repl.handle("/mode url");
        assert_eq!(out, vec!["Input mode: url".to_string()]);
        let (_, out) = repl.handle("notes.txt");
        assert!(out[0].starts_with("#2 [skipped] notes.txt"));

        let (_, out) = repl.handle("/run");
        assert_eq!(out.last().map(String::as_str), Some("Batch finished: 1 completed, 0 failed."));

        let (_, out) = repl.handle("/refine 1 make it night");
        assert_eq!(out, vec!["#1 refined".to_string()]);

        let (_, out) = repl.handle("/zip");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("Wrote "));
        assert!(out[0].ends_with(".zip"));

        let (flow, _) = repl.handle("/quit");
        assert_eq!(flow, Flow::Quit);
        Ok(())
    }

    #[test]
    fn analyze_then_accept_queues_prompts() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let story = temp.path().join("story.txt");
        std::fs::write(&story, "A fox runs. The forest burns.")?;
        let mut repl = repl(temp.path().to_path_buf());

        let (_, out) = repl.handle(&format!("/analyze @{}", story.display()));
        assert_eq!(out[0], " 1. A fox runs");
        let (_, out) = repl.handle("/accept");
        assert_eq!(out, vec!["Queued 2 prompts.".to_string()]);

        let (_, out) = repl.handle("/style baroque");
        assert_eq!(out, vec!["Unknown art style 'baroque'. Use /styles to list them.".to_string()]);
        let (_, out) = repl.handle("/provider text stability");
        assert_eq!(out, vec!["Provider stability does not support text generation".to_string()]);
        let (_, out) = repl.handle("/bogus");
        assert_eq!(out, vec!["Unknown command /bogus. Type /help for commands.".to_string()]);
        Ok(())
    }
}

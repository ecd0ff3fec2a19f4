use serde_json::Value;

/// Separates the instruction from the user's text block.
pub const TEXT_MARKER: &str = "Text to analyze:";

const MAX_PROMPT_CHARS: usize = 400;

pub fn extraction_instruction(text_block: &str, max_prompts: usize) -> String {
    format!(
        "Analyze the following text and extract distinct phrases or sentences that would make \
good prompts for an image generator. Each prompt must be a self-contained idea focused on a \
single visual concept, and concise. Return the prompts as a JSON array of strings. Do not \
return more than {max_prompts} prompts, even if you find more. Reply with the JSON array \
only, without any additional text.\n\n{TEXT_MARKER}\n{}",
        text_block.trim()
    )
}

/// Parses a model reply into at most `max_prompts` prompts. A JSON array of
/// strings is preferred; a reply with no usable JSON strings is read line by
/// line instead, each non-empty line becoming one prompt.
pub fn parse_prompt_list(raw: &str, max_prompts: usize) -> Vec<String> {
    if max_prompts == 0 {
        return Vec::new();
    }
    if let Some(rows) = extract_json_array_from_text(raw) {
        let items = rows
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<String>>();
        let prompts = clean_prompts(items, max_prompts);
        if !prompts.is_empty() {
            return prompts;
        }
    }
    let lines = strip_code_fence(raw)
        .lines()
        .map(strip_list_marker)
        .map(str::to_string)
        .collect::<Vec<String>>();
    clean_prompts(lines, max_prompts)
}

fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.to_string();
    }
    let mut body = lines[1..lines.len() - 1].join("\n").trim().to_string();
    if body.to_ascii_lowercase().starts_with("json") {
        body = body[4..].trim().to_string();
    }
    body
}

fn extract_json_array_from_text(text: &str) -> Option<Vec<Value>> {
    let raw = strip_code_fence(text);
    if raw.trim().is_empty() {
        return None;
    }
    let mut candidates = vec![raw.clone()];
    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if end > start {
            candidates.push(raw[start..=end].to_string());
        }
    }
    for candidate in candidates {
        if let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(&candidate) {
            return Some(rows);
        }
    }
    None
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
    {
        return rest.trim();
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(after) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return after.trim();
        }
    }
    trimmed
}

fn clean_prompts(raw_items: Vec<String>, max_items: usize) -> Vec<String> {
    let mut cleaned = Vec::new();
    let mut seen = Vec::new();
    for row in raw_items {
        let mut text = row.split_whitespace().collect::<Vec<&str>>().join(" ");
        text = text.trim_matches('"').trim().to_string();
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > MAX_PROMPT_CHARS {
            text = text
                .chars()
                .take(MAX_PROMPT_CHARS)
                .collect::<String>()
                .trim()
                .to_string();
        }
        let key = text.to_lowercase();
        if seen.iter().any(|existing| existing == &key) {
            continue;
        }
        seen.push(key);
        cleaned.push(text);
        if cleaned.len() >= max_items {
            break;
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::{extraction_instruction, parse_prompt_list, TEXT_MARKER};

    #[test]
    fn parses_plain_json_array() {
        let prompts = parse_prompt_list(r#"["a red fox", "a snowy forest"]"#, 10);
        assert_eq!(prompts, vec!["a red fox", "a snowy forest"]);
    }

    #[test]
    fn parses_fenced_json_with_chatter() {
        let raw = "```json\nHere you go: [\"a red fox\", 4, \"  a   snowy forest \"]\n```";
        assert_eq!(
            parse_prompt_list(raw, 10),
            vec!["a red fox", "a snowy forest"]
        );
    }

    #[test]
    fn falls_back_to_lines_and_strips_markers() {
        let raw = "1. a red fox\n\n- a snowy forest\n* A RED FOX\n2) northern lights";
        assert_eq!(
            parse_prompt_list(raw, 10),
            vec!["a red fox", "a snowy forest", "northern lights"]
        );
    }

    #[test]
    fn array_without_strings_reads_lines_instead() {
        let raw = "a red fox under [1] moon\n- a snowy forest";
        assert_eq!(
            parse_prompt_list(raw, 10),
            vec!["a red fox under [1] moon", "a snowy forest"]
        );
        assert_eq!(parse_prompt_list("[\" \", 7]", 10), vec!["[\" \", 7]"]);
    }

    #[test]
    fn caps_both_paths_at_maximum() {
        let json = serde_json::to_string(
            &(0..15).map(|idx| format!("prompt {idx}")).collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        assert_eq!(parse_prompt_list(&json, 10).len(), 10);

        let lines = (0..15)
            .map(|idx| format!("line {idx}"))
            .collect::<Vec<_>>()
            .join("\n");
        let parsed = parse_prompt_list(&lines, 10);
        assert_eq!(parsed.len(), 10);
        assert_eq!(parsed[9], "line 9");
    }

    #[test]
    fn malformed_or_empty_reply_never_fails() {
        assert!(parse_prompt_list("", 10).is_empty());
        assert!(parse_prompt_list("   \n  ", 10).is_empty());
        assert_eq!(parse_prompt_list("[\"unterminated", 10), vec!["[\"unterminated"]);
        assert!(parse_prompt_list("a fox", 0).is_empty());
    }

    #[test]
    fn instruction_embeds_limit_and_text() {
        let instruction = extraction_instruction("  Once upon a time.  ", 7);
        assert!(instruction.contains("more than 7 prompts"));
        assert!(instruction.ends_with(&format!("{TEXT_MARKER}\nOnce upon a time.")));
    }
}

//! Response parser: extracts command invocations from raw completion text.
//!
//! Sources are tried in order of confidence:
//!
//! 1. A structured JSON array of `{"command", "description"}` objects, either
//!    bare or inside a fenced block, validated against [`command_schema`].
//! 2. Lines inside fenced code blocks.
//! 3. Inline backtick spans and bare lines starting with the tool name.
//!
//! Lines are tokenized with shell-lexical word splitting. Quotes are honoured;
//! variables, globs, pipes and redirections are kept as literal arguments.
//! Nothing here touches the network, the filesystem or a process.

use jsonschema::JSONSchema;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::command::{CommandSource, ParsedCommand, TOOL_NAME};
use crate::error::{CoreError, CoreResult};

/// JSON schema for a structured command array.
pub fn command_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": { "type": "string", "minLength": 1 },
                "description": { "type": "string" }
            }
        }
    })
}

/// Validate a JSON value against [`command_schema`].
///
/// Returns the joined validation messages on failure.
pub fn validate_command_array(value: &Value) -> Result<(), String> {
    let schema = command_schema();
    let compiled = JSONSchema::compile(&schema).map_err(|e| format!("invalid schema: {}", e))?;
    let messages: Vec<String> = match compiled.validate(value) {
        Ok(()) => return Ok(()),
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };
    Err(messages.join("; "))
}

/// A command candidate before sequence indices are assigned.
struct Candidate {
    argv: Vec<String>,
    source_text: String,
    line: usize,
    origin: CommandSource,
    description: Option<String>,
}

/// Parser for backend completions.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    tool_name: String,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(TOOL_NAME)
    }
}

impl ResponseParser {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Parse raw completion text into an ordered command list.
    ///
    /// Deterministic: the same input always yields the same output. An input
    /// with no recognisable command is a [`CoreError::NoCommands`].
    pub fn parse(&self, raw: &str) -> CoreResult<Vec<ParsedCommand>> {
        let candidates = match self.parse_json(raw) {
            Some(found) => found,
            None => {
                let fenced = self.parse_fenced(raw);
                if fenced.is_empty() {
                    self.parse_bare(raw)
                } else {
                    fenced
                }
            }
        };

        if candidates.is_empty() {
            return Err(CoreError::NoCommands {
                raw: raw.to_string(),
            });
        }

        let commands: Vec<ParsedCommand> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, c)| {
                let command = ParsedCommand::new(index, c.argv, c.source_text)
                    .with_origin(c.origin, c.line);
                match c.description {
                    Some(description) => command.with_description(description),
                    None => command,
                }
            })
            .collect();

        debug!("Parsed {} command(s) from response", commands.len());
        Ok(commands)
    }

    fn parse_json(&self, raw: &str) -> Option<Vec<Candidate>> {
        for (region, start_line) in json_regions(raw) {
            let value: Value = match serde_json::from_str(region) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if let Err(message) = validate_command_array(&value) {
                warn!("Ignoring JSON response that does not match command schema: {}", message);
                continue;
            }

            let entries = value.as_array()?;
            let mut found = Vec::new();
            for entry in entries {
                let command = match entry.get("command").and_then(Value::as_str) {
                    Some(c) => c.trim(),
                    None => continue,
                };
                let argv = match shlex::split(command) {
                    Some(argv) if !argv.is_empty() => argv,
                    _ => {
                        debug!("Discarding untokenizable JSON command: {}", command);
                        continue;
                    }
                };
                found.push(Candidate {
                    argv,
                    source_text: command.to_string(),
                    line: locate_line(raw, command).unwrap_or(start_line),
                    origin: CommandSource::Json,
                    description: entry
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
            if found.is_empty() {
                debug!("JSON region at line {} holds no commands", start_line);
                continue;
            }
            return Some(found);
        }
        None
    }

    fn parse_fenced(&self, raw: &str) -> Vec<Candidate> {
        let mut found = Vec::new();
        let mut in_fence = false;
        for (idx, line) in raw.lines().enumerate() {
            if is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if !in_fence {
                continue;
            }
            if let Some(argv) = self.classify(line) {
                found.push(Candidate {
                    argv,
                    source_text: line.trim().to_string(),
                    line: idx + 1,
                    origin: CommandSource::Fenced,
                    description: None,
                });
            }
        }
        found
    }

    fn parse_bare(&self, raw: &str) -> Vec<Candidate> {
        let mut found = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let spans = inline_spans(line);
            let before = found.len();
            for span in spans {
                if let Some(argv) = self.classify(span) {
                    found.push(Candidate {
                        argv,
                        source_text: span.trim().to_string(),
                        line: idx + 1,
                        origin: CommandSource::Inline,
                        description: None,
                    });
                }
            }
            if found.len() > before {
                continue;
            }
            if line.contains('`') {
                continue;
            }
            if let Some(argv) = self.classify(line) {
                found.push(Candidate {
                    argv,
                    source_text: line.trim().to_string(),
                    line: idx + 1,
                    origin: CommandSource::Bare,
                    description: None,
                });
            }
        }
        found
    }

    /// Tokenize one line if it is a recognisable invocation of the tool.
    fn classify(&self, line: &str) -> Option<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            return None;
        }
        let stripped = strip_line_marker(trimmed);
        let argv = shlex::split(stripped)?;
        if argv.first().map(String::as_str) != Some(self.tool_name.as_str()) {
            return None;
        }
        Some(argv)
    }
}

/// Parse with the default tool name.
pub fn parse(raw: &str) -> CoreResult<Vec<ParsedCommand>> {
    ResponseParser::default().parse(raw)
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Candidate JSON documents with their 1-based starting line: the whole
/// text, each fenced block, and the outermost bracketed span.
fn json_regions(raw: &str) -> Vec<(&str, usize)> {
    let mut regions = Vec::new();
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        regions.push((trimmed, 1));
    }

    let mut offset = 0;
    let mut open: Option<(usize, usize)> = None;
    for (idx, line) in raw.split_inclusive('\n').enumerate() {
        if is_fence(line) {
            match open.take() {
                Some((start, start_line)) => {
                    let body = raw[start..offset].trim();
                    if body.starts_with('[') {
                        regions.push((body, start_line));
                    }
                }
                None => open = Some((offset + line.len(), idx + 2)),
            }
        }
        offset += line.len();
    }

    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if start < end {
            let span = &raw[start..=end];
            let start_line = raw[..start].matches('\n').count() + 1;
            regions.push((span, start_line));
        }
    }
    regions
}

/// 1-based line of the first occurrence of `command` (or its JSON-escaped form).
fn locate_line(raw: &str, command: &str) -> Option<usize> {
    let position = raw.find(command).or_else(|| {
        let escaped = serde_json::to_string(command).ok()?;
        raw.find(escaped.trim_matches('"'))
    })?;
    Some(raw[..position].matches('\n').count() + 1)
}

/// Contents of inline backtick spans on a single line.
fn inline_spans(line: &str) -> Vec<&str> {
    if line.matches('`').count() < 2 {
        return Vec::new();
    }
    line.split('`')
        .enumerate()
        .filter(|(i, part)| i % 2 == 1 && !part.trim().is_empty())
        .map(|(_, part)| part)
        .collect()
}

/// Strip leading list markers (`-`, `*`, `+`, `1.`, `1)`) and shell prompts (`$`).
fn strip_line_marker(line: &str) -> &str {
    let mut current = line;
    loop {
        let next = strip_one_marker(current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

fn strip_one_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "+ ", "$ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_marker() {
        assert_eq!(strip_line_marker("- fastpy db:migrate"), "fastpy db:migrate");
        assert_eq!(strip_line_marker("12. fastpy db:migrate"), "fastpy db:migrate");
        assert_eq!(strip_line_marker("3) fastpy serve"), "fastpy serve");
        assert_eq!(strip_line_marker("$ fastpy serve"), "fastpy serve");
        assert_eq!(strip_line_marker("- $ fastpy serve"), "fastpy serve");
        assert_eq!(strip_line_marker("fastpy serve"), "fastpy serve");
        assert_eq!(strip_line_marker("2024 was a year"), "2024 was a year");
    }

    #[test]
    fn test_inline_spans() {
        assert_eq!(
            inline_spans("Run `fastpy db:migrate` then `fastpy serve`."),
            vec!["fastpy db:migrate", "fastpy serve"]
        );
        assert!(inline_spans("no code here").is_empty());
        assert!(inline_spans("a single ` tick").is_empty());
    }

    #[test]
    fn test_validate_command_array() {
        let valid = json!([{"command": "fastpy make:model Post", "description": "Post model"}]);
        assert!(validate_command_array(&valid).is_ok());

        let description_optional = json!([{"command": "fastpy db:migrate"}]);
        assert!(validate_command_array(&description_optional).is_ok());

        let not_array = json!({"not": "an array"});
        let err = validate_command_array(&not_array).unwrap_err();
        assert!(err.contains("array"));

        let empty_command = json!([{"command": "", "description": "Test"}]);
        assert!(validate_command_array(&empty_command).is_err());
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        let parser = ResponseParser::default();
        assert!(parser.classify("# fastpy make:model Post").is_none());
        assert!(parser.classify("// fastpy make:model Post").is_none());
        assert!(parser.classify("   ").is_none());
    }

    #[test]
    fn test_unbalanced_quotes_are_discarded() {
        let parser = ResponseParser::default();
        assert!(parser.classify(r#"fastpy make:model "Post"#).is_none());
    }

    #[test]
    fn test_custom_tool_name() {
        let parser = ResponseParser::new("tool");
        let commands = parser.parse("tool resource:make Post\nfastpy db:migrate").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].argv, vec!["tool", "resource:make", "Post"]);
    }
}

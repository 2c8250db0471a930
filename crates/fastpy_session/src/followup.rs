//! Follow-up analysis: gaps in what a session produced that one more
//! command would close.

use std::collections::HashSet;

use fastpy_core::TOOL_NAME;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{CommandRecord, GenerationSession};

/// Kind of follow-up suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FollowUpKind {
    /// A model was created without routes.
    GenerateRoutes { resource: String },
    /// Resources were created and their migrations have not run.
    RunMigrations,
}

/// A suggested next command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    #[serde(flatten)]
    pub kind: FollowUpKind,
    /// Exact invocation text to offer the user.
    pub command: String,
    /// Question shown when offering the suggestion.
    pub question: String,
}

impl FollowUp {
    pub fn generate_routes(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            command: format!("{} make:route {} --protected", TOOL_NAME, resource),
            question: format!("Generate routes for {}?", resource),
            kind: FollowUpKind::GenerateRoutes { resource },
        }
    }

    pub fn run_migrations() -> Self {
        Self {
            kind: FollowUpKind::RunMigrations,
            command: format!("{} db:migrate", TOOL_NAME),
            question: "Run migrations now?".to_string(),
        }
    }
}

fn is(record: &CommandRecord, subcommand: &str) -> bool {
    record.command.subcommand() == Some(subcommand)
}

fn targets(record: &CommandRecord, resource: &str) -> bool {
    record
        .command
        .target()
        .is_some_and(|t| t.eq_ignore_ascii_case(resource))
}

/// Suggest follow-up actions for a session, in the order they should run.
///
/// Pure over the session's records: route suggestions first (in command
/// order), then at most one migration suggestion. Suggestions already
/// offered on the session are never repeated.
pub fn analyze(session: &GenerationSession) -> Vec<FollowUp> {
    let offered: HashSet<&FollowUpKind> = session.follow_ups.iter().map(|f| &f.kind).collect();
    let mut suggestions: Vec<FollowUp> = Vec::new();

    for record in session.records.iter().filter(|r| r.succeeded() && is(r, "make:model")) {
        let Some(resource) = record.command.target() else {
            continue;
        };
        let has_routes = session.context.has_resource(resource)
            || session
                .records
                .iter()
                .any(|r| (is(r, "make:route") || is(r, "make:resource")) && targets(r, resource));
        if has_routes {
            continue;
        }

        let suggestion = FollowUp::generate_routes(resource);
        let duplicate = offered.contains(&suggestion.kind)
            || suggestions.iter().any(|s| s.kind == suggestion.kind);
        if !duplicate {
            suggestions.push(suggestion);
        }
    }

    let last_resource = session
        .records
        .iter()
        .filter(|r| r.succeeded() && (is(r, "make:resource") || is(r, "make:migration")))
        .map(|r| r.command.index)
        .max();
    if let Some(last) = last_resource {
        let migrated = session
            .records
            .iter()
            .any(|r| r.succeeded() && is(r, "db:migrate") && r.command.index > last);
        let suggestion = FollowUp::run_migrations();
        if !migrated && !offered.contains(&suggestion.kind) {
            suggestions.push(suggestion);
        }
    }

    debug!("Follow-up analysis produced {} suggestion(s)", suggestions.len());
    suggestions
}

//! The confirmation seam between the coordinator and the user.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::followup::FollowUp;
use crate::session::GenerationSession;

/// Asks the user to approve execution and follow-ups.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Called once validation is complete, in every mode.
    fn show_plan(&self, _session: &GenerationSession) {}

    /// Approve running the session's allowed commands.
    async fn confirm_execution(&self, session: &GenerationSession) -> bool;

    /// Approve one follow-up suggestion.
    async fn confirm_follow_up(&self, follow_up: &FollowUp) -> bool;
}

/// Approves everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm_execution(&self, _session: &GenerationSession) -> bool {
        true
    }

    async fn confirm_follow_up(&self, _follow_up: &FollowUp) -> bool {
        true
    }
}

/// Declines everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineAll;

#[async_trait]
impl Confirmer for DeclineAll {
    async fn confirm_execution(&self, _session: &GenerationSession) -> bool {
        false
    }

    async fn confirm_follow_up(&self, _follow_up: &FollowUp) -> bool {
        false
    }
}

/// Replays scripted answers and records every question asked.
///
/// Answers are consumed in order; once exhausted, the default answer is used.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    answers: Arc<RwLock<VecDeque<bool>>>,
    default_answer: bool,
    questions: Arc<RwLock<Vec<String>>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Arc::new(RwLock::new(answers.into_iter().collect())),
            default_answer: false,
            questions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_default(mut self, answer: bool) -> Self {
        self.default_answer = answer;
        self
    }

    /// Questions asked so far.
    pub fn questions(&self) -> Vec<String> {
        self.questions.read().clone()
    }

    fn answer(&self, question: String) -> bool {
        self.questions.write().push(question);
        self.answers.write().pop_front().unwrap_or(self.default_answer)
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm_execution(&self, session: &GenerationSession) -> bool {
        self.answer(format!("Execute {} command(s)?", session.allowed_count()))
    }

    async fn confirm_follow_up(&self, follow_up: &FollowUp) -> bool {
        self.answer(follow_up.question.clone())
    }
}

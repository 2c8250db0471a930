//! Denylist rules: argument patterns that block an otherwise recognised
//! command.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// A denylist rule matched against each argument token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub pattern: String,
    pub enabled: bool,
}

impl DenyRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            pattern: pattern.into(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A token that matched a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub message: String,
    /// Position of the offending token in argv.
    pub position: usize,
    pub token: String,
}

/// An ordered set of deny rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyList {
    pub name: String,
    pub rules: Vec<DenyRule>,
}

impl DenyList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// The standard denylist.
    pub fn standard() -> Self {
        let mut list = Self::new("Standard Denylist");

        list.add(
            DenyRule::new(
                "shell-metacharacters",
                "Shell metacharacters",
                r"[;|&`$<>\n\x00]",
            )
            .with_description("Characters that would be interpreted by a shell"),
        );

        list.add(
            DenyRule::new(
                "path-traversal",
                "Path traversal",
                r"(?i)(^|[/\\=:])(\.\.|%2e%2e|\.%2e|%2e\.)([/\\=:]|$)",
            )
            .with_description("Parent-directory components in a path-like argument"),
        );

        list.add(
            DenyRule::new(
                "destructive-primitive",
                "Destructive primitive",
                r"(?i)^(rm|rmdir|shred|dd|mkfs(\.[a-z0-9]+)?)$",
            )
            .with_description("Raw deletion or formatting programs passed as arguments"),
        );

        list.add(
            DenyRule::new(
                "recursive-force",
                "Recursive force flag",
                r"(?i)^-[a-z]*(r[a-z]*f|f[a-z]*r)[a-z]*$",
            )
            .with_description("Combined recursive and force flags such as -rf"),
        );

        list.add(
            DenyRule::new("no-preserve-root", "Root preservation override", r"^--no-preserve-root$")
                .with_description("Disables root-directory protection of deletion tools"),
        );

        list.add(
            DenyRule::new("root-target", "Root or home target", r"^[/~]/?\*?$")
                .with_description("A bare filesystem root or home directory argument"),
        );

        list.add(
            DenyRule::new(
                "shell-program",
                "Shell or download program",
                r"(?i)^(sh|bash|zsh|eval|exec|sudo|curl|wget)$",
            )
            .with_description("Interpreters, privilege escalation or downloaders as arguments"),
        );

        list
    }

    pub fn add(&mut self, rule: DenyRule) {
        self.rules.push(rule);
    }

    /// Compile the enabled rules.
    pub fn compile(&self) -> PolicyResult<CompiledDenyList> {
        let rules = self
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| PolicyError::InvalidRule {
                    rule: rule.id.clone(),
                    message: format!("Invalid regex: {}", e),
                })?;
                Ok((rule.clone(), regex))
            })
            .collect::<PolicyResult<Vec<_>>>()?;

        debug!("Compiled {} deny rule(s) from {}", rules.len(), self.name);
        Ok(CompiledDenyList { rules })
    }
}

/// Deny rules ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledDenyList {
    rules: Vec<(DenyRule, Regex)>,
}

impl CompiledDenyList {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First violation among `argv[1..]`, scanning rule by rule.
    ///
    /// The program name is skipped; the structural check owns it.
    pub fn scan(&self, argv: &[String]) -> Option<RuleViolation> {
        for (rule, regex) in &self.rules {
            for (position, token) in argv.iter().enumerate().skip(1) {
                if regex.is_match(token) {
                    return Some(RuleViolation {
                        rule_id: rule.id.clone(),
                        message: format!("{} in argument '{}'", rule.name, token.escape_debug()),
                        position,
                        token: token.clone(),
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(token: &str) -> Option<String> {
        let compiled = DenyList::standard().compile().unwrap();
        compiled
            .scan(&["fastpy".to_string(), "make:resource".to_string(), token.to_string()])
            .map(|v| v.rule_id)
    }

    #[test]
    fn test_standard_rules_compile() {
        let compiled = DenyList::standard().compile().unwrap();
        assert_eq!(compiled.len(), 7);
    }

    #[test]
    fn test_metacharacters() {
        for token in ["a;b", "x|y", "a&&b", "`id`", "$HOME", "$(whoami)", "<in", ">out", "a\nb", "a\0b"] {
            assert_eq!(hit(token).as_deref(), Some("shell-metacharacters"), "{:?}", token);
        }
    }

    #[test]
    fn test_path_traversal() {
        for token in ["..", "../etc", "a/../../b", "..\\win", "--path=../x", "dir:..", "%2e%2e/x", "%2E%2E"] {
            assert_eq!(hit(token).as_deref(), Some("path-traversal"), "{:?}", token);
        }
        for token in ["...", "v1..2", "file..txt", "./app"] {
            assert_eq!(hit(token), None, "{:?}", token);
        }
    }

    #[test]
    fn test_destructive_arguments() {
        assert_eq!(hit("rm").as_deref(), Some("destructive-primitive"));
        assert_eq!(hit("mkfs.ext4").as_deref(), Some("destructive-primitive"));
        assert_eq!(hit("-rf").as_deref(), Some("recursive-force"));
        assert_eq!(hit("-fR").as_deref(), Some("recursive-force"));
        assert_eq!(hit("--no-preserve-root").as_deref(), Some("no-preserve-root"));
        assert_eq!(hit("/").as_deref(), Some("root-target"));
        assert_eq!(hit("~").as_deref(), Some("root-target"));
        assert_eq!(hit("/*").as_deref(), Some("root-target"));
        assert_eq!(hit("bash").as_deref(), Some("shell-program"));
        assert_eq!(hit("SUDO").as_deref(), Some("shell-program"));
    }

    #[test]
    fn test_ordinary_arguments_pass() {
        for token in [
            "Post",
            "-f",
            "title:string:required,max:200",
            "category_id:integer:foreign:categories.id",
            "-m",
            "--protected",
            "-r",
            "--force",
            "api.example.com",
            "/var/www/app",
        ] {
            assert_eq!(hit(token), None, "{:?}", token);
        }
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut list = DenyList::new("custom");
        list.add(DenyRule::new("no-x", "No x", "x").disabled());
        assert!(list.compile().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_rule_is_an_error() {
        let mut list = DenyList::new("broken");
        list.add(DenyRule::new("bad", "Bad", "("));
        assert!(matches!(list.compile(), Err(PolicyError::InvalidRule { ref rule, .. }) if rule == "bad"));
    }
}

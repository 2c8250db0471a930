//! # fastpy_policy
//!
//! Decides which parsed commands may run.
//!
//! Validation has two stages, both of which must pass:
//! - **Structural allowlist** ([`CommandSurface`]): the program must be the
//!   tool itself and the subcommand one of its recognised commands
//! - **Denylist** ([`DenyList`]): no argument may carry shell metacharacters,
//!   path traversal or destructive primitives
//!
//! Ambiguous input is blocked, never allowed.
//!
//! ## Example
//!
//! ```rust
//! use fastpy_core::{parse, BlockReason};
//! use fastpy_policy::SafetyValidator;
//!
//! let validator = SafetyValidator::standard().unwrap();
//! let commands = parse("fastpy make:model Post\nfastpy make:route ../../etc").unwrap();
//! let verdicts = validator.validate_all(&commands);
//!
//! assert!(verdicts[0].is_allowed());
//! assert_eq!(verdicts[1].block_reason(), Some(BlockReason::DangerousPattern));
//! ```

pub mod error;
pub mod rules;
pub mod surface;
pub mod validator;

pub use error::{PolicyError, PolicyResult};
pub use rules::{CompiledDenyList, DenyList, DenyRule, RuleViolation};
pub use surface::{CommandSurface, SubcommandRule};
pub use validator::SafetyValidator;

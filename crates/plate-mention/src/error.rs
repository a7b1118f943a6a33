use plate_core::ApplyError;

use crate::commit::CommandId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse mention config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("trigger {0:?} cannot be whitespace or a boundary sentinel")]
    InvalidTrigger(char),
    #[error("separator must differ from the trigger")]
    SeparatorIsTrigger,
    #[error("lookback must be greater than zero")]
    ZeroLookback,
    #[error("decoration class `{0}` is empty")]
    EmptyClass(&'static str),
    #[error("narrow viewport width must be positive, got {0}")]
    InvalidNarrowWidth(f64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommitError {
    #[error("no insert command registered for {0:?}")]
    MissingCommand(CommandId),
    #[error("link `{href}` cannot be embedded")]
    RejectedLink { href: String },
    #[error("candidate `{0}` cannot be committed")]
    NotCommittable(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

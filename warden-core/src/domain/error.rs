// warden-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid rule '{rule_id}': {reason}")]
    #[diagnostic(
        code(warden::domain::rule),
        help("Check the rule definition in your rules/*.yml files.")
    )]
    InvalidRule { rule_id: String, reason: String },

    #[error("Rule '{0}' not found")]
    #[diagnostic(code(warden::domain::rule_not_found))]
    RuleNotFound(String),

    #[error("Rule '{0}' is disabled")]
    #[diagnostic(
        code(warden::domain::rule_disabled),
        help("Set `enabled: true` on the rule to run it.")
    )]
    RuleDisabled(String),

    #[error("Issue '{0}' not found")]
    #[diagnostic(code(warden::domain::issue_not_found))]
    IssueNotFound(String),

    #[error("Cannot {action} issue {issue_id} while it is {status}")]
    #[diagnostic(
        code(warden::domain::transition),
        help("Allowed: open -> acknowledged -> resolved, open -> resolved.")
    )]
    InvalidTransition {
        issue_id: String,
        status: String,
        action: String,
    },

    #[error("Auto-fix '{fix_type}' was not confirmed; nothing was changed")]
    #[diagnostic(
        code(warden::domain::confirmation_missing),
        help("Run the preview first (`warden fix preview --issue {issue_id} ...`), then repeat with `--confirmed`.")
    )]
    ConfirmationRequired { fix_type: String, issue_id: String },

    #[error("Auto-fix '{fix_type}' is not applicable: {reason}")]
    #[diagnostic(code(warden::domain::unsupported_fix))]
    UnsupportedFix { fix_type: String, reason: String },

    #[error("Not enough history to train '{rule_id}': {points} points, need {required}")]
    #[diagnostic(
        code(warden::domain::anomaly_history),
        help("Let the rule run on its schedule for a while or widen the training window.")
    )]
    InsufficientHistory {
        rule_id: String,
        points: usize,
        required: usize,
    },

    #[error("No anomaly model trained for rule '{0}'")]
    #[diagnostic(code(warden::domain::model_not_found))]
    ModelNotFound(String),

    #[error("Data source '{0}' is not configured")]
    #[diagnostic(code(warden::domain::source_not_found))]
    SourceNotFound(String),
}

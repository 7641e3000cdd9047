//! Authorization Policy
//! Mission: Decide, per operation, whether an authenticated principal may proceed
//!
//! Evaluated after authentication and before any state is touched. A refusal is
//! `Forbidden` (we know who you are, you may not do this), never `Unauthorized`.
//!
//! Operations not listed here (assignment update/delete, solution get/update)
//! carry no role rule; see DESIGN.md.

use crate::auth::models::{Principal, Role};
use crate::db::DocumentId;
use crate::error::ApiError;
use tracing::warn;

/// A role-gated operation and whatever context its rule needs
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    CreateSolution,
    DeleteSolution,
    /// `assignment_creator` is `None` when the assignment does not exist
    ListSolutionsForAssignment {
        assignment_creator: Option<&'a str>,
    },
    /// Profile update or deletion of the user with `target` id
    ManageUser { target: &'a DocumentId },
    ChangeRole,
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::CreateSolution => "create solution",
            Operation::DeleteSolution => "delete solution",
            Operation::ListSolutionsForAssignment { .. } => "list solutions",
            Operation::ManageUser { .. } => "manage user",
            Operation::ChangeRole => "change role",
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Operation::CreateSolution => "Only helpers and admins can post solutions.",
            Operation::DeleteSolution => "Only admins can delete solutions.",
            Operation::ListSolutionsForAssignment { .. } => {
                "You are not authorized to view solutions for this assignment."
            }
            Operation::ManageUser { .. } => "You may only modify your own account.",
            Operation::ChangeRole => "Only admins can change roles.",
        }
    }
}

/// Pure decision: no I/O, no state
pub fn is_allowed(principal: &Principal, op: &Operation<'_>) -> bool {
    match op {
        Operation::CreateSolution => matches!(principal.role, Role::Helper | Role::Admin),
        Operation::DeleteSolution | Operation::ChangeRole => principal.role == Role::Admin,
        Operation::ListSolutionsForAssignment { assignment_creator } => match principal.role {
            Role::User => *assignment_creator == Some(principal.username.as_str()),
            Role::Helper | Role::Admin => true,
        },
        Operation::ManageUser { target } => {
            principal.role == Role::Admin || principal.id == **target
        }
    }
}

/// `Ok(())` if allowed, otherwise a `Forbidden` error carrying the denial reason
pub fn authorize(principal: &Principal, op: Operation<'_>) -> Result<(), ApiError> {
    if is_allowed(principal, &op) {
        return Ok(());
    }

    warn!(
        username = %principal.username,
        role = %principal.role,
        operation = op.name(),
        "⛔ Forbidden"
    );
    Err(ApiError::forbidden(op.denial()))
}

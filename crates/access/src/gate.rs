//! Route gating.
//!
//! [`decide`] is the one place that maps a resolution and a route's
//! [`AccessPolicy`] to what the router should do. It is pure: no I/O, no
//! clock, no shared state.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use homeplate_core::{ApplicationState, Role};

use crate::config::RedirectTargets;
use crate::resolver::{ResolveFailure, Resolution};

/// Shown on the notice page when a rejected application carries no note.
pub const DEFAULT_REJECTION_REASON: &str =
    "Your application was not approved. Contact support for details.";

/// Who may see a route, declared when the route is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Anyone, signed in or not.
    Public,
    /// Any signed-in user whose role resolved.
    AnyAuthenticated,
    /// Only users holding `role`; with `require_approved`, only once their
    /// application is approved.
    RequiresRole {
        /// Required role.
        role: Role,
        /// Whether the role's application must be approved.
        require_approved: bool,
    },
}

impl AccessPolicy {
    /// `RequiresRole` without the approval requirement.
    #[must_use]
    pub const fn role(role: Role) -> Self {
        Self::RequiresRole {
            role,
            require_approved: false,
        }
    }

    /// `RequiresRole` with the approval requirement.
    #[must_use]
    pub const fn approved(role: Role) -> Self {
        Self::RequiresRole {
            role,
            require_approved: true,
        }
    }

    /// Role named by the policy, if any.
    #[must_use]
    pub const fn required_role(&self) -> Option<Role> {
        match self {
            Self::RequiresRole { role, .. } => Some(*role),
            Self::Public | Self::AnyAuthenticated => None,
        }
    }
}

impl std::fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::AnyAuthenticated => f.write_str("authenticated"),
            Self::RequiresRole {
                role,
                require_approved: false,
            } => write!(f, "{role}"),
            Self::RequiresRole {
                role,
                require_approved: true,
            } => write!(f, "{role} (approved)"),
        }
    }
}

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Show the requested view.
    Render,
    /// Send the user to sign in. `error` is set when the role lookup failed,
    /// so the prompt can offer a retry.
    RedirectToAuth {
        /// Failure that caused the redirect, if any.
        error: Option<ResolveFailure>,
    },
    /// Send the user to the landing page of the role they actually hold.
    RedirectToRoleHome {
        /// The user's role.
        role: Role,
    },
    /// Send the user to the application status notice.
    RedirectToPendingNotice {
        /// Current review state.
        state: ApplicationState,
        /// Reviewer's note; always set for rejected applications.
        reason: Option<String>,
    },
}

/// Why a navigation was not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Denial {
    /// Nobody is signed in.
    Unresolved,
    /// The role lookup failed or timed out.
    ResolutionFailed,
    /// The user's role is not the one the route requires.
    PolicyMismatch,
    /// The role matches but the application is not approved.
    NotApproved,
}

impl Decision {
    /// Classify a non-render decision.
    #[must_use]
    pub const fn denial(&self) -> Option<Denial> {
        match self {
            Self::Render => None,
            Self::RedirectToAuth { error: None } => Some(Denial::Unresolved),
            Self::RedirectToAuth { error: Some(_) } => Some(Denial::ResolutionFailed),
            Self::RedirectToRoleHome { .. } => Some(Denial::PolicyMismatch),
            Self::RedirectToPendingNotice { .. } => Some(Denial::NotApproved),
        }
    }

    /// Whether the user should be offered a retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RedirectToAuth { error: Some(_) })
    }

    /// Where to send the user, or `None` to render `requested`.
    ///
    /// Auth redirects carry `requested` as `next` so sign-in can return to
    /// it; role-home redirects deliberately drop it.
    #[must_use]
    pub fn redirect_path(&self, targets: &RedirectTargets, requested: &str) -> Option<String> {
        match self {
            Self::Render => None,
            Self::RedirectToAuth { error } => {
                let mut query = form_urlencoded::Serializer::new(String::new());
                query.append_pair("next", requested);
                if error.is_some() {
                    query.append_pair("error", "resolution_failed");
                }
                Some(format!("{}?{}", targets.auth_path, query.finish()))
            }
            Self::RedirectToRoleHome { role } => Some(targets.role_home(*role).to_owned()),
            Self::RedirectToPendingNotice { state, .. } => {
                Some(format!("{}?state={state}", targets.pending_path))
            }
        }
    }
}

/// Decide what to do with a navigation to a route guarded by `policy`.
#[must_use]
pub fn decide(resolution: &Resolution, policy: &AccessPolicy) -> Decision {
    let resolved = match (policy, resolution) {
        (AccessPolicy::Public, _) => return Decision::Render,
        (_, Resolution::Unresolved) => return Decision::RedirectToAuth { error: None },
        (_, Resolution::Failed(failure)) => {
            return Decision::RedirectToAuth {
                error: Some(failure.clone()),
            };
        }
        (_, Resolution::Resolved(resolved)) => resolved,
    };

    let AccessPolicy::RequiresRole {
        role: required,
        require_approved,
    } = *policy
    else {
        return Decision::Render;
    };

    if resolved.role != required {
        return Decision::RedirectToRoleHome {
            role: resolved.role,
        };
    }
    if !require_approved {
        return Decision::Render;
    }

    // Roles without an application review have nothing to approve
    let Some(application) = &resolved.application else {
        return if required.requires_application() {
            Decision::RedirectToPendingNotice {
                state: ApplicationState::Pending,
                reason: None,
            }
        } else {
            Decision::Render
        };
    };

    match application.state {
        ApplicationState::Approved => Decision::Render,
        state @ (ApplicationState::Pending | ApplicationState::UnderReview) => {
            Decision::RedirectToPendingNotice {
                state,
                reason: None,
            }
        }
        ApplicationState::Rejected => Decision::RedirectToPendingNotice {
            state: ApplicationState::Rejected,
            reason: Some(
                application
                    .rejection_reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_owned()),
            ),
        },
    }
}

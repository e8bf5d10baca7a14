//! Role-set authorization.

// std
use std::collections::BTreeSet;
// self
use crate::{_prelude::*, config::EmptyRolePolicy, error::ForbiddenReason};

/// Roles an operation accepts; holding any one of them is sufficient.
///
/// An empty set admits nobody.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredRoles(BTreeSet<String>);
impl RequiredRoles {
	/// Accept callers holding at least one of `roles`.
	pub fn any_of<I, S>(roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(roles.into_iter().map(Into::into).collect())
	}

	/// Whether no role satisfies the requirement.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<S> FromIterator<S> for RequiredRoles
where
	S: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = S>,
	{
		Self::any_of(iter)
	}
}

/// Outcome of an authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
	/// Caller may proceed.
	Allow,
	/// Caller is refused.
	Deny(ForbiddenReason),
}
impl Decision {
	/// Whether the caller may proceed.
	pub fn is_allowed(self) -> bool {
		matches!(self, Self::Allow)
	}

	/// Convert a denial into [`Error::Forbidden`].
	pub fn into_result(self) -> Result<()> {
		match self {
			Self::Allow => Ok(()),
			Self::Deny(reason) => Err(Error::Forbidden(reason)),
		}
	}
}

/// Whether the caller's roles and the required roles intersect.
pub fn authorize(roles: &BTreeSet<String>, required: &RequiredRoles) -> bool {
	required.0.iter().any(|role| roles.contains(role))
}

/// Authorize under the configured empty-role policy.
pub fn decide(
	roles: &BTreeSet<String>,
	required: &RequiredRoles,
	policy: EmptyRolePolicy,
) -> Decision {
	if roles.is_empty() && policy == EmptyRolePolicy::RejectEmpty {
		return Decision::Deny(ForbiddenReason::NoRoles);
	}

	if authorize(roles, required) {
		Decision::Allow
	} else {
		Decision::Deny(ForbiddenReason::InsufficientRole)
	}
}

//! Route registration.
//!
//! Every route declares its [`AccessPolicy`] when registered, so the gate
//! never has to guess. Patterns are `/`-separated segments:
//!
//! - `menu` - literal segment
//! - `:chef_id` - one path segment, captured by name
//! - `*` - the rest of the path (last segment only)
//!
//! When several patterns match, the most specific wins: literals beat
//! parameters, which beat wildcards, compared left to right.

use std::collections::HashMap;

use thiserror::Error;

use crate::gate::AccessPolicy;

/// Errors from registering or looking up routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// An equivalent pattern is already registered.
    #[error("route already registered: {0}")]
    Duplicate(String),

    /// The pattern cannot be parsed.
    #[error("invalid route pattern {pattern}: {reason}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// No registered route matches the path.
    #[error("no route matches {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

impl Segment {
    const fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 2,
            Self::Param(_) => 1,
            Self::Wildcard => 0,
        }
    }

    /// Same shape, ignoring parameter names.
    fn equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Param(_), Self::Param(_)) | (Self::Wildcard, Self::Wildcard) => true,
            _ => false,
        }
    }
}

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route<C> {
    pattern: String,
    segments: Vec<Segment>,
    policy: AccessPolicy,
    component: C,
}

impl<C> Route<C> {
    /// Pattern as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Access policy declared at registration.
    #[must_use]
    pub const fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// The view this route renders.
    #[must_use]
    pub const fn component(&self) -> &C {
        &self.component
    }

    /// One rank per path segment (wildcard-covered segments rank lowest),
    /// then whether the route has no wildcard at all.
    fn specificity(&self, depth: usize) -> (Vec<u8>, bool) {
        let mut ranks: Vec<u8> = self
            .segments
            .iter()
            .filter(|s| **s != Segment::Wildcard)
            .map(Segment::rank)
            .collect();
        let exact = ranks.len() == self.segments.len();
        ranks.resize(depth, Segment::Wildcard.rank());
        (ranks, exact)
    }

    fn matches(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut parts_iter = parts.iter();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => {
                    let rest: Vec<&str> = parts_iter.by_ref().copied().collect();
                    params.insert("*".to_owned(), rest.join("/"));
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    if parts_iter.next()? != literal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*parts_iter.next()?).to_owned());
                }
            }
        }

        parts_iter.next().is_none().then_some(params)
    }
}

/// A route matched against a concrete path.
#[derive(Debug)]
pub struct RouteMatch<'a, C> {
    /// The matching route.
    pub route: &'a Route<C>,
    /// Captured `:param` values; the wildcard is captured as `*`.
    pub params: HashMap<String, String>,
}

/// Ordered set of routes with their access policies.
#[derive(Debug, Clone)]
pub struct RouteTable<C> {
    routes: Vec<Route<C>>,
}

impl<C> Default for RouteTable<C> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<C> RouteTable<C> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` at `path` behind `policy`.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::InvalidPattern` if the pattern does not parse and
    /// `RouteError::Duplicate` if an equivalent pattern exists.
    pub fn register_route(
        &mut self,
        path: &str,
        policy: AccessPolicy,
        component: C,
    ) -> Result<(), RouteError> {
        let segments = parse_pattern(path)?;

        let duplicate = self.routes.iter().any(|existing| {
            existing.segments.len() == segments.len()
                && existing
                    .segments
                    .iter()
                    .zip(&segments)
                    .all(|(a, b)| a.equivalent(b))
        });
        if duplicate {
            return Err(RouteError::Duplicate(path.to_owned()));
        }

        self.routes.push(Route {
            pattern: path.to_owned(),
            segments,
            policy,
            component,
        });
        Ok(())
    }

    /// Find the most specific route for `path`.
    ///
    /// Query strings and fragments are ignored.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_, C>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let parts = split_path(path);

        self.routes
            .iter()
            .filter_map(|route| route.matches(&parts).map(|params| (route, params)))
            .max_by_key(|(route, _)| route.specificity(parts.len()))
            .map(|(route, params)| RouteMatch { route, params })
    }

    /// Policy for `path`.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::NotFound` if no route matches.
    pub fn policy_for(&self, path: &str) -> Result<AccessPolicy, RouteError> {
        self.lookup(path)
            .map(|matched| *matched.route.policy())
            .ok_or_else(|| RouteError::NotFound(path.to_owned()))
    }

    /// Registered routes, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route<C>> {
        self.routes.iter()
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouteError> {
    let invalid = |reason| RouteError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason,
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let parts = split_path(pattern);
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| match *part {
            "*" if i == last => Ok(Segment::Wildcard),
            "*" => Err(invalid("'*' must be the last segment")),
            other => match other.strip_prefix(':') {
                Some("") => Err(invalid("parameter name cannot be empty")),
                Some(name) => Ok(Segment::Param(name.to_owned())),
                None => Ok(Segment::Literal(other.to_owned())),
            },
        })
        .collect()
}

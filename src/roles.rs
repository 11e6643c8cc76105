//! Role hierarchy as an explicit implication DAG.
//!
//! Edges read "higher implies lower" (`ROLE_ADMIN -> ROLE_USER`). The graph is
//! validated and closed transitively once in [`RoleHierarchyBuilder::build`];
//! lookups afterwards are plain set reads.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_USER: &str = "ROLE_USER";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleHierarchyError {
    #[error("role hierarchy contains a cycle through {0}")]
    Cycle(Role),
    #[error("role {0} cannot imply itself")]
    SelfImplication(Role),
}

#[derive(Debug, Default)]
pub struct RoleHierarchyBuilder {
    edges: BTreeMap<Role, BTreeSet<Role>>,
}

impl RoleHierarchyBuilder {
    /// Declare that holding `higher` grants `lower` as well.
    #[must_use]
    pub fn implies(mut self, higher: &str, lower: &str) -> Self {
        self.edges
            .entry(Role::new(higher))
            .or_default()
            .insert(Role::new(lower));
        self.edges.entry(Role::new(lower)).or_default();
        self
    }

    /// Validate the graph and precompute reachability for every role.
    ///
    /// # Errors
    ///
    /// Returns an error if a role implies itself directly or through a cycle.
    pub fn build(self) -> Result<RoleHierarchy, RoleHierarchyError> {
        for (role, lower) in &self.edges {
            if lower.contains(role) {
                return Err(RoleHierarchyError::SelfImplication(role.clone()));
            }
        }

        let mut reachable = BTreeMap::new();
        for role in self.edges.keys() {
            let mut seen = BTreeSet::new();
            let mut stack: Vec<&Role> = self.edges[role].iter().collect();
            while let Some(next) = stack.pop() {
                if next == role {
                    return Err(RoleHierarchyError::Cycle(role.clone()));
                }
                if seen.insert(next.clone()) {
                    if let Some(children) = self.edges.get(next) {
                        stack.extend(children.iter());
                    }
                }
            }
            reachable.insert(role.clone(), seen);
        }

        Ok(RoleHierarchy { reachable })
    }
}

/// Resolved hierarchy: each role maps to every role it implies.
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    reachable: BTreeMap<Role, BTreeSet<Role>>,
}

impl RoleHierarchy {
    #[must_use]
    pub fn builder() -> RoleHierarchyBuilder {
        RoleHierarchyBuilder::default()
    }

    /// `ROLE_ADMIN > ROLE_USER`.
    ///
    /// # Errors
    ///
    /// Never in practice; the default graph is acyclic.
    pub fn standard() -> Result<Self, RoleHierarchyError> {
        Self::builder().implies(ROLE_ADMIN, ROLE_USER).build()
    }

    /// Granted roles plus everything they imply.
    #[must_use]
    pub fn effective_roles<'a, I>(&self, granted: I) -> BTreeSet<Role>
    where
        I: IntoIterator<Item = &'a Role>,
    {
        let mut effective = BTreeSet::new();
        for role in granted {
            effective.insert(role.clone());
            if let Some(implied) = self.reachable.get(role) {
                effective.extend(implied.iter().cloned());
            }
        }
        effective
    }

    /// Whether any granted role is, or implies, `required`.
    #[must_use]
    pub fn grants<'a, I>(&self, granted: I, required: &Role) -> bool
    where
        I: IntoIterator<Item = &'a Role>,
    {
        granted.into_iter().any(|role| {
            role == required
                || self
                    .reachable
                    .get(role)
                    .is_some_and(|implied| implied.contains(required))
        })
    }
}

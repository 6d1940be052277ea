//! What an update run intends to do, component by component.
//!
//! The application and the two tools are independent timelines. A tool whose
//! asset ships inside the application's release is *bundled*: it has no action of
//! its own and commits together with the application.

use std::fmt;

use super::comparator::Eligibility;
use super::release::{Component, ReleaseDescriptor};
use crate::core::UpdateError;

/// The decision for one component.
#[derive(Debug, Clone)]
pub struct ComponentAction {
    pub component: Component,
    /// Installed version, if known.
    pub installed: Option<String>,
    pub candidate: ReleaseDescriptor,
    pub eligibility: Eligibility,
    /// Tools shipped in this (application) release that commit with it.
    pub bundled: Vec<Component>,
}

impl ComponentAction {
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        self.eligibility.is_eligible()
    }
}

impl fmt::Display for ComponentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.component,
            self.installed.as_deref().unwrap_or("not installed"),
            self.candidate.version,
            self.eligibility
        )?;
        if !self.bundled.is_empty() {
            let names: Vec<&str> = self.bundled.iter().map(|c| c.as_str()).collect();
            write!(f, " with bundled {}", names.join(", "))?;
        }
        Ok(())
    }
}

/// A component that could not be resolved.
#[derive(Debug, Clone)]
pub struct ResolveFailure {
    pub component: Component,
    pub error: UpdateError,
}

/// Result of resolving and comparing every requested component.
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub actions: Vec<ComponentAction>,
    pub failures: Vec<ResolveFailure>,
}

impl UpdatePlan {
    /// Actions that would change the install.
    pub fn eligible(&self) -> impl Iterator<Item = &ComponentAction> {
        self.actions.iter().filter(|a| a.is_eligible())
    }

    #[must_use]
    pub fn has_updates(&self) -> bool {
        self.eligible().next().is_some()
    }

    #[must_use]
    pub fn action(&self, component: Component) -> Option<&ComponentAction> {
        self.actions.iter().find(|a| a.component == component)
    }

    /// Human-readable summary, one eligible action per line.
    #[must_use]
    pub fn summary(&self) -> String {
        self.eligible().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    }
}

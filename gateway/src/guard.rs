//! Route guards.
//!
//! SYSTEM CONTEXT
//! ==============
//! Screens declare whether they need a logged-in user or a logged-out one.
//! The navigation layer asks [`RouteGuard::check`] before rendering and follows
//! any redirect. Guards only read the session flag; they never block or cache.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use crate::config::Site;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// Protected screens: dashboard, profile, orders.
    RequireAuthenticated,
    /// Login and registration screens.
    RequireAnonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(&'static str),
}

impl RouteGuard {
    #[must_use]
    pub fn check(self, session: &Session, site: Site) -> GuardDecision {
        self.decide(session.is_authenticated(), site)
    }

    /// Same as [`RouteGuard::check`] for a known authentication state.
    #[must_use]
    pub fn decide(self, is_authenticated: bool, site: Site) -> GuardDecision {
        match (self, is_authenticated) {
            (RouteGuard::RequireAuthenticated, false) => GuardDecision::Redirect(site.entry_route()),
            (RouteGuard::RequireAnonymous, true) => GuardDecision::Redirect(site.dashboard_route()),
            _ => GuardDecision::Allow,
        }
    }
}

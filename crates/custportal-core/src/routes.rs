//! Route table and the guard in front of protected views.
//!
//! The guard never distinguishes why a check failed: an absent, expired or
//! unreadable token all redirect to [`Route::SignIn`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::auth::{Session, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    SignUp,
    Dashboard,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::SignIn, Route::SignUp, Route::Dashboard];

    pub fn path(&self) -> &'static str {
        match self {
            Route::SignIn => "/",
            Route::SignUp => "/sign-up",
            Route::Dashboard => "/dashboard",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        match path {
            "" | "/" | "/sign-in" => Some(Route::SignIn),
            "/sign-up" => Some(Route::SignUp),
            "/dashboard" => Some(Route::Dashboard),
            _ => None,
        }
    }

    /// Whether the view needs a live session
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Dashboard)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::SignIn => "Sign in to your account",
            Route::SignUp => "Register for an account",
            Route::Dashboard => "Dashboard",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Result of passing a view through the guard.
#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome<V> {
    Render(V),
    Redirect(Route),
}

impl<V> GuardOutcome<V> {
    pub fn is_redirect(&self) -> bool {
        matches!(self, GuardOutcome::Redirect(_))
    }
}

pub struct RouteGuard {
    manager: Arc<SessionManager>,
    changes: watch::Receiver<Option<Session>>,
}

impl RouteGuard {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let changes = manager.subscribe();
        Self { manager, changes }
    }

    /// Render the protected view only when a live session exists.
    ///
    /// `render` is not called when the outcome is a redirect.
    pub fn check<V>(&self, render: impl FnOnce() -> V) -> GuardOutcome<V> {
        if self.manager.is_authenticated() {
            GuardOutcome::Render(render())
        } else {
            debug!(to = %Route::SignIn, "Redirecting unauthenticated access");
            GuardOutcome::Redirect(Route::SignIn)
        }
    }

    /// Resolve a path to a view.
    ///
    /// Protected routes go through [`check`](Self::check). The sign-in and
    /// sign-up views send a signed-in user on to the dashboard, and unknown
    /// paths land on sign-in.
    pub fn navigate<V>(&self, path: &str, render: impl FnOnce(Route) -> V) -> GuardOutcome<V> {
        let Some(route) = Route::from_path(path) else {
            debug!(path, "Unknown route");
            return GuardOutcome::Redirect(Route::SignIn);
        };

        if route.is_protected() {
            self.check(|| render(route))
        } else if self.manager.is_authenticated() {
            GuardOutcome::Redirect(Route::Dashboard)
        } else {
            GuardOutcome::Render(render(route))
        }
    }

    /// Wait for the next session transition; re-run `check` afterwards.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }
}

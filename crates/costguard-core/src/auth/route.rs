//! Route awareness for the session lifecycle.
//!
//! The manager never renders anything; it only needs to know whether the
//! caller is on a page that works without a session, and a way to send the
//! caller back to the login entry point.

use std::sync::Mutex;

use tracing::info;

pub const LOGIN_ROUTE: &str = "/login";

/// Routes reachable without a session.
pub const PUBLIC_ROUTES: [&str; 3] = ["/login", "/signup", "/forgot-password"];

pub fn is_public_route(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&path)
}

pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;

    fn navigate(&self, route: &str);

    /// Go to the login entry point unless already on a public route.
    fn redirect_to_login(&self) {
        if !is_public_route(&self.current_route()) {
            self.navigate(LOGIN_ROUTE);
        }
    }
}

/// In-memory navigator tracking the current route.
#[derive(Debug)]
pub struct Router {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl Router {
    pub fn new(initial: &str) -> Self {
        Self {
            current: Mutex::new(initial.to_string()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Routes navigated to since creation, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Navigator for Router {
    fn current_route(&self) -> String {
        self.current.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn navigate(&self, route: &str) {
        info!(route, "Navigating");
        if let Ok(mut current) = self.current.lock() {
            *current = route.to_string();
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(route.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_routes() {
        assert!(is_public_route("/login"));
        assert!(is_public_route("/signup"));
        assert!(is_public_route("/forgot-password"));
        assert!(!is_public_route("/"));
        assert!(!is_public_route("/budgets"));
        assert!(!is_public_route("/login/extra"));
    }

    #[test]
    fn test_redirect_skips_public_routes() {
        let router = Router::new("/signup");
        router.redirect_to_login();
        assert!(router.history().is_empty());

        let router = Router::new("/budgets");
        router.redirect_to_login();
        assert_eq!(router.current_route(), "/login");
        router.redirect_to_login();
        assert_eq!(router.history(), vec!["/login".to_string()]);
    }
}

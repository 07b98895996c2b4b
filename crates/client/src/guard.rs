//! Redirect rules between the login page and the protected pages.
//!
//! Nothing is cached here: each evaluation reads the live [`SessionStore`]
//! and the navigator's current path, so a stale or duplicated notification
//! can at worst cause a no-op evaluation.

use std::sync::{Arc, Weak};

use crate::{
    navigation::{HOME_PATH, LOGIN_PATH, Navigator},
    session::SessionStore,
    storage::Subscription,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Public,
    Protected,
}

/// Strips query, fragment and trailing slashes: `/login/?next=x` is `/login`.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { HOME_PATH } else { trimmed }
}

pub fn classify(path: &str) -> PathKind {
    if normalize_path(path) == LOGIN_PATH {
        PathKind::Public
    } else {
        PathKind::Protected
    }
}

/// Where a context in `state` sitting on `path` has to go, if anywhere.
pub fn redirect_target(state: AuthState, path: &str) -> Option<&'static str> {
    match (state, classify(path)) {
        (AuthState::Unauthenticated, PathKind::Protected) => Some(LOGIN_PATH),
        (AuthState::Authenticated, PathKind::Public) => Some(HOME_PATH),
        _ => None,
    }
}

pub struct RouteGuard {
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
}

impl RouteGuard {
    pub fn new(session: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        Self { session, navigator }
    }

    pub fn state(&self) -> AuthState {
        if self.session.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    /// The navigation the current state calls for. `None` when the target is
    /// where the context already is.
    pub fn evaluate(&self) -> Option<&'static str> {
        let current = self.navigator.current_path();
        redirect_target(self.state(), &current)
            .filter(|target| *target != normalize_path(&current))
    }

    /// Evaluates and performs the redirect. Returns whether it navigated.
    pub fn enforce(&self) -> bool {
        let Some(target) = self.evaluate() else {
            return false;
        };
        tracing::debug!(
            from = %self.navigator.current_path(),
            to = target,
            "route guard redirect"
        );
        self.navigator.push(target);
        true
    }

    /// Path change initiated by the operator. The rule is applied to `path`
    /// before navigating, so a redirected visit never lands on `path` first.
    /// Returns whether the visit was redirected.
    pub fn visit(&self, path: &str) -> bool {
        let target = redirect_target(self.state(), path);
        let destination = target.unwrap_or(path);
        if let Some(target) = target {
            tracing::debug!(requested = path, to = target, "route guard redirect");
        }
        if normalize_path(destination) != normalize_path(&self.navigator.current_path()) {
            self.navigator.push(destination);
        }
        target.is_some()
    }

    /// Re-evaluates on every session change, local or from another context.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.session.subscribe(move |_| {
            if let Some(guard) = weak.upgrade() {
                guard.enforce();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        navigation::{ADMIN_PATH, Navigation, RecordingNavigator},
        storage::MemoryStorage,
    };

    fn guard_at(path: &str, token: Option<&str>) -> (RouteGuard, Arc<RecordingNavigator>) {
        let session = SessionStore::open(Arc::new(MemoryStorage::new().context())).unwrap();
        if let Some(token) = token {
            session.set_token(token).unwrap();
        }
        let navigator = Arc::new(RecordingNavigator::new(path));
        (RouteGuard::new(session, navigator.clone()), navigator)
    }

    #[test]
    fn decision_table() {
        let paths = ["/", "/admin", "/login", "/login/", "/login?next=/admin", "/anything"];
        for path in paths {
            let public = normalize_path(path) == LOGIN_PATH;
            assert_eq!(
                redirect_target(AuthState::Unauthenticated, path),
                (!public).then_some(LOGIN_PATH),
                "unauthenticated at {path}"
            );
            assert_eq!(
                redirect_target(AuthState::Authenticated, path),
                public.then_some(HOME_PATH),
                "authenticated at {path}"
            );
        }
    }

    #[test]
    fn missing_token_on_protected_path_goes_to_login() {
        let (guard, nav) = guard_at(ADMIN_PATH, None);
        assert!(guard.enforce());
        assert_eq!(nav.history(), vec![Navigation::Push(LOGIN_PATH.to_string())]);
    }

    #[test]
    fn token_on_login_goes_home() {
        let (guard, nav) = guard_at(LOGIN_PATH, Some("t"));
        assert!(guard.enforce());
        assert_eq!(nav.current_path(), HOME_PATH);
    }

    #[test]
    fn repeated_evaluation_navigates_once() {
        let (guard, nav) = guard_at("/", None);
        assert!(guard.enforce());
        assert!(!guard.enforce());
        assert!(!guard.enforce());
        assert_eq!(nav.history().len(), 1);
    }

    #[test]
    fn no_op_when_already_in_place() {
        let (guard, nav) = guard_at(LOGIN_PATH, None);
        assert_eq!(guard.evaluate(), None);
        assert!(!guard.enforce());
        assert!(nav.history().is_empty());
    }

    #[test]
    fn redirected_visit_never_lands_on_the_protected_path() {
        let (guard, nav) = guard_at(LOGIN_PATH, None);
        assert!(guard.visit(ADMIN_PATH));
        assert!(nav.history().is_empty());
        assert_eq!(nav.current_path(), LOGIN_PATH);

        let (guard, nav) = guard_at(ADMIN_PATH, None);
        assert!(guard.visit(HOME_PATH));
        assert_eq!(nav.history(), vec![Navigation::Push(LOGIN_PATH.to_string())]);
    }

    #[test]
    fn allowed_visit_navigates_once() {
        let (guard, nav) = guard_at(HOME_PATH, Some("t"));
        assert!(!guard.visit(ADMIN_PATH));
        assert!(!guard.visit(ADMIN_PATH));
        assert_eq!(nav.history(), vec![Navigation::Push(ADMIN_PATH.to_string())]);
    }

    #[test]
    fn attached_guard_follows_local_session_changes() {
        let (guard, nav) = guard_at(LOGIN_PATH, None);
        let guard = Arc::new(guard);
        let _sub = guard.attach();

        guard.session.set_token("t").unwrap();
        assert_eq!(nav.current_path(), HOME_PATH);

        guard.session.clear_token().unwrap();
        assert_eq!(nav.current_path(), LOGIN_PATH);
        assert_eq!(nav.history().len(), 2);
    }
}

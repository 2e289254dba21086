//! Account locking after repeated failed logins.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use super::{AuthEngine, client_state::ClientState, config::Modules, render::RedirectOptions};
use crate::{error::AuthError, models::User};

const MSG_LOCKED: &str = "Your account has been locked, please contact the administrator.";

/// Applies one failed attempt at `now` to the user's lock state.
///
/// Failures within `lock_window` of the previous one accumulate; a failure after the
/// window starts a new count. Reaching `lock_after` locks until `now + lock_duration`.
pub fn apply_failure(policy: &Modules, user: &mut User, now: DateTime<Utc>) {
    let within_window = user
        .last_attempt
        .is_some_and(|last| now - last <= policy.lock_window);

    user.attempt_count = if within_window {
        user.attempt_count.saturating_add(1)
    } else {
        1
    };
    if user.attempt_count >= policy.lock_after {
        user.locked = Some(now + policy.lock_duration);
    }
    user.last_attempt = Some(now);
}

/// Records a failed login. Returns the locked-out response when this failure locks (or
/// the account already was locked).
pub async fn record_failure(
    engine: &AuthEngine,
    state: &ClientState,
    user: &mut User,
) -> Result<Option<Response>, AuthError> {
    let now = Utc::now();
    apply_failure(&engine.config().modules, user, now);
    engine.storer().save(user.clone()).await?;

    if user.is_locked(now) {
        Ok(Some(reject_locked(engine, state, user)))
    } else {
        Ok(None)
    }
}

/// Clears the failure count after a successful login.
pub async fn reset_attempts(engine: &AuthEngine, mut user: User) -> Result<(), AuthError> {
    if user.attempt_count == 0 && user.locked.is_none() {
        return Ok(());
    }
    user.attempt_count = 0;
    user.locked = None;
    user.last_attempt = Some(Utc::now());
    engine.storer().save(user).await
}

pub fn reject_locked(engine: &AuthEngine, state: &ClientState, user: &User) -> Response {
    tracing::info!(pid = %user.pid(), "locked user rejected");
    let opts = RedirectOptions::to(engine.config().paths.lock_not_ok.clone()).failure(MSG_LOCKED);
    engine.redirect(state, opts)
}

/// require_unlocked
///
/// Route middleware: a logged in user whose account is locked is logged out and sent to
/// `lock_not_ok`. Anonymous requests pass through.
pub async fn require_unlocked(
    State(engine): State<AuthEngine>,
    state: ClientState,
    request: Request,
    next: Next,
) -> Response {
    let user = match engine.load_current_user(&state).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    match user {
        Some(user) if user.is_locked(Utc::now()) => {
            state.clear_session(&[]);
            reject_locked(&engine, &state, &user)
        }
        _ => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User::new("a@b.com", "A", String::new())
    }

    #[test]
    fn locks_on_third_failure_within_window() {
        let policy = Modules::default();
        let mut user = user();
        let start = Utc::now();

        apply_failure(&policy, &mut user, start);
        apply_failure(&policy, &mut user, start + Duration::minutes(1));
        assert_eq!(user.attempt_count, 2);
        assert!(!user.is_locked(start + Duration::minutes(1)));

        let third = start + Duration::minutes(2);
        apply_failure(&policy, &mut user, third);
        assert_eq!(user.attempt_count, 3);
        assert_eq!(user.locked, Some(third + Duration::hours(12)));
        assert!(user.is_locked(third + Duration::hours(11)));
        assert!(!user.is_locked(third + Duration::hours(13)));
    }

    #[test]
    fn failures_outside_window_restart_the_count() {
        let policy = Modules::default();
        let mut user = user();
        let start = Utc::now();

        apply_failure(&policy, &mut user, start);
        apply_failure(&policy, &mut user, start + Duration::minutes(1));
        let late = start + Duration::minutes(10);
        apply_failure(&policy, &mut user, late);

        assert_eq!(user.attempt_count, 1);
        assert_eq!(user.last_attempt, Some(late));
        assert!(user.locked.is_none());
    }

    #[test]
    fn lock_after_one_locks_immediately() {
        let policy = Modules {
            lock_after: 1,
            ..Modules::default()
        };
        let mut user = user();
        let now = Utc::now();
        apply_failure(&policy, &mut user, now);
        assert!(user.is_locked(now));
    }
}

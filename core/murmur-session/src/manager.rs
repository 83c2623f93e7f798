use crate::context::{SessionContext, SessionOptions};
use crate::error::{SessionError, SessionResult};
use murmur_types::UserId;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the current [`SessionContext`] and swaps it when the signed-in
/// user changes.
#[derive(Debug)]
pub struct SessionManager {
    options: SessionOptions,
    current: RwLock<Option<Arc<SessionContext>>>,
}

impl SessionManager {
    /// Creates a manager with no open session.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            current: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The open session, if any.
    pub fn current(&self) -> Option<Arc<SessionContext>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Makes `user` the active session.
    ///
    /// Switching to the user already active returns the open context.
    /// Otherwise the previous context is closed before the new one opens;
    /// if opening fails no session is left active.
    pub fn switch_user(&self, user: Option<UserId>) -> SessionResult<Arc<SessionContext>> {
        let mut current = self.lock_current();
        if let Some(ctx) = current.as_ref() {
            if ctx.user() == user.as_ref() && !ctx.is_closed() {
                debug!("Session for namespace {} already active", ctx.namespace());
                return Ok(ctx.clone());
            }
        }

        if let Some(previous) = current.take() {
            previous.close();
        }
        let ctx = Arc::new(SessionContext::open(user, &self.options)?);
        info!("Switched to session {}", ctx.namespace());
        *current = Some(ctx.clone());
        Ok(ctx)
    }

    /// [`switch_user`](Self::switch_user) on the blocking pool.
    pub async fn switch_user_async(
        self: &Arc<Self>,
        user: Option<UserId>,
    ) -> SessionResult<Arc<SessionContext>> {
        let manager = Arc::clone(self);
        tokio::task::spawn_blocking(move || manager.switch_user(user))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))?
    }

    /// Closes the active session without opening another. Returns whether
    /// one was open.
    pub fn end_session(&self) -> bool {
        match self.lock_current().take() {
            Some(ctx) => {
                ctx.close();
                true
            }
            None => false,
        }
    }

    /// Applies the current value of `signal`, then every change to it,
    /// until the sender is dropped. The last session stays open after
    /// that.
    pub fn follow(self: &Arc<Self>, mut signal: watch::Receiver<Option<UserId>>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let user = signal.borrow_and_update().clone();
                if let Err(e) = manager.switch_user_async(user).await {
                    warn!("Failed to open session: {}", e);
                }
                if signal.changed().await.is_err() {
                    break;
                }
            }
            debug!("Session signal closed, follower stopped");
        })
    }

    fn lock_current(&self) -> RwLockWriteGuard<'_, Option<Arc<SessionContext>>> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.end_session();
    }
}

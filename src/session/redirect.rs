use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::info;

use crate::{
    core::{ClientError, ErrorKind, Navigator},
    utils::request::path_matches,
};

use super::{LoginSurface, SessionStore};

const NEVER: u64 = u64::MAX;

/// Sends the user to the login surface after a session expiry.
///
/// At most one navigation per session epoch, and none when the navigator is
/// already showing the target surface.
pub struct LoginRedirector {
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    tenant_login_path: String,
    platform_login_path: String,
    redirected_epoch: AtomicU64,
}

impl LoginRedirector {
    pub fn new(
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        tenant_login_path: impl Into<String>,
        platform_login_path: impl Into<String>,
    ) -> Self {
        Self {
            session,
            navigator,
            tenant_login_path: tenant_login_path.into(),
            platform_login_path: platform_login_path.into(),
            redirected_epoch: AtomicU64::new(NEVER),
        }
    }

    pub fn target(&self) -> &str {
        match self.session.login_surface() {
            LoginSurface::Tenant => &self.tenant_login_path,
            LoginSurface::Platform => &self.platform_login_path,
        }
    }

    /// Returns `true` if a navigation was issued.
    pub fn handle(&self, error: &ClientError) -> bool {
        if error.kind() != Some(ErrorKind::SessionExpired) {
            return false;
        }

        let target = self.target().to_string();
        if path_matches(&self.navigator.current_path(), &target) {
            return false;
        }

        let epoch = self.session.epoch();
        if self.redirected_epoch.swap(epoch, Ordering::SeqCst) == epoch {
            return false;
        }

        info!("Session expired, redirecting to {target}");
        self.navigator.navigate(&target);
        true
    }
}

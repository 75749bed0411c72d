//! Session context
//!
//! The bearer token, the tenant id and the signed-in user's profile live in
//! persisted storage. [`SessionStore`] is the only reader and writer of those
//! keys; the dispatcher reads it on every call and tears it down on a 401.

pub mod activity;
pub mod redirect;
pub mod storage;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::core::{ClientResult, SessionStorage};

pub use activity::ActivityTracker;
pub use redirect::LoginRedirector;
pub use storage::{FileStorage, MemoryStorage};

pub const TOKEN_KEY: &str = "token";
pub const TENANT_KEY: &str = "tenant_id";
pub const USER_INFO_KEY: &str = "user_info";

/// Credentials attached to a protected request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub token: Option<String>,
    pub tenant_id: Option<String>,
}

/// Which login screen a user belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginSurface {
    Tenant,
    Platform,
}

/// Signed-in user's profile blob, as returned by the login endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct UserProfile {
    raw: JsonValue,
}

impl UserProfile {
    pub fn new(raw: JsonValue) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    /// `tenant_id` or `tenantId`, string or number
    pub fn tenant_id(&self) -> Option<String> {
        ["tenant_id", "tenantId"]
            .iter()
            .filter_map(|field| self.raw.get(field))
            .find_map(|value| match value {
                JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn is_platform_admin(&self) -> bool {
        self.raw.get("user_type").and_then(JsonValue::as_str) == Some("infra_superadmin")
            || self.raw.get("is_infra_admin").and_then(JsonValue::as_bool) == Some(true)
    }

    pub fn login_surface(&self) -> LoginSurface {
        if self.is_platform_admin() {
            LoginSurface::Platform
        } else {
            LoginSurface::Tenant
        }
    }
}

/// Process-wide session state over injected storage
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    user: ArcSwapOption<UserProfile>,
    epoch: AtomicU64,
    platform_user: AtomicBool,
}

impl SessionStore {
    /// Loads the persisted profile and reconciles the tenant id.
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let store = Self {
            storage,
            user: ArcSwapOption::empty(),
            epoch: AtomicU64::new(0),
            platform_user: AtomicBool::new(false),
        };

        if let Some(profile) = store.persisted_profile() {
            store
                .platform_user
                .store(profile.is_platform_admin(), Ordering::SeqCst);
            store.user.store(Some(Arc::new(profile)));
        }
        let _ = store.tenant_id();

        store
    }

    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        self.storage.clone()
    }

    fn persisted_profile(&self) -> Option<UserProfile> {
        let raw = self.storage.get(USER_INFO_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(UserProfile::new(value)),
            Err(e) => {
                warn!("Failed to parse persisted user_info: {e}");
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Dedicated key first, then the profile blob; a recovered id is written back.
    pub fn tenant_id(&self) -> Option<String> {
        if let Some(tenant_id) = self.storage.get(TENANT_KEY).filter(|t| !t.is_empty()) {
            return Some(tenant_id);
        }

        if let Some(tenant_id) = self.user.load_full().and_then(|p| p.tenant_id()) {
            return Some(self.write_back_tenant(tenant_id));
        }

        // the persisted blob may have gained a tenant since it was loaded
        let Some(profile) = self.persisted_profile() else {
            debug!("No user_info available to recover tenant_id from");
            return None;
        };
        match profile.tenant_id() {
            Some(tenant_id) => {
                self.platform_user
                    .store(profile.is_platform_admin(), Ordering::SeqCst);
                self.user.store(Some(Arc::new(profile)));
                Some(self.write_back_tenant(tenant_id))
            }
            None => {
                debug!("user_info has no tenant_id field");
                None
            }
        }
    }

    fn write_back_tenant(&self, tenant_id: String) -> String {
        if let Err(e) = self.storage.set(TENANT_KEY, &tenant_id) {
            warn!("Failed to persist recovered tenant_id: {e}");
        }
        info!("Recovered tenant_id {tenant_id} from user_info");
        tenant_id
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            token: self.token(),
            tenant_id: self.tenant_id(),
        }
    }

    pub fn user(&self) -> Option<Arc<UserProfile>> {
        self.user.load_full()
    }

    /// Incremented on every [`establish`](Self::establish).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Login surface of the current user, or of the last one torn down.
    pub fn login_surface(&self) -> LoginSurface {
        match self.user.load_full() {
            Some(profile) => profile.login_surface(),
            None if self.platform_user.load(Ordering::SeqCst) => LoginSurface::Platform,
            None => LoginSurface::Tenant,
        }
    }

    /// Stores a fresh login.
    pub fn establish(
        &self,
        token: &str,
        tenant_id: Option<&str>,
        user: Option<JsonValue>,
    ) -> ClientResult<()> {
        self.storage.set(TOKEN_KEY, token)?;

        let profile = user.map(UserProfile::new);
        match &profile {
            Some(profile) => self
                .storage
                .set(USER_INFO_KEY, &serde_json::to_string(profile.raw())?)?,
            None => self.storage.remove(USER_INFO_KEY)?,
        }

        let tenant_id = tenant_id
            .map(str::to_string)
            .or_else(|| profile.as_ref().and_then(UserProfile::tenant_id));
        match tenant_id {
            Some(tenant_id) => self.storage.set(TENANT_KEY, &tenant_id)?,
            None => self.storage.remove(TENANT_KEY)?,
        }

        self.platform_user.store(
            profile.as_ref().map_or(false, UserProfile::is_platform_admin),
            Ordering::SeqCst,
        );
        self.user.store(profile.map(Arc::new));
        self.epoch.fetch_add(1, Ordering::SeqCst);

        info!("Session established");
        Ok(())
    }

    /// Clears token, tenant and profile. Idempotent: returns `false` when there
    /// was nothing left to clear.
    pub fn clear(&self) -> bool {
        let had_token = self.token().is_some();
        let had_user = self.user.swap(None).is_some();

        for key in [TOKEN_KEY, TENANT_KEY, USER_INFO_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to remove {key} from session storage: {e}");
            }
        }

        had_token || had_user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(entries: &[(&str, &str)]) -> (Arc<MemoryStorage>, SessionStore) {
        let storage = Arc::new(MemoryStorage::new());
        for (k, v) in entries {
            storage.set(k, v).unwrap();
        }
        let store = SessionStore::new(storage.clone());
        (storage, store)
    }

    #[test]
    fn test_dedicated_tenant_key_wins() {
        let (_, store) = store_with(&[
            (TENANT_KEY, "7"),
            (USER_INFO_KEY, r#"{"tenant_id": 9}"#),
        ]);
        assert_eq!(store.tenant_id().as_deref(), Some("7"));
    }

    #[test]
    fn test_tenant_recovered_from_profile_and_written_back() {
        let (storage, store) = store_with(&[(USER_INFO_KEY, r#"{"tenantId": 12}"#)]);
        assert_eq!(storage.get(TENANT_KEY).as_deref(), Some("12"));
        assert_eq!(store.tenant_id().as_deref(), Some("12"));
    }

    #[test]
    fn test_late_profile_is_picked_up() {
        let (storage, store) = store_with(&[]);
        assert!(store.tenant_id().is_none());

        storage
            .set(USER_INFO_KEY, r#"{"tenant_id": "acme"}"#)
            .unwrap();
        assert_eq!(store.tenant_id().as_deref(), Some("acme"));
        assert_eq!(storage.get(TENANT_KEY).as_deref(), Some("acme"));
    }

    #[test]
    fn test_tenantless_profile_gains_tenant() {
        let (storage, store) = store_with(&[(USER_INFO_KEY, r#"{"username": "alice"}"#)]);
        assert!(store.tenant_id().is_none());

        storage
            .set(USER_INFO_KEY, r#"{"username": "alice", "tenant_id": 9}"#)
            .unwrap();
        assert_eq!(store.tenant_id().as_deref(), Some("9"));
        assert_eq!(storage.get(TENANT_KEY).as_deref(), Some("9"));
        assert_eq!(store.user().unwrap().tenant_id().as_deref(), Some("9"));
    }

    #[test]
    fn test_profile_without_tenant() {
        let (_, store) = store_with(&[(USER_INFO_KEY, r#"{"username": "x"}"#)]);
        assert!(store.tenant_id().is_none());
        assert!(store.context().tenant_id.is_none());
    }

    #[test]
    fn test_establish_and_clear() {
        let (storage, store) = store_with(&[]);
        assert_eq!(store.epoch(), 0);

        store
            .establish("tok", None, Some(json!({"tenant_id": 3, "user_type": "infra_superadmin"})))
            .unwrap();
        assert_eq!(store.epoch(), 1);
        assert_eq!(
            store.context(),
            SessionContext {
                token: Some("tok".to_string()),
                tenant_id: Some("3".to_string()),
            }
        );
        assert_eq!(store.login_surface(), LoginSurface::Platform);

        assert!(store.clear());
        assert!(!store.clear());
        assert!(storage.get(TOKEN_KEY).is_none());
        assert!(storage.get(TENANT_KEY).is_none());
        assert!(store.user().is_none());
        // surface survives the teardown so the redirect goes to the right place
        assert_eq!(store.login_surface(), LoginSurface::Platform);
    }

    #[test]
    fn test_profile_flags() {
        let profile = UserProfile::new(json!({"is_infra_admin": true}));
        assert!(profile.is_platform_admin());
        let profile = UserProfile::new(json!({"user_type": "tenant_user", "tenant_id": ""}));
        assert!(!profile.is_platform_admin());
        assert!(profile.tenant_id().is_none());
    }
}

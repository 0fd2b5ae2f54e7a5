//! Shared application state.

use crate::app::error::CommandResult;
use dashboard_config_and_utils::{Config, Paths};
use dashboard_storage::{create_storage, KeyStore, MemoryStorage, SecureStorage};
use profile_reconciler::{
    MemoryProfileStore, ProfileReconciler, ProfileStore, SupabaseProfileStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use ymir::{
    AuthGateway, AuthProvider, MockAuthProvider, RateLimitTracker, SessionCache,
    SupabaseAuthClient, SystemClock, VerificationConfig, VerificationStatusUpdater,
};

/// Credential name the shipped AI provider key is seeded under.
pub const AI_KEY_NAME: &str = "ai_provider";

/// Everything a command needs, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub key_store: KeyStore,
    pub gateway: Arc<AuthGateway>,
    pub reconciler: Arc<ProfileReconciler>,
    pub verification: Arc<VerificationStatusUpdater>,
}

impl AppState {
    /// Wire the components. `ephemeral` keeps everything in memory and talks
    /// to an in-process auth service instead of Supabase.
    pub fn build(config: Config, paths: &Paths, ephemeral: bool) -> CommandResult<Self> {
        let storage: Arc<dyn SecureStorage> = if ephemeral {
            Arc::new(MemoryStorage::new())
        } else {
            create_storage(paths)?
        };

        let (provider, store): (Arc<dyn AuthProvider>, Arc<dyn ProfileStore>) = if ephemeral {
            info!("Running with in-memory auth service and profile store");
            (
                Arc::new(MockAuthProvider::new().with_auto_confirm()),
                Arc::new(MemoryProfileStore::new()),
            )
        } else {
            let provider: Arc<dyn AuthProvider> = Arc::new(SupabaseAuthClient::new(
                &config.supabase_url,
                &config.supabase_publishable_key,
                storage.clone(),
            )?);
            let store = SupabaseProfileStore::new(
                &config.supabase_url,
                &config.supabase_publishable_key,
                provider.clone(),
            )?;
            (provider, Arc::new(store))
        };

        let clock = Arc::new(SystemClock);
        let cache = Arc::new(SessionCache::with_clock(
            storage.clone(),
            clock.clone(),
            Duration::from_secs(config.session_cache_ttl_secs),
        ));
        let gateway = Arc::new(AuthGateway::new(
            provider,
            cache,
            Arc::new(RateLimitTracker::default()),
        ));

        let reconciler = Arc::new(
            ProfileReconciler::new(gateway.clone(), store)
                .with_allow_unverified(config.allow_unverified_profiles),
        );

        let verification = Arc::new(VerificationStatusUpdater::with_config(
            gateway.clone(),
            clock,
            VerificationConfig {
                cooldown: Duration::from_secs(config.verification_cooldown_secs),
                ..Default::default()
            },
        ));

        let key_store = KeyStore::new(storage);
        if let Some(default_key) = config.default_ai_key.as_deref() {
            key_store.seed_default(AI_KEY_NAME, default_key);
        }

        Ok(Self {
            config: Arc::new(config),
            key_store,
            gateway,
            reconciler,
            verification,
        })
    }
}

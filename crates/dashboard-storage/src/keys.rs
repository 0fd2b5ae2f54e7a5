//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Cached session snapshot (JSON `{session, captured_at_ms}`)
    pub const SESSION_CACHE: &'static str = "auth_session_cache";

    /// Supabase session held by the auth client (JSON)
    pub const SUPABASE_SESSION: &'static str = "supabase_session";

    /// Namespace prefix for KeyStore credentials
    pub const CREDENTIAL_PREFIX: &'static str = "credential.";

    /// Storage key of a named credential.
    pub fn credential(name: &str) -> String {
        format!("{}{}", Self::CREDENTIAL_PREFIX, name)
    }
}

//! Storage key constants.

/// Logical storage keys used by the session layer.
pub struct StorageKeys;

impl StorageKeys {
    /// Short-lived bearer credential
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Long-lived credential exchanged for a new access token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Access token expiry (RFC 3339), when the server reported one
    pub const ACCESS_TOKEN_EXPIRES_AT: &'static str = "access_token_expires_at";

    /// Cached user identity (JSON)
    pub const USER: &'static str = "user";

    /// User id awaiting second-factor verification
    pub const PENDING_TWO_FACTOR_USER_ID: &'static str = "pending_2fa_user_id";

    /// Keys that make up an authenticated session.
    pub const SESSION: [&'static str; 4] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::ACCESS_TOKEN_EXPIRES_AT,
        Self::USER,
    ];
}

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Runtime configuration for the bot.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// User IDs allowed to open the admin panel.
    pub admins: Vec<i64>,

    /// Channel username (without `@`) users must be subscribed to before
    /// using the bot. `None` disables the check.
    pub required_channel: Option<String>,

    /// Idle negotiations older than this are evicted (seconds).
    pub negotiation_ttl_secs: u64,

    /// Interval between eviction sweeps (seconds).
    pub sweep_interval_secs: u64,
}

impl BotConfig {
    pub fn is_admin(&self, user: i64) -> bool {
        self.admins.contains(&user)
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("admins", &self.admins)
            .field("required_channel", &self.required_channel)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            admins: Vec::new(),
            required_channel: None,
            negotiation_ttl_secs: 86_400,
            sweep_interval_secs: 600,
        }
    }
}

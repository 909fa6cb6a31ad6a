//! Session configuration.
//!
//! The on-disk format is a JSON document with camelCase keys:
//!
//! ```json
//! {
//!   "accountSettings": {
//!     "arrAccountId": "00000000-0000-0000-0000-000000000000",
//!     "arrAccountKey": "<key>",
//!     "arrAccountDomain": "westus2.mixedreality.azure.com",
//!     "region": "westus2"
//!   },
//!   "renderingSessionSettings": { "vmSize": "standard", "maxLeaseTime": "0:10:00" },
//!   "modelSettings": { "modelUri": "builtin://Engine" },
//!   "sessionOverride": "",
//!   "pollIntervalSeconds": 10,
//!   "stopSessionOnExit": false
//! }
//! ```
//!
//! Everything except the account id, key and domain has a default.

use std::{fmt, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, session::SessionId};

/// Model loaded when none is configured.
pub const DEFAULT_MODEL_URI: &str = "builtin://Engine";

/// Default spacing between session property queries.
///
/// The service throttles clients that query more often than this.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default session lease.
pub const DEFAULT_MAX_LEASE: Duration = Duration::from_secs(10 * 60);

/// Account used to authenticate against the rendering service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    /// Account id (GUID)
    #[serde(rename = "arrAccountId")]
    pub account_id: String,
    /// Account key
    #[serde(rename = "arrAccountKey")]
    pub account_key: String,
    /// Domain the account was created in
    #[serde(rename = "arrAccountDomain")]
    pub account_domain: String,
    /// Region the session is created in; defaults to the account domain's
    #[serde(default)]
    pub region: Option<String>,
}

impl AccountSettings {
    /// Account settings without an explicit region.
    pub fn new(
        account_id: impl Into<String>,
        account_key: impl Into<String>,
        account_domain: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            account_key: account_key.into(),
            account_domain: account_domain.into(),
            region: None,
        }
    }
}

// The key never ends up in logs.
impl fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSettings")
            .field("account_id", &self.account_id)
            .field("account_key", &"<redacted>")
            .field("account_domain", &self.account_domain)
            .field("region", &self.region)
            .finish()
    }
}

/// Size of the VM backing a rendering session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmSize {
    /// Standard size
    #[default]
    #[serde(alias = "Standard")]
    Standard,
    /// Premium size (larger models)
    #[serde(alias = "Premium")]
    Premium,
}

/// Parameters for creating a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCreationParams {
    /// VM size
    pub vm_size: VmSize,
    /// Lease after which the service expires the session
    pub max_lease: Duration,
}

impl Default for SessionCreationParams {
    fn default() -> Self {
        Self { vm_size: VmSize::Standard, max_lease: DEFAULT_MAX_LEASE }
    }
}

/// How the runtime composes remote and local content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderMode {
    /// Service default
    #[default]
    Default,
    /// Tile based composition
    TileBasedComposition,
    /// Depth based composition
    DepthBasedComposition,
}

/// Parameters for connecting to the runtime of a ready session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Composition mode
    #[serde(default)]
    pub render_mode: RenderMode,
    /// Skip TLS certificate validation (development only)
    #[serde(default)]
    pub ignore_certificate_validation: bool,
}

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Account credentials
    pub account: AccountSettings,
    /// New-session parameters
    pub creation: SessionCreationParams,
    /// Runtime connection parameters
    pub connect: ConnectParams,
    /// Model to load once connected
    pub model_uri: String,
    /// Existing session to reopen instead of creating a new one
    pub session_override: Option<SessionId>,
    /// Minimum spacing between property queries
    pub poll_interval: Duration,
    /// Stop the remote session (not just disconnect) on shutdown
    pub stop_session_on_exit: bool,
}

impl SessionConfig {
    /// Configuration with defaults for everything but the account.
    pub fn new(account: AccountSettings) -> Self {
        Self {
            account,
            creation: SessionCreationParams::default(),
            connect: ConnectParams::default(),
            model_uri: DEFAULT_MODEL_URI.to_string(),
            session_override: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_session_on_exit: false,
        }
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)?;
        file.validate()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    account_settings: AccountSettings,
    #[serde(default)]
    rendering_session_settings: RenderingSessionSettings,
    #[serde(default)]
    model_settings: ModelSettings,
    #[serde(default)]
    connect_settings: ConnectParams,
    #[serde(default)]
    session_override: String,
    #[serde(default)]
    poll_interval_seconds: Option<f64>,
    #[serde(default)]
    stop_session_on_exit: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderingSessionSettings {
    #[serde(default)]
    vm_size: VmSize,
    #[serde(default)]
    max_lease_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelSettings {
    #[serde(default)]
    model_uri: Option<String>,
}

impl ConfigFile {
    fn validate(self) -> Result<SessionConfig, ConfigError> {
        let account = self.account_settings;
        for (field, value) in [
            ("arrAccountId", &account.account_id),
            ("arrAccountKey", &account.account_key),
            ("arrAccountDomain", &account.account_domain),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue { field, reason: "must not be empty".into() });
            }
        }

        let max_lease = match self.rendering_session_settings.max_lease_time {
            Some(text) => parse_lease(&text)?,
            None => DEFAULT_MAX_LEASE,
        };

        let poll_interval = match self.poll_interval_seconds {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "pollIntervalSeconds",
                    reason: format!("{secs}: {e}"),
                }
            })?,
            Some(secs) => {
                return Err(ConfigError::InvalidValue {
                    field: "pollIntervalSeconds",
                    reason: format!("{secs} is not a positive number of seconds"),
                });
            },
            None => DEFAULT_POLL_INTERVAL,
        };

        let model_uri = match self.model_settings.model_uri {
            Some(uri) if uri.trim().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    field: "modelUri",
                    reason: "must not be empty".into(),
                });
            },
            Some(uri) => uri,
            None => DEFAULT_MODEL_URI.to_string(),
        };

        let session_override = match self.session_override.trim() {
            "" => None,
            id => Some(SessionId::new(id)),
        };

        Ok(SessionConfig {
            account,
            creation: SessionCreationParams {
                vm_size: self.rendering_session_settings.vm_size,
                max_lease,
            },
            connect: self.connect_settings,
            model_uri,
            session_override,
            poll_interval,
            stop_session_on_exit: self.stop_session_on_exit,
        })
    }
}

/// Parse a lease given as `h:mm:ss` or `h:mm`.
fn parse_lease(text: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue { field: "maxLeaseTime", reason };

    let parts = text
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(format!("{text:?}: {e}")))?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid(format!("{text:?} is not h:mm:ss"))),
    };

    if minutes >= 60 || seconds >= 60 {
        return Err(invalid(format!("{text:?} has out of range minutes or seconds")));
    }

    let total = hours
        .checked_mul(3600)
        .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| invalid(format!("{text:?} is too long")))?;

    let lease = Duration::from_secs(total);
    if lease.is_zero() {
        return Err(invalid("lease must be non-zero".into()));
    }

    Ok(lease)
}

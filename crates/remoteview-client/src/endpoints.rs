//! URLs of the token service and the session management API.

use remoteview_core::{SessionId, config::AccountSettings};

/// Session management API version.
pub const API_VERSION: &str = "2021-01-01";

/// Base URLs for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    sts: String,
    service: String,
    account_id: String,
}

impl Endpoints {
    /// Endpoints derived from the account settings.
    ///
    /// Sessions are created in the configured region, or in the region the
    /// account domain names when none is configured.
    pub fn for_account(account: &AccountSettings) -> Self {
        let region = account
            .region
            .as_deref()
            .map(str::trim)
            .filter(|region| !region.is_empty())
            .unwrap_or_else(|| region_of_domain(&account.account_domain));

        Self::new(
            format!("https://sts.{}", account.account_domain),
            format!("https://remoterendering.{region}.mixedreality.azure.com"),
            &account.account_id,
        )
    }

    /// Explicit base URLs.
    pub fn new(sts_base: impl Into<String>, service_base: impl Into<String>, account_id: &str) -> Self {
        let trim = |base: String| base.trim_end_matches('/').to_string();
        Self {
            sts: trim(sts_base.into()),
            service: trim(service_base.into()),
            account_id: account_id.to_string(),
        }
    }

    /// Access token request.
    pub fn token(&self) -> String {
        format!("{}/accounts/{}/token", self.sts, self.account_id)
    }

    /// Create (PUT) and properties (GET) of one session.
    pub fn session(&self, session: &SessionId) -> String {
        format!(
            "{}/accounts/{}/sessions/{session}?api-version={API_VERSION}",
            self.service, self.account_id
        )
    }

    /// Stop (POST) one session.
    pub fn stop(&self, session: &SessionId) -> String {
        format!(
            "{}/accounts/{}/sessions/{session}/:stop?api-version={API_VERSION}",
            self.service, self.account_id
        )
    }
}

/// `westus2.mixedreality.azure.com` -> `westus2`
fn region_of_domain(domain: &str) -> &str {
    domain.trim().split('.').next().unwrap_or(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_from_domain() {
        let account = AccountSettings::new("acc", "key", "westus2.mixedreality.azure.com");
        let endpoints = Endpoints::for_account(&account);

        assert_eq!(
            endpoints.token(),
            "https://sts.westus2.mixedreality.azure.com/accounts/acc/token"
        );
        assert_eq!(
            endpoints.session(&SessionId::new("s1")),
            "https://remoterendering.westus2.mixedreality.azure.com/accounts/acc/sessions/s1?api-version=2021-01-01"
        );
    }

    #[test]
    fn explicit_region_wins() {
        let mut account = AccountSettings::new("acc", "key", "westus2.mixedreality.azure.com");
        account.region = Some("eastus".into());

        let stop = Endpoints::for_account(&account).stop(&SessionId::new("s1"));

        assert_eq!(
            stop,
            "https://remoterendering.eastus.mixedreality.azure.com/accounts/acc/sessions/s1/:stop?api-version=2021-01-01"
        );
    }

    #[test]
    fn blank_region_falls_back_to_domain() {
        let mut account = AccountSettings::new("acc", "key", "eastus.mixedreality.azure.com");
        account.region = Some("  ".into());

        let session = Endpoints::for_account(&account).session(&SessionId::new("s1"));
        assert!(session.starts_with("https://remoterendering.eastus."), "{session}");
    }

    #[test]
    fn trailing_slashes_trimmed() {
        let endpoints = Endpoints::new("http://127.0.0.1:9/", "http://127.0.0.1:9//", "acc");
        assert_eq!(endpoints.token(), "http://127.0.0.1:9/accounts/acc/token");
    }
}

//! HTTP session against the gateway's local API.

use crate::config::Credentials;
use crate::error::{ExporterError, Result};
use crate::gateway_api::{
    decode, Aggregates, Endpoint, GatewayConfig, GridStatus, Installer, LoginRequest,
    LoginResponse, Network, Operation, Powerwalls, SiteInfo, SiteMaster, Soe, Solar, Status,
};
use crate::model::{DeviceSnapshot, FixedInfo};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns the configured gateway into the API base URL. A bare host becomes
/// `https://<host>/api`; a value that already has a scheme is kept.
pub fn base_url(gateway: &str) -> String {
    let gateway = gateway.trim().trim_end_matches('/');
    if gateway.starts_with("http://") || gateway.starts_with("https://") {
        gateway.to_string()
    } else {
        format!("https://{gateway}/api")
    }
}

pub struct GatewayClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// A client with no session yet. Gateways ship a self-signed
    /// certificate, so certificate checks are off.
    pub fn new(gateway: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            base_url: base_url(gateway),
            token: None,
            client,
        })
    }

    /// Builds a client and logs in.
    pub async fn connect(gateway: &str, credentials: &Credentials) -> Result<Self> {
        let mut client = Self::new(gateway).map_err(|source| ExporterError::UnreachableDevice {
            endpoint: Endpoint::Login,
            source,
        })?;
        client.login(credentials).await?;
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_session(&self) -> bool {
        self.token.is_some()
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<LoginResponse> {
        let request = LoginRequest {
            username: "customer".to_string(),
            email: credentials.email.clone(),
            password: credentials.password.clone(),
            force_sm_off: false,
        };
        let endpoint = Endpoint::Login;
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|source| ExporterError::UnreachableDevice { endpoint, source })?;
        let login: LoginResponse = Self::read(endpoint, response).await?;
        info!(email = %login.email, login_time = %login.login_time, "Logged in to gateway");
        self.token = Some(login.token.clone());
        Ok(login)
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T> {
        let mut request = self.client.get(self.url(endpoint));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ExporterError::UnreachableDevice { endpoint, source })?;
        Self::read(endpoint, response).await
    }

    async fn read<T: DeserializeOwned>(endpoint: Endpoint, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ExporterError::UnexpectedStatus { endpoint, status });
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| ExporterError::UnreachableDevice { endpoint, source })?;
        debug!(%endpoint, bytes = body.len(), "gateway response");
        decode(endpoint, &body)
    }

    pub async fn networks(&self) -> Result<Vec<Network>> {
        self.get(Endpoint::Networks).await
    }

    pub async fn site_info(&self) -> Result<SiteInfo> {
        self.get(Endpoint::SiteInfo).await
    }

    pub async fn operation(&self) -> Result<Operation> {
        self.get(Endpoint::Operation).await
    }

    pub async fn config(&self) -> Result<GatewayConfig> {
        self.get(Endpoint::Config).await
    }

    pub async fn powerwalls(&self) -> Result<Powerwalls> {
        self.get(Endpoint::Powerwalls).await
    }

    pub async fn status(&self) -> Result<Status> {
        self.get(Endpoint::Status).await
    }

    pub async fn site_master(&self) -> Result<SiteMaster> {
        self.get(Endpoint::SiteMaster).await
    }

    pub async fn aggregates(&self) -> Result<Aggregates> {
        self.get(Endpoint::Aggregates).await
    }

    pub async fn soe(&self) -> Result<Soe> {
        self.get(Endpoint::Soe).await
    }

    pub async fn grid_status(&self) -> Result<GridStatus> {
        self.get(Endpoint::GridStatus).await
    }

    pub async fn solars(&self) -> Result<Vec<Solar>> {
        self.get(Endpoint::Solars).await
    }

    pub async fn installer(&self) -> Result<Installer> {
        self.get(Endpoint::Installer).await
    }

    /// Reads the attributes that stay put for the life of the process.
    pub async fn fetch_fixed_info(&self) -> Result<FixedInfo> {
        let site_info = self.site_info().await?;
        let powerwalls = self.powerwalls().await?;
        let config = self.config().await?;
        let solars = self.solars().await?;
        let fixed = FixedInfo::from_responses(&site_info, &powerwalls, &config, &solars);
        info!(
            site = %fixed.site_name,
            powerwalls = fixed.num_powerwalls,
            solar_rating_w = fixed.total_solar_power_rating_watts,
            "Fetched fixed site info"
        );
        Ok(fixed)
    }

    /// Fetches every per-poll response. The first failure aborts the snapshot.
    pub async fn fetch_snapshot(&self) -> Result<DeviceSnapshot> {
        Ok(DeviceSnapshot {
            networks: self.networks().await?,
            operation: self.operation().await?,
            status: self.status().await?,
            powerwalls: self.powerwalls().await?,
            site_master: self.site_master().await?,
            aggregates: self.aggregates().await?,
            soe: self.soe().await?,
            grid_status: self.grid_status().await?,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::gateway_api::{fixtures, Endpoint};
    use mockito::{Mock, ServerGuard};

    pub const TOKEN: &str =
        "OgiGHjoNvwx17SRIaYFIOWPJSaKBYwmMGc5K4tTz57EziltPYsdtjU_DJ08tJqaWbWjTuI3fa_8QW32ED5zg1A==";

    pub fn body(endpoint: Endpoint) -> &'static str {
        match endpoint {
            Endpoint::Login => fixtures::LOGIN,
            Endpoint::Networks => fixtures::NETWORKS,
            Endpoint::SiteInfo => fixtures::SITE_INFO,
            Endpoint::Operation => fixtures::OPERATION,
            Endpoint::Config => fixtures::CONFIG,
            Endpoint::Powerwalls => fixtures::POWERWALLS,
            Endpoint::Status => fixtures::STATUS,
            Endpoint::SiteMaster => fixtures::SITEMASTER,
            Endpoint::Aggregates => fixtures::AGGREGATES,
            Endpoint::Soe => fixtures::SOE,
            Endpoint::GridStatus => fixtures::GRID_STATUS,
            Endpoint::Solars => fixtures::SOLARS,
            Endpoint::Installer => fixtures::INSTALLER,
        }
    }

    pub fn mock_login(server: &mut ServerGuard) -> Mock {
        server
            .mock("POST", Endpoint::Login.path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("set-cookie", "AuthCookie=session-cookie; Path=/")
            .with_body(fixtures::LOGIN)
            .create()
    }

    pub fn mock_endpoint(server: &mut ServerGuard, endpoint: Endpoint) -> Mock {
        server
            .mock("GET", endpoint.path())
            .match_header("authorization", format!("Bearer {TOKEN}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body(endpoint))
            .expect_at_least(1)
            .create()
    }
}

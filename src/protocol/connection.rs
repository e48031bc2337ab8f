use reqwest::Url;

use crate::config::ConnectionSettings;

/// Everything needed to open one control channel session.
///
/// The identity fields are fixed for the life of the process; `token` is
/// re-read from the [`TokenStore`](super::TokenStore) before every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub protocol_version: String,
    pub manufacturer: String,
    pub device: String,
    pub app_name: String,
    pub app_version: String,
    pub token: Option<String>,
}

impl ConnectionConfig {
    pub fn from_settings(settings: &ConnectionSettings, token: Option<String>) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            protocol_version: settings.protocol_version.clone(),
            manufacturer: settings.manufacturer.clone(),
            device: settings.device.clone(),
            app_name: settings.app_name.clone(),
            app_version: settings.app_version.clone(),
            token,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// `ws://<host>:<port>/?protocol-version=..&manufacturer=..&device=..&app=..&app-version=..[&token=..]`
    pub fn url(&self) -> String {
        let base = format!("ws://{}:{}/", self.host, self.port);
        let mut params: Vec<(&str, &str)> = vec![
            ("protocol-version", self.protocol_version.as_str()),
            ("manufacturer", self.manufacturer.as_str()),
            ("device", self.device.as_str()),
            ("app", self.app_name.as_str()),
            ("app-version", self.app_version.as_str()),
        ];
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            params.push(("token", token));
        }

        match Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            // host was not a valid authority; let the connect attempt report it
            Err(_) => base,
        }
    }

    /// The URL with the token value masked, for logging.
    pub fn redacted_url(&self) -> String {
        match &self.token {
            Some(_) => self.clone().with_token(Some("***".to_string())).url(),
            None => self.url(),
        }
    }
}

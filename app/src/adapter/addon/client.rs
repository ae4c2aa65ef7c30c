use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;

use super::{AddonApi, AddonClientError, AddonSummary, model};
use crate::core::PowerCommand;
use crate::server::ServerConfig;

/// HTTP wrapper around one server's addon. Stateless; every operation is a
/// single request carrying the target BMC and credentials as parameters.
#[derive(Debug, Clone)]
pub struct AddonClient {
    client: ClientWithMiddleware,
    base_url: String,
    query: Vec<(&'static str, String)>,
    connect_retries: u32,
}

impl AddonClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(config.request_timeout).new_tracing_client()?;

        let query = vec![
            ("host", config.host.clone()),
            ("port", config.port.to_string()),
            ("user", config.username.clone()),
            ("password", config.password.clone()),
        ];

        Ok(Self {
            client,
            base_url: config.addon_url.trim_end_matches('/').to_owned(),
            query,
            connect_retries: config.connect_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: Option<&str>) -> Result<T, AddonClientError> {
        let url = match path {
            Some(path) => format!("{}/{}", self.base_url, path),
            None => self.base_url.clone(),
        };

        let mut attempt = 0;
        let response = loop {
            match self.client.get(&url).query(&self.query).send().await {
                Ok(response) => break response,
                Err(e) if is_connection_failure(&e) && attempt < self.connect_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Request to addon {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        self.connect_retries,
                        e
                    );
                }
                Err(e) => return Err(AddonClientError::Unreachable(e.to_string())),
            }
        };

        let body = response
            .text()
            .await
            .map_err(|e| AddonClientError::Unreachable(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| AddonClientError::Malformed(e.to_string()))
    }
}

fn is_connection_failure(error: &reqwest_middleware::Error) -> bool {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.is_connect() || e.is_timeout(),
        reqwest_middleware::Error::Middleware(_) => false,
    }
}

impl AddonApi for AddonClient {
    async fn fetch_summary(&self) -> Result<AddonSummary, AddonClientError> {
        let summary: AddonSummary = self.get_json(None).await?;

        if !summary.success {
            let message = summary
                .message
                .unwrap_or_else(|| "addon reported failure without a message".to_owned());
            return Err(AddonClientError::Addon(message));
        }

        Ok(summary)
    }

    #[tracing::instrument(skip(self))]
    async fn execute_command(&self, command: PowerCommand) -> Result<(), AddonClientError> {
        let outcome: super::CommandOutcome = self.get_json(Some(model::command_path(command))).await?;

        if !outcome.success {
            let message = outcome
                .message
                .unwrap_or_else(|| "addon reported failure without a message".to_owned());
            return Err(AddonClientError::Addon(message));
        }

        Ok(())
    }
}

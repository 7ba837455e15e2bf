//! Controller backend over its `data_request` HTTP query interface

use async_trait::async_trait;
use rules_hub_core::{RuleStatusInfo, Timeline};
use std::time::Duration;

use crate::{FileTransport, RuleRuntime, StorageError, UploadOutcome};

/// Connection settings of the controller
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// e.g. `http://192.168.1.20:3480`
    pub base_url: String,
    /// Handler answering the rule engine commands
    pub handler: String,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3480".to_string(),
            handler: "lr_RulesEngine".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpConfig {
    /// Endpoint of the handler commands
    pub fn command_endpoint(&self) -> String {
        format!("{}/data_request", self.base_url.trim_end_matches('/'))
    }

    /// URL a rule file is served from, one encoded segment per path part
    pub fn file_url(&self, path: &str) -> Result<reqwest::Url, StorageError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            StorageError::Connection(format!("Invalid controller URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidPath(path.to_string()))?
            .pop_if_empty()
            .extend(path.split('/').filter(|part| !part.is_empty()));
        Ok(url)
    }
}

/// A handler command; the query string is encoded by reqwest
fn command_request(
    client: &reqwest::Client,
    config: &HttpConfig,
    method: reqwest::Method,
    command: &str,
    params: &[(&str, String)],
) -> reqwest::RequestBuilder {
    client
        .request(method, config.command_endpoint())
        .query(&[("id", config.handler.as_str()), ("command", command)])
        .query(params)
}

fn connection_error(err: reqwest::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

fn client(config: &HttpConfig) -> Result<reqwest::Client, StorageError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(connection_error)
}

/// Rule runtime hosted by the controller
pub struct HttpRuntime {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpRuntime {
    pub fn new(config: HttpConfig) -> Result<Self, StorageError> {
        tracing::info!("Using rule runtime at {}", config.base_url);
        Ok(Self {
            client: client(&config)?,
            config,
        })
    }

    async fn command(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<String, StorageError> {
        let response = command_request(
            &self.client,
            &self.config,
            reqwest::Method::GET,
            command,
            params,
        )
        .send()
            .await
            .map_err(connection_error)?
            .error_for_status()
            .map_err(connection_error)?;
        response.text().await.map_err(connection_error)
    }
}

#[async_trait]
impl RuleRuntime for HttpRuntime {
    async fn get_rule_statuses(
        &self,
        rule_id: Option<u32>,
    ) -> Result<Vec<RuleStatusInfo>, StorageError> {
        let params: Vec<(&str, String)> = rule_id
            .map(|id| vec![("ruleId", id.to_string())])
            .unwrap_or_default();
        let body = self.command("getRulesInfos", &params).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_timeline(&self) -> Result<Timeline, StorageError> {
        let body = self.command("getTimeline", &[]).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn set_arming(&self, rule_id: u32, armed: bool) -> Result<(), StorageError> {
        self.command(
            "setRuleArming",
            &[("ruleId", rule_id.to_string()), ("arming", flag(armed))],
        )
        .await?;
        Ok(())
    }

    async fn set_acknowledgement(
        &self,
        rule_id: u32,
        acknowledged: bool,
    ) -> Result<(), StorageError> {
        self.command(
            "setRuleAcknowledgement",
            &[("ruleId", rule_id.to_string()), ("acknowledgement", flag(acknowledged))],
        )
        .await?;
        Ok(())
    }

    async fn load_rules_file(&self, file_name: &str) -> Result<(), StorageError> {
        self.command("loadRulesFile", &[("fileName", file_name.to_string())])
            .await?;
        Ok(())
    }
}

/// Rule files served and stored by the controller
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, StorageError> {
        Ok(Self {
            client: client(&config)?,
            config,
        })
    }
}

#[async_trait]
impl FileTransport for HttpTransport {
    async fn read_file(&self, path: &str) -> Result<String, StorageError> {
        let response = self
            .client
            .get(self.config.file_url(path)?)
            .send()
            .await
            .map_err(connection_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(format!("File {} not found", path)));
        }
        response
            .error_for_status()
            .map_err(connection_error)?
            .text()
            .await
            .map_err(connection_error)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<UploadOutcome, StorageError> {
        let response = command_request(
            &self.client,
            &self.config,
            reqwest::Method::POST,
            "saveRulesFile",
            &[("fileName", path.to_string())],
        )
        .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(content.to_string())
            .send()
            .await
            .map_err(connection_error)?;
        let text = response.text().await.map_err(connection_error)?;
        let outcome = UploadOutcome::from_response(path, &text);
        if !outcome.is_success() {
            tracing::error!("Upload of {} rejected: {}", path, text.trim());
        }
        Ok(outcome)
    }
}

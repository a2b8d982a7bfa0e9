use super::{AnalysisFailure, MetadataAnalyzer};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Client for an analysis service answering `POST /analyze?url=<locator>`
/// with a JSON metadata document.
///
/// A 4xx answer means the service read the file and rejected it; anything
/// else that is not a 2xx with JSON is treated as the service (or the file
/// behind the locator) being unreachable.
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: Client,
    endpoint: Url,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).or_raise(|| ErrorKind::InvalidRemote(format!("analyzer URL: {base_url}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("analyze").or_raise(|| ErrorKind::InvalidRemote(format!("analyzer URL: {base_url}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::InvalidRemote("analyzer client".to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataAnalyzer for HttpAnalyzer {
    async fn analyze(&self, locator: &str) -> std::result::Result<serde_json::Value, AnalysisFailure> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("url", locator)])
            .send()
            .await
            .map_err(|e| AnalysisFailure::Connectivity(e.to_string()))?;
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let reason = match body.trim() {
                "" => status.to_string(),
                body => body.chars().take(200).collect(),
            };
            return Err(AnalysisFailure::NotRaster(reason));
        }
        if !status.is_success() {
            return Err(AnalysisFailure::Connectivity(format!("analyzer answered {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| AnalysisFailure::Connectivity(format!("unreadable analyzer answer: {e}")))
    }
}

use async_trait::async_trait;
use elasticsearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    Elasticsearch, IndexParts,
};
use log::{debug, error};
use serde_json::json;
use url::Url;

use crate::features::sampler::Snapshot;
use crate::shared::error::SinkError;
use crate::shared::traits::SnapshotSink;

pub struct ElasticsearchSink {
    client: Elasticsearch,
    index: String,
}

impl ElasticsearchSink {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        index: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let url = format!("http://{}:{}", host, port);
        let url = Url::parse(&url).map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool);

        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.auth(Credentials::Basic(
                username.to_string(),
                password.to_string(),
            ));
        }

        let transport = builder
            .build()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            index: index.into(),
        })
    }
}

#[async_trait]
impl SnapshotSink for ElasticsearchSink {
    async fn store(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let response = self
            .client
            .index(IndexParts::Index(&self.index))
            .body(json!(snapshot))
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            debug!("indexed snapshot {} into {}", snapshot.id, self.index);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            error!("snapshot {} refused by elasticsearch: {}", snapshot.id, body);
            Err(SinkError::Rejected(format!(
                "elasticsearch returned {}: {}",
                status, body
            )))
        } else {
            Err(SinkError::Unavailable(format!(
                "elasticsearch returned {}: {}",
                status, body
            )))
        }
    }

    async fn health_check(&self) -> bool {
        match self.client.ping().send().await {
            Ok(response) => response.status_code().is_success(),
            Err(e) => {
                debug!("elasticsearch ping failed: {}", e);
                false
            }
        }
    }
}

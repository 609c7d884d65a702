//! Infill model client.
//!
//! Snippets are queued with [`InfillService::submit`] and sent as one batch
//! on [`InfillService::commit`]. The service answers with one prediction list
//! per snippet, in submission order.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::service::ServiceProcess;

#[async_trait]
pub trait InfillService: Send {
    async fn start(&mut self) -> Result<()>;

    /// Queue one snippet for the next batch.
    fn submit(&mut self, snippet: String, top_k: usize);

    /// Send every queued snippet and return their predictions in order.
    async fn commit(&mut self) -> Result<Vec<Vec<String>>>;

    async fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
struct InfillRequest {
    text: String,
    top_k: usize,
}

/// Infill model behind `POST /infill`.
pub struct HttpInfillService {
    process: ServiceProcess,
    pending: Vec<InfillRequest>,
}

impl HttpInfillService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            process: ServiceProcess::new("infill", config)?,
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl InfillService for HttpInfillService {
    async fn start(&mut self) -> Result<()> {
        self.process.start().await
    }

    fn submit(&mut self, snippet: String, top_k: usize) {
        self.pending.push(InfillRequest {
            text: snippet,
            top_k,
        });
    }

    async fn commit(&mut self) -> Result<Vec<Vec<String>>> {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(service = self.process.name(), snippets = batch.len(), "infill batch");
        self.process.post("/infill", &batch).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.process.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StubHttpServer;

    #[tokio::test]
    async fn test_commit_sends_batch_in_order() {
        let stub = StubHttpServer::start(|path, body| match path {
            "/health" => (200, "\"ok\"".to_string()),
            "/infill" => {
                let requests: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();
                let answers: Vec<Vec<String>> = requests
                    .iter()
                    .map(|r| vec![format!("{}!", r["text"].as_str().unwrap())])
                    .collect();
                (200, serde_json::to_string(&answers).unwrap())
            }
            _ => (404, "null".to_string()),
        })
        .await;

        let mut infill = HttpInfillService::new(ServiceConfig {
            port: Some(stub.port()),
            poll_interval_secs: 0.05,
            ..ServiceConfig::default()
        })
        .unwrap();
        infill.start().await.unwrap();
        infill.submit("a".to_string(), 1);
        infill.submit("b".to_string(), 1);
        let out = infill.commit().await.unwrap();
        assert_eq!(out, vec![vec!["a!".to_string()], vec!["b!".to_string()]]);

        // the queue is drained
        assert!(infill.commit().await.unwrap().is_empty());
        infill.stop().await.unwrap();

        let (_, body) = stub.requests().pop().unwrap();
        assert!(body.contains("\"top_k\":1"));
    }
}

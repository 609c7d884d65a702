//! In-process fakes for the external services (testing only)
//!
//! Provides `StubHttpServer`, `ScriptedInfill`, `ScriptedTrainer` and
//! `FakeMaterializer`, which satisfy the service contracts without Python,
//! model weights or a GPU.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::artifact::{Materializer, MATERIALIZED_FILES};
use crate::error::{RepairError, Result};
use crate::infill::InfillService;
use crate::validate::{TrainerService, ValidationResult};

// ---------------------------------------------------------------------------
// StubHttpServer
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server answering every request through a handler
/// `(path, body) -> (status, json body)`. One request per connection.
pub struct StubHttpServer {
    port: u16,
    requests: Arc<Mutex<Vec<(String, String)>>>,
    task: JoinHandle<()>,
}

impl StubHttpServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve_one(stream, handler.as_ref(), &log).await;
                });
            }
        });
        Self {
            port,
            requests,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `(path, body)` of every request received so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(
    stream: TcpStream,
    handler: &Handler,
    log: &Mutex<Vec<(String, String)>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    let body = String::from_utf8_lossy(&body).into_owned();

    log.lock().unwrap().push((path.clone(), body.clone()));
    let (status, payload) = handler(&path, &body);
    let response = format!(
        "HTTP/1.1 {status} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

// ---------------------------------------------------------------------------
// ScriptedInfill
// ---------------------------------------------------------------------------

/// Infill service answering each commit with the next scripted batch.
#[derive(Debug, Default)]
pub struct ScriptedInfill {
    batches: VecDeque<Vec<Vec<String>>>,
    pending: Vec<String>,
    submitted: Vec<String>,
}

impl ScriptedInfill {
    pub fn new(batches: Vec<Vec<Vec<String>>>) -> Self {
        Self {
            batches: batches.into(),
            ..Self::default()
        }
    }

    /// Every snippet submitted so far.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.clone()
    }
}

#[async_trait]
impl InfillService for ScriptedInfill {
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn submit(&mut self, snippet: String, _top_k: usize) {
        self.pending.push(snippet);
    }

    async fn commit(&mut self) -> Result<Vec<Vec<String>>> {
        let pending = std::mem::take(&mut self.pending);
        self.submitted.extend(pending);
        self.batches.pop_front().ok_or_else(|| RepairError::Service {
            name: "infill".to_string(),
            message: "script exhausted".to_string(),
        })
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTrainer
// ---------------------------------------------------------------------------

/// Trainer answering validations with scripted pass/fail outcomes.
#[derive(Debug, Default)]
pub struct ScriptedTrainer {
    outcomes: VecDeque<bool>,
    calls: Vec<(PathBuf, PathBuf)>,
    started: bool,
    stopped: bool,
}

impl ScriptedTrainer {
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: outcomes.into(),
            ..Self::default()
        }
    }

    /// `(model_dir, out_dir)` of every validation so far.
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.clone()
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

#[async_trait]
impl TrainerService for ScriptedTrainer {
    async fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    async fn valid(&mut self, model_dir: &Path, out_dir: &Path) -> Result<ValidationResult> {
        self.calls
            .push((model_dir.to_path_buf(), out_dir.to_path_buf()));
        let passed = self.outcomes.pop_front().ok_or_else(|| RepairError::Service {
            name: "trainer".to_string(),
            message: "script exhausted".to_string(),
        })?;
        Ok(ValidationResult {
            passed,
            time_cost: 1.0,
        })
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeMaterializer
// ---------------------------------------------------------------------------

type SourcePredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Writes placeholder artifact files instead of running the model.
#[derive(Default)]
pub struct FakeMaterializer {
    fail_when: Option<Box<SourcePredicate>>,
    skip_file: Option<&'static str>,
}

impl FakeMaterializer {
    /// Fail for sources matching `predicate`.
    pub fn failing_when<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            fail_when: Some(Box::new(predicate)),
            skip_file: None,
        }
    }

    /// Succeed but leave out `file`.
    pub fn without(file: &'static str) -> Self {
        Self {
            fail_when: None,
            skip_file: Some(file),
        }
    }
}

#[async_trait]
impl Materializer for FakeMaterializer {
    async fn materialize(&self, source: &Path, _work_dir: &Path, out_dir: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(source).await?;
        if self.fail_when.as_ref().is_some_and(|fail| fail(&text)) {
            return Err(RepairError::Materialize("scripted failure".to_string()));
        }
        let name = source
            .file_name()
            .ok_or_else(|| RepairError::Materialize("source has no file name".to_string()))?;
        let dir = out_dir.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        for file in MATERIALIZED_FILES {
            if Some(file) != self.skip_file {
                tokio::fs::write(dir.join(file), b"fake").await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_records_requests() {
        let stub = StubHttpServer::start(|path, body| (200, format!("[\"{path}\", {body}]"))).await;
        let client = reqwest::Client::new();
        let answer: serde_json::Value = client
            .post(format!("http://127.0.0.1:{}/valid", stub.port()))
            .json(&serde_json::json!({"a": 1}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(answer[0], "/valid");
        assert_eq!(answer[1]["a"], 1);
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_trainer_exhaustion() {
        let mut trainer = ScriptedTrainer::new(vec![true]);
        assert!(trainer.valid(Path::new("a"), Path::new("b")).await.unwrap().passed);
        assert!(trainer.valid(Path::new("a"), Path::new("b")).await.is_err());
        assert_eq!(trainer.calls().len(), 2);
    }
}

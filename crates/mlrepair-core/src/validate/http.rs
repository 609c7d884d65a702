use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{TrainerService, ValidationResult};
use crate::config::ServiceConfig;
use crate::error::{RepairError, Result};
use crate::service::ServiceProcess;

#[derive(Debug, Serialize)]
struct ValidRequest {
    model_dir: String,
    out_dir: String,
}

/// The trainer answers either with objects or with `[passed, time_cost]`
/// pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResult {
    Record { passed: bool, time_cost: f64 },
    Pair(bool, f64),
}

impl From<WireResult> for ValidationResult {
    fn from(wire: WireResult) -> Self {
        match wire {
            WireResult::Record { passed, time_cost } | WireResult::Pair(passed, time_cost) => {
                Self { passed, time_cost }
            }
        }
    }
}

/// The trainer runs in another working directory.
fn absolute(path: &Path) -> String {
    if path.is_absolute() {
        return path.display().to_string();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Trainer behind `POST /valid`.
pub struct HttpTrainerService {
    process: ServiceProcess,
}

impl HttpTrainerService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            process: ServiceProcess::new("trainer", config)?,
        })
    }
}

#[async_trait]
impl TrainerService for HttpTrainerService {
    async fn start(&mut self) -> Result<()> {
        self.process.start().await
    }

    async fn valid(&mut self, model_dir: &Path, out_dir: &Path) -> Result<ValidationResult> {
        let batch = [ValidRequest {
            model_dir: absolute(model_dir),
            out_dir: absolute(out_dir),
        }];
        let mut results: Vec<WireResult> = self.process.post("/valid", &batch).await?;
        if results.len() != 1 {
            return Err(RepairError::ContractViolation(format!(
                "trainer returned {} results for 1 artifact",
                results.len()
            )));
        }
        Ok(results.remove(0).into())
    }

    async fn stop(&mut self) -> Result<()> {
        self.process.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StubHttpServer;

    async fn trainer_answering(answer: &'static str) -> (StubHttpServer, HttpTrainerService) {
        let stub = StubHttpServer::start(move |path, _| match path {
            "/valid" => (200, answer.to_string()),
            _ => (200, "\"ok\"".to_string()),
        })
        .await;
        let mut trainer = HttpTrainerService::new(ServiceConfig {
            port: Some(stub.port()),
            poll_interval_secs: 0.05,
            ..ServiceConfig::default()
        })
        .unwrap();
        trainer.start().await.unwrap();
        (stub, trainer)
    }

    #[tokio::test]
    async fn test_object_form() {
        let (stub, mut trainer) =
            trainer_answering(r#"[{"passed": true, "time_cost": 12.5}]"#).await;
        let result = trainer
            .valid(Path::new("/a/bug.py.0"), Path::new("/v/bug.py.0"))
            .await
            .unwrap();
        assert_eq!(
            result,
            ValidationResult {
                passed: true,
                time_cost: 12.5
            }
        );
        let (_, body) = stub.requests().pop().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(sent[0]["model_dir"], "/a/bug.py.0");
        assert_eq!(sent[0]["out_dir"], "/v/bug.py.0");
    }

    #[tokio::test]
    async fn test_pair_form() {
        let (_stub, mut trainer) = trainer_answering("[[false, 3.0]]").await;
        let result = trainer
            .valid(Path::new("/a"), Path::new("/b"))
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.time_cost, 3.0);
    }

    #[tokio::test]
    async fn test_batch_size_mismatch() {
        let (_stub, mut trainer) = trainer_answering("[[true, 1.0], [true, 2.0]]").await;
        let err = trainer
            .valid(Path::new("/a"), Path::new("/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepairError::ContractViolation(_)));
    }
}

//! Lifecycle of the out-of-process HTTP services (infill model, trainer).
//!
//! A [`ServiceProcess`] optionally launches the service, polls `/health`
//! until it answers, posts JSON requests, and asks it to `/exit` on stop.
//! If the launched process dies before it becomes healthy, start-up fails
//! with its captured stderr.

use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{RepairError, Result};

/// Grace period for a service to exit after `/exit`.
const EXIT_GRACE: Duration = Duration::from_secs(10);

/// Ask the OS for a free local port.
pub fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

pub struct ServiceProcess {
    name: String,
    config: ServiceConfig,
    port: u16,
    client: reqwest::Client,
    child: Option<Child>,
    stderr_log: Option<NamedTempFile>,
}

impl ServiceProcess {
    pub fn new(name: impl Into<String>, config: ServiceConfig) -> Result<Self> {
        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            name: name.into(),
            config,
            port,
            client,
            child: None,
            stderr_log: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.config.host, self.port, path)
    }

    /// Launch (when configured) and block until `/health` answers.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(launch) = self.config.launch.clone() {
            self.spawn(&launch)?;
        }
        self.wait_healthy().await
    }

    fn spawn(&mut self, launch: &[String]) -> Result<()> {
        let port = self.port.to_string();
        let argv: Vec<String> = launch.iter().map(|a| a.replace("{port}", &port)).collect();
        let (exe, args) = argv.split_first().ok_or_else(|| {
            RepairError::Config(format!("{}: empty launch command", self.name))
        })?;

        let stderr_log = NamedTempFile::new()?;
        let child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_log.reopen()?))
            .kill_on_drop(true)
            .spawn()?;
        info!(
            event = "service.launched",
            service = %self.name,
            port = self.port,
            pid = child.id().unwrap_or_default(),
        );
        self.child = Some(child);
        self.stderr_log = Some(stderr_log);
        Ok(())
    }

    async fn healthy(&self) -> bool {
        let probe_timeout = Duration::from_secs_f64(self.config.poll_interval_secs.max(1.0));
        match self
            .client
            .post(self.url("/health"))
            .timeout(probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn wait_healthy(&mut self) -> Result<()> {
        let interval = Duration::from_secs_f64(self.config.poll_interval_secs.max(0.0));
        loop {
            if self.healthy().await {
                info!(event = "service.healthy", service = %self.name, port = self.port);
                return Ok(());
            }
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    self.child = None;
                    let stderr = self.captured_stderr();
                    return Err(RepairError::ServiceExited {
                        name: self.name.clone(),
                        stderr: format!("{status}: {}", stderr.trim()),
                    });
                }
            }
            debug!(service = %self.name, "not healthy yet");
            tokio::time::sleep(interval).await;
        }
    }

    fn captured_stderr(&self) -> String {
        self.stderr_log
            .as_ref()
            .and_then(|log| std::fs::read_to_string(log.path()).ok())
            .unwrap_or_default()
    }

    /// POST `body` as JSON and decode the JSON response.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RepairError::Service {
                name: self.name.clone(),
                message: format!("{path} returned {status}: {text}"),
            });
        }
        Ok(response.json().await?)
    }

    /// Ask a launched service to exit and reap it. Services that were
    /// already running are left alone.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        // the service may close the connection without answering
        let _ = self.client.post(self.url("/exit")).send().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(event = "service.stopped", service = %self.name, status = %status);
            }
            Err(_) => {
                warn!(event = "service.kill", service = %self.name, "no exit after /exit, killing");
                child.kill().await?;
            }
        }
        self.stderr_log = None;
        Ok(())
    }
}

//! Backend that evaluates each request by running an external command.
//!
//! The command receives `{"id": ..., "index": ..., "parameters": [...]}` on
//! stdin and writes its result to stdout, either a bare number or a JSON
//! object. Objects may carry `value`, `reference` and `status`/`message`;
//! the whole object is kept as the raw output for extractors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ro_optimizer::EvaluationBackend;
use ro_types::{BackendResult, EvaluationOutcome, EvaluationRequest, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::pool::TaskPoolConfig;

/// How to launch the evaluation command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Per-evaluation wall-clock limit; the process is killed when exceeded.
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl CommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: HashMap::new(),
            working_dir: None,
            timeout_secs: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[derive(Serialize)]
struct CommandInput<'a> {
    id: RequestId,
    index: usize,
    parameters: &'a [f64],
}

/// Runs one process per request, at most `max_concurrent_tasks` at a time.
pub struct CommandBackend {
    config: Arc<CommandConfig>,
    permits: Arc<Semaphore>,
}

impl CommandBackend {
    pub fn new(config: CommandConfig, limits: TaskPoolConfig) -> Self {
        Self {
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(limits.max_concurrent_tasks.max(1))),
        }
    }
}

#[async_trait]
impl EvaluationBackend for CommandBackend {
    async fn submit(&self, batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>> {
        debug!(program = %self.config.program, batch_size = batch.len(), "launching evaluation commands");

        let handles: Vec<_> = batch
            .into_iter()
            .map(|request| {
                let config = Arc::clone(&self.config);
                let permits = Arc::clone(&self.permits);
                let (id, index) = (request.id, request.index);
                let handle = tokio::spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(err) => return EvaluationOutcome::failed(format!("command pool closed: {err}")),
                    };
                    run_one(&config, &request).await
                });
                (id, index, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, index, handle) in handles {
            let mut outcome = handle.await.unwrap_or_else(|err| {
                warn!(index, error = %err, "evaluation command task did not complete");
                EvaluationOutcome::failed(format!("evaluation task failed: {err}"))
            });
            outcome.request_id = Some(id);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn name(&self) -> &str {
        "command"
    }
}

async fn run_one(config: &CommandConfig, request: &EvaluationRequest) -> EvaluationOutcome {
    let input = match serde_json::to_vec(&CommandInput {
        id: request.id,
        index: request.index,
        parameters: &request.parameters,
    }) {
        Ok(input) => input,
        Err(err) => return EvaluationOutcome::failed(format!("could not encode parameters: {err}")),
    };

    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .envs(&config.env_vars)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %config.program, error = %err, "failed to start evaluation command");
            return EvaluationOutcome::failed(format!("failed to start {}: {err}", config.program));
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(&input).await {
            debug!(index = request.index, error = %err, "command closed stdin early");
        }
    }

    let finished = child.wait_with_output();
    let output = match config.timeout() {
        Some(limit) => match tokio::time::timeout(limit, finished).await {
            Ok(output) => output,
            Err(_) => {
                warn!(index = request.index, timeout = ?limit, "evaluation command timed out");
                return EvaluationOutcome::failed(format!("timed out after {limit:?}"));
            }
        },
        None => finished.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(err) => return EvaluationOutcome::failed(format!("failed to collect command output: {err}")),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return EvaluationOutcome::failed(format!("command exited with {}: {}", output.status, stderr.trim()));
    }
    parse_output(&String::from_utf8_lossy(&output.stdout))
}

/// Interpret a command's stdout.
pub fn parse_output(stdout: &str) -> EvaluationOutcome {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return EvaluationOutcome::failed("command produced no output");
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Number(number)) => match number.as_f64() {
            Some(value) => EvaluationOutcome::ok(value),
            None => EvaluationOutcome::failed(format!("unrepresentable number {number}")),
        },
        Ok(Value::Object(map)) => {
            let reference = map.get("reference").and_then(Value::as_str).map(str::to_owned);
            let mut outcome = if map.get("status").and_then(Value::as_str) == Some("failed") {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("command reported failure");
                EvaluationOutcome::failed(message)
            } else {
                let value = map.get("value").and_then(Value::as_f64);
                let mut outcome = EvaluationOutcome::ok_output(Value::Object(map));
                outcome.value = value;
                outcome
            };
            if let Some(reference) = reference {
                outcome = outcome.with_reference(reference);
            }
            outcome
        }
        Ok(other) => EvaluationOutcome::ok_output(other),
        Err(err) => EvaluationOutcome::failed(format!("could not parse command output: {err}")),
    }
}

//! External reviewer contract and implementations.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{Result, ReviewerError};
use crate::process::run_with_input;

/// Raw output of one reviewer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerResponse {
    pub output: String,
    pub exit_code: Option<i32>,
}

/// Something that reads a prompt and answers with text.
#[async_trait]
pub trait ExternalReviewer: Send + Sync {
    async fn review(&self, prompt: &str) -> Result<ReviewerResponse>;
}

/// Runs a configured program with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandReviewer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    workdir: Option<PathBuf>,
}

impl CommandReviewer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ExternalReviewer for CommandReviewer {
    #[instrument(skip(self, prompt), fields(program = %self.program))]
    async fn review(&self, prompt: &str) -> Result<ReviewerResponse> {
        let out = run_with_input(
            &self.program,
            &self.args,
            prompt,
            self.timeout,
            self.workdir.as_deref(),
        )
        .await?;
        Ok(ReviewerResponse {
            output: out.stdout,
            exit_code: out.exit_code,
        })
    }
}

/// Replays canned responses in order. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    responses: Mutex<VecDeque<Result<ReviewerResponse>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedReviewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response with exit code 0.
    pub fn respond(self, output: impl Into<String>) -> Self {
        self.push(Ok(ReviewerResponse {
            output: output.into(),
            exit_code: Some(0),
        }))
    }

    pub fn fail(self, error: ReviewerError) -> Self {
        self.push(Err(error))
    }

    pub fn exit_with(self, output: impl Into<String>, code: i32) -> Self {
        self.push(Ok(ReviewerResponse {
            output: output.into(),
            exit_code: Some(code),
        }))
    }

    /// Sleep before every answer, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(mut self, response: Result<ReviewerResponse>) -> Self {
        self.responses.get_mut().push_back(response);
        self
    }

    /// Prompts received so far.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ExternalReviewer for ScriptedReviewer {
    async fn review(&self, prompt: &str) -> Result<ReviewerResponse> {
        self.prompts.lock().await.push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(ReviewerError::Unavailable("no scripted response left".into())))
    }
}

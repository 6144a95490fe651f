//! A deterministic engine that plays back a script
//!
//! Used by the CLI, by the server when no other engine is wired in, and by
//! tests that need to observe exactly what the engine received.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::{
    Engine, EngineError, InputHandle, InputReply, NativeEvent, NativePayload, NativeStream,
    RunRequest,
};

/// One scripted engine notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// An agent says something
    Say { agent: String, text: String },
    /// Ask the human for input and wait for the answer
    Ask { prompt: String },
    /// An agent repeats the most recent answer
    Echo { agent: String },
    ToolCall {
        agent: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    Think { agent: String, text: String },
    /// A notification of an arbitrary native kind
    Raw {
        kind: String,
        #[serde(default)]
        payload: Value,
    },
    /// A notification whose payload is not text
    Bytes { kind: String, data: Vec<u8> },
    /// Fail the run with the given category
    Fail { category: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Script { steps }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse engine script")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine script {}", path.display()))?;
        Self::from_json(&text)
    }

    /// A short vacation planning exchange with one round of feedback
    pub fn demo() -> Self {
        Script::new(vec![
            Step::Say {
                agent: "vacation_planner".to_string(),
                text: "Here is a five day plan for Lisbon: Alfama on day one, Belem on day two, \
                       Sintra on day three, the LX Factory on day four and a food tour to close."
                    .to_string(),
            },
            Step::Ask {
                prompt: "Do you like this plan? Reply with feedback or 'approve'.".to_string(),
            },
            Step::Echo {
                agent: "plan_modifier".to_string(),
            },
            Step::Say {
                agent: "plan_modifier".to_string(),
                text: "I have updated the plan with your feedback. Enjoy the trip!".to_string(),
            },
        ])
    }
}

/// Engine that replays a `Script` on every run
pub struct ScriptedEngine {
    script: Script,
    answers: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<RunRequest>>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        ScriptedEngine {
            script,
            answers: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self::new(Script::new(steps))
    }

    /// Every answer delivered to this engine, across all runs, in order
    pub fn received_answers(&self) -> Vec<String> {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every run request this engine has seen
    pub fn received_requests(&self) -> Vec<RunRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, request: RunRequest) -> Result<NativeStream, EngineError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let steps = self.script.steps.clone();
        let answers = self.answers.clone();
        let max_rounds = request.max_rounds;
        let opener = NativeEvent::new(
            "run_started",
            NativePayload::Json(Value::String(request.message)),
        );
        let opener = match request.target_agent {
            Some(agent) => opener.with_sender(agent),
            None => opener,
        };

        Ok(Box::pin(async_stream::stream! {
            yield Ok(opener);

            let mut last_answer = String::new();
            for (round, step) in steps.into_iter().enumerate() {
                if max_rounds > 0 && round >= max_rounds {
                    break;
                }

                match step {
                    Step::Say { agent, text } => yield Ok(NativeEvent::text(agent, text)),
                    Step::Ask { prompt } => {
                        let (handle, reply) = InputHandle::new(prompt);
                        yield Ok(NativeEvent::input_request(handle));

                        match reply.await {
                            Ok(InputReply::Answer(answer)) => {
                                answers
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(answer.clone());
                                last_answer = answer;
                            }
                            Ok(InputReply::Cancelled) | Err(_) => {
                                yield Err(EngineError::Aborted("input request was not answered".to_string()));
                                break;
                            }
                        }
                    }
                    Step::Echo { agent } => yield Ok(NativeEvent::text(agent, last_answer.clone())),
                    Step::ToolCall { agent, name, arguments } => {
                        let payload = json!({ "name": name, "arguments": arguments });
                        yield Ok(NativeEvent::new("tool_call", NativePayload::Json(payload)).with_sender(agent));
                    }
                    Step::Think { agent, text } => {
                        yield Ok(NativeEvent::new("thinking", NativePayload::Json(Value::String(text))).with_sender(agent));
                    }
                    Step::Raw { kind, payload } => yield Ok(NativeEvent::new(kind, NativePayload::Json(payload))),
                    Step::Bytes { kind, data } => yield Ok(NativeEvent::new(kind, NativePayload::Bytes(data))),
                    Step::Fail { category, message } => {
                        yield Err(EngineError::from_category(&category, message));
                        break;
                    }
                }
            }
        }))
    }
}

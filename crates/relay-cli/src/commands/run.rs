use anyhow::{anyhow, Context, Result};
use cliclack::{input, spinner};
use futures::StreamExt;
use relay::agent::{AgentConfig, AgentCore, EventStream};
use relay::engine::scripted::{Script, ScriptedEngine};
use relay::models::event::{Event, EventKind};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use crate::render;

pub struct RunOptions {
    pub message: String,
    pub script: Option<PathBuf>,
    pub agent: Option<String>,
    pub answers: Vec<String>,
    pub max_rounds: usize,
}

/// Where answers to input requests come from: given answers first, then the terminal
pub struct Answers {
    given: VecDeque<String>,
    interactive: bool,
}

impl Answers {
    pub fn new(given: Vec<String>, interactive: bool) -> Self {
        Answers {
            given: given.into(),
            interactive,
        }
    }

    pub async fn next(&mut self, prompt: &str) -> Result<String> {
        if let Some(answer) = self.given.pop_front() {
            println!("{} {}", console::style(prompt).bold(), answer);
            return Ok(answer);
        }
        if !self.interactive {
            return Err(anyhow!("No answer left for input request: {}", prompt));
        }

        let prompt = prompt.to_string();
        let answer: String = tokio::task::spawn_blocking(move || {
            input(prompt).placeholder("").interact()
        })
        .await
        .context("Input prompt failed")??;
        Ok(answer)
    }
}

/// Drain one conversation, answering every input request as it arrives.
/// Ctrl-C cancels the conversation, which still ends with its terminal event.
pub async fn converse(
    agent: &AgentCore,
    mut stream: EventStream,
    answers: &mut Answers,
) -> Result<Vec<Event>> {
    let mut seen = Vec::new();
    loop {
        tokio::select! {
            next = stream.next() => {
                let Some(event) = next else {
                    break;
                };
                render::event(&event)?;
                if event.kind() == EventKind::InputRequest {
                    let answer = answers.next(event.prompt()).await?;
                    agent.respond(event.id(), &answer)?;
                }
                seen.push(event);
            }
            _ = tokio::signal::ctrl_c() => {
                agent.cancel();
            }
        }
    }
    Ok(seen)
}

/// The core for a run: the given script, or the built-in planner
pub fn build_agent(options: &RunOptions) -> Result<AgentCore> {
    let script = match &options.script {
        Some(path) => Script::load(path)?,
        None => Script::demo(),
    };
    Ok(AgentCore::with_config(
        Arc::new(ScriptedEngine::new(script)),
        AgentConfig {
            max_rounds: options.max_rounds,
        },
    ))
}

pub async fn execute(options: RunOptions) -> Result<()> {
    let agent = build_agent(&options)?;

    let spin = spinner();
    spin.start("starting conversation");
    let stream = match &options.agent {
        Some(name) => agent.chat_with(name, &options.message)?,
        None => agent.chat(&options.message)?,
    };
    spin.stop("");

    let mut answers = Answers::new(options.answers, true);
    let events = converse(&agent, stream, &mut answers).await?;

    match events.last() {
        Some(event) if event.kind() == EventKind::Error => {
            Err(anyhow!("Conversation failed: {}", event.content()))
        }
        _ => Ok(()),
    }
}

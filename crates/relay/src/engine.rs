mod error;
mod native;
pub mod scripted;

pub use error::EngineError;
pub use native::{InputHandle, InputReply, NativeEvent, NativePayload};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::models::session::Turn;

/// The notifications produced by one engine run
pub type NativeStream = BoxStream<'static, Result<NativeEvent, EngineError>>;

/// Everything the engine needs to start one conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    pub message: String,
    pub context: Map<String, Value>,
    pub history: Vec<Turn>,
    /// Agent that should take the first turn, if the caller asked for one
    pub target_agent: Option<String>,
    pub max_rounds: usize,
}

/// The external orchestration engine, consumed as a black box
///
/// Each call to `run` starts an independent conversation. A run asks for human
/// input by emitting a notification that carries an `InputHandle`, and waits on
/// that handle before producing anything else.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn run(&self, request: RunRequest) -> Result<NativeStream, EngineError>;
}

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Context key counting how many conversations the session has started
pub const STEP_KEY: &str = "step";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A prior turn of conversation, handed to the engine on the next run
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    pub fn new<R: Into<String>, S: Into<String>>(role: R, content: S) -> Self {
        Turn {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Turn::new("user", content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub name: String,
}

impl FileRecord {
    pub fn from_path<S: Into<String>>(path: S) -> Self {
        let path = path.into();
        // Paths may come from clients on either platform
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        FileRecord {
            id: Uuid::new_v4().to_string(),
            path,
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// State that outlives a single conversation on one agent
pub struct Session {
    pub context: Map<String, Value>,
    pub history: Vec<Turn>,
    pub files: Vec<FileRecord>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let mut context = Map::new();
        context.insert(STEP_KEY.to_string(), json!(0));
        Session {
            context,
            history: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Advance the step counter, returning the new value
    pub fn next_step(&mut self) -> u64 {
        let step = self
            .context
            .get(STEP_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;
        self.context.insert(STEP_KEY.to_string(), json!(step));
        step
    }
}

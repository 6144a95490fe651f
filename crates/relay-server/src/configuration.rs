use crate::error::{to_env_var, ConfigError};
use anyhow::Result;
use config::{Config, Environment};
use relay::agent::AgentConfig;
use relay::engine::scripted::{Script, ScriptedEngine};
use relay::engine::Engine;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct EngineSettings {
    /// Script for the scripted engine, the built-in demo when unset
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            script: None,
            max_rounds: default_max_rounds(),
        }
    }
}

impl EngineSettings {
    pub fn build(&self) -> Result<Arc<dyn Engine>> {
        let script = match &self.script {
            Some(path) => Script::load(path)?,
            None => Script::demo(),
        };
        Ok(Arc::new(ScriptedEngine::new(script)))
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_rounds: self.max_rounds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// Seconds a request/response session may wait for `/api/respond`
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            idle_secs: default_idle_secs(),
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_secs.max(1))
    }

    /// How often idle sessions are looked for, a fraction of the timeout
    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs((self.idle_secs / 4).clamp(1, 60))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("engine.max_rounds", default_max_rounds() as u64)?
            .set_default("sessions.idle_secs", default_idle_secs())?
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Settings>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_rounds() -> usize {
    15
}

fn default_idle_secs() -> u64 {
    600
}

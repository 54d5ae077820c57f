//! In-process bots.
//!
//! Built-in bots are not started as processes: each one registers a factory under its name, and
//! the session driver builds a fresh agent per match and hands it to the engine. The registry is
//! owned by whoever runs the ladder and passed explicitly; there is no global list of loaded
//! bots.

use std::collections::HashMap;
use std::fmt::Debug;

use tracing::debug;

use crate::runtime_adapter::{Capability, ConfigError};

/// An agent living inside the orchestrator process. What it does is the engine's business.
pub trait BuiltinAgent: Send {
    /// Name shown in logs and results.
    fn display_name(&self) -> &str;
}

impl Debug for dyn BuiltinAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinAgent({})", self.display_name())
    }
}

pub type AgentFactory = Box<dyn Fn() -> Box<dyn BuiltinAgent> + Send + Sync>;

struct BuiltinEntry {
    display_name: String,
    factory: AgentFactory,
}

/// Factories of every built-in bot, by name.
#[derive(Default)]
pub struct BuiltinRegistry {
    entries: HashMap<String, BuiltinEntry>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bot providing both capabilities.
    pub fn register<F>(&mut self, name: impl Into<String>, display_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BuiltinAgent> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(builtin = name, "registered");
        self.entries.insert(
            name,
            BuiltinEntry {
                display_name: display_name.into(),
                factory: Box::new(factory),
            },
        );
    }

    /// Register a bot whose capabilities may be incomplete.
    ///
    /// A bot missing its factory or its display name is rejected with the missing capability,
    /// and nothing is registered.
    pub fn register_parts(
        &mut self,
        name: impl Into<String>,
        display_name: Option<String>,
        factory: Option<AgentFactory>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        let Some(factory) = factory else {
            return Err(ConfigError::MissingCapability {
                name,
                capability: Capability::Factory,
            });
        };
        let Some(display_name) = display_name else {
            return Err(ConfigError::MissingCapability {
                name,
                capability: Capability::DisplayName,
            });
        };
        self.entries.insert(
            name,
            BuiltinEntry {
                display_name,
                factory,
            },
        );
        Ok(())
    }

    /// Build a fresh agent for one match.
    pub fn construct(&self, name: &str) -> Result<Box<dyn BuiltinAgent>, ConfigError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::UnknownBuiltin(name.to_string()))?;
        Ok((entry.factory)())
    }

    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.display_name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

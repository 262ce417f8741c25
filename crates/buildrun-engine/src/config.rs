//! Engine configuration.

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix of every session key the engine derives, e.g. `build` in
    /// `build-42-execute`.
    pub session_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_prefix: "build".to_string(),
        }
    }
}

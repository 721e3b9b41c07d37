use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Session settings. Missing keys in a TOML file fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the tree's root folder, the first segment of every path.
    pub root_folder: String,
    /// Treat names differing only in case as colliding.
    pub case_insensitive_paths: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Whether closing a project destroys its live objects by default.
    pub destroy_on_close: bool,
    /// Type name registered with the scene persistent kind.
    pub scene_type_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_folder: "Assets".into(),
            case_insensitive_paths: false,
            event_capacity: 256,
            destroy_on_close: true,
            scene_type_name: atlas_registry::SCENE_TYPE_NAME.into(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SessionResult<String> {
        toml::to_string(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    fn validate(&self) -> SessionResult<()> {
        if self.root_folder.is_empty() || self.root_folder.contains(['/', '\\']) {
            return Err(SessionError::Config(format!(
                "root_folder must be a single path segment, got {:?}",
                self.root_folder
            )));
        }
        if self.event_capacity == 0 {
            return Err(SessionError::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = SessionConfig::default();
        assert_eq!(c.root_folder, "Assets");
        assert!(!c.case_insensitive_paths);
        assert!(c.destroy_on_close);
        assert_eq!(c.scene_type_name, "Scene");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = SessionConfig::from_toml_str("case_insensitive_paths = true\nevent_capacity = 8\n").unwrap();
        assert!(c.case_insensitive_paths);
        assert_eq!(c.event_capacity, 8);
        assert_eq!(c.root_folder, "Assets");
    }

    #[test]
    fn toml_round_trip() {
        let c = SessionConfig {
            root_folder: "Content".into(),
            ..SessionConfig::default()
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_toml_str("root_folder = \"a/b\""),
            Err(SessionError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("event_capacity = 0"),
            Err(SessionError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("event_capacity = \"lots\""),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            SessionConfig::load("/nonexistent/atlas.toml"),
            Err(SessionError::Config(_))
        ));
    }
}

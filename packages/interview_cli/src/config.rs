use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    origin = "https://interview.example.org"
//
//   env var:         INTERVIEW_SERVER__ORIGIN=https://...   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Where the chat server lives (`[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerFileConfig {
    /// Origin the web front end would be served from. `http` connects the
    /// socket over `ws`, `https` over `wss`.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Terminal chat behaviour (`[chat]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatFileConfig {
    /// Print the debrief payload as raw JSON instead of a formatted report.
    #[serde(default)]
    pub raw_debrief: bool,
    /// Seconds to wait for `Established` before giving up.
    #[serde(default = "default_establish_timeout_secs")]
    pub establish_timeout_secs: u64,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            raw_debrief: false,
            establish_timeout_secs: default_establish_timeout_secs(),
        }
    }
}

fn default_origin() -> String {
    "http://127.0.0.1:8889".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_establish_timeout_secs() -> u64 {
    60
}

impl ServerFileConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ChatFileConfig {
    pub fn establish_timeout(&self) -> Duration {
        Duration::from_secs(self.establish_timeout_secs)
    }
}

/// Build a figment that layers: defaults → config.toml → INTERVIEW_* env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("INTERVIEW_").split("__"))
}

// =============================================================================
// Directory layout (derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct InterviewConfig {
    pub data_dir: PathBuf,
    pub file: FileConfig,
}

impl InterviewConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".interview"),
        };

        let state_dir = data_dir.join("state");
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create state directory: {:?}", state_dir))?;

        let file: FileConfig = load_config(&data_dir)
            .extract()
            .context("Failed to load configuration")?;

        info!("Data directory: {}", data_dir.display());
        debug!(origin = %file.server.origin, "Loaded configuration");

        Ok(Self { data_dir, file })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Durable slot holding `{sessionId, userId}` of the active session.
    pub fn session_slot_path(&self) -> PathBuf {
        self.state_dir().join("active_session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let d = FileConfig::default();
        assert_eq!(d.server.origin, "http://127.0.0.1:8889");
        assert_eq!(d.server.request_timeout(), Duration::from_secs(30));
        assert!(!d.chat.raw_debrief);
        assert_eq!(d.chat.establish_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_toml_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\norigin = \"https://interview.example.org\"\n\n[chat]\nraw_debrief = true\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.origin, "https://interview.example.org");
        assert_eq!(fc.server.request_timeout_secs, 30);
        assert!(fc.chat.raw_debrief);
    }

    #[test]
    fn test_partial_section_keeps_field_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[chat]\nestablish_timeout_secs = 5\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.chat.establish_timeout_secs, 5);
        assert!(!fc.chat.raw_debrief);
        assert_eq!(fc.server, ServerFileConfig::default());
    }

    #[test]
    fn test_missing_config_toml_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc, FileConfig::default());
    }

    #[test]
    fn test_interview_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = InterviewConfig::new(Some(tmp.path().to_path_buf())).unwrap();

        assert_eq!(config.data_dir, tmp.path());
        assert!(tmp.path().join("state").exists());
        assert_eq!(
            config.session_slot_path(),
            tmp.path().join("state/active_session.json")
        );
    }
}

//! Configuration loading and root folder resolution
//!
//! The root folder holds everything the service needs at runtime:
//! the `images/` directory, `poems.toml`, and the SQLite database.

use crate::{Error, Result};
use std::path::PathBuf;

/// Study policy values loaded from the settings table at startup.
#[derive(Debug, Clone)]
pub struct StudySettings {
    /// Default evaluation quota per participant (overridable per user)
    pub max_evaluations_per_user: i64,
    /// Minutes before an unconfirmed assignment is reclaimed
    pub assignment_timeout_minutes: i64,
    /// Period of the background reclaim task
    pub reclaim_interval_seconds: u64,
    /// Distractor titles per phase-1 round
    pub distractor_count: usize,
    /// Number of phase-2 answers required for a submission
    pub phase2_question_count: usize,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            max_evaluations_per_user: 10,
            assignment_timeout_minutes: 10,
            reclaim_interval_seconds: 60,
            distractor_count: 3,
            phase2_question_count: 12,
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Get default configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/verseval/config.toml first, then /etc/verseval/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("verseval").join("config.toml"));
        let system_config = PathBuf::from("/etc/verseval/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let config_path = dirs::config_dir()
        .map(|d| d.join("verseval").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_path
        )))
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("verseval"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\verseval"))
    } else {
        // ~/.local/share/verseval on Linux, ~/Library/Application Support on macOS
        dirs::data_local_dir()
            .map(|d| d.join("verseval"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/verseval"))
    }
}

/// Load study settings from the settings table.
///
/// Falls back to the compiled default for any setting that is missing or
/// unparseable (the init path should have created them all).
pub async fn load_study_settings(db: &sqlx::SqlitePool) -> Result<StudySettings> {
    let defaults = StudySettings::default();

    Ok(StudySettings {
        max_evaluations_per_user: crate::db::settings::get_setting_i64(db, "max_evaluations_per_user")
            .await?
            .unwrap_or(defaults.max_evaluations_per_user),
        assignment_timeout_minutes: crate::db::settings::get_setting_i64(db, "assignment_timeout_minutes")
            .await?
            .unwrap_or(defaults.assignment_timeout_minutes),
        reclaim_interval_seconds: crate::db::settings::get_setting_i64(db, "reclaim_interval_seconds")
            .await?
            .map(|v| v.max(1) as u64)
            .unwrap_or(defaults.reclaim_interval_seconds),
        distractor_count: crate::db::settings::get_setting_i64(db, "distractor_count")
            .await?
            .map(|v| v.max(0) as usize)
            .unwrap_or(defaults.distractor_count),
        phase2_question_count: crate::db::settings::get_setting_i64(db, "phase2_question_count")
            .await?
            .map(|v| v.max(0) as usize)
            .unwrap_or(defaults.phase2_question_count),
    })
}

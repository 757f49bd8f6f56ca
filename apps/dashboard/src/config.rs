use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

const DEFAULT_CONFIG_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub session_file: PathBuf,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".into(),
            session_file: default_session_file(),
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `dashboard.toml` (or `config_path`), then environment.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    load_settings_with(config_path, |key| std::env::var(key).ok())
}

fn load_settings_with(
    config_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, lookup);

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("api_base_url") {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("session_file") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("RENTDESK_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("RENTDESK_SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = lookup("APP__SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }

    if let Some(v) = lookup("RENTDESK_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

pub fn default_session_file() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("rentdesk").join("session.json"))
        .unwrap_or_else(|| PathBuf::from("rentdesk-session.json"))
}

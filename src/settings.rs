use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::matcher::MatcherConfig;
use crate::reconcile::SecondarySource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// dotenv-style file holding the store credentials.
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fiscal year -> workbook path, used when `--file` is omitted.
    #[serde(default)]
    pub workbooks: BTreeMap<String, String>,
    #[serde(default)]
    pub reconcile: SecondarySource,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

fn default_secrets_file() -> String {
    ".env.local".to_string()
}

fn default_batch_size() -> usize {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secrets_file: default_secrets_file(),
            batch_size: default_batch_size(),
            workbooks: BTreeMap::new(),
            reconcile: SecondarySource::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl Settings {
    pub fn workbook_for_year(&self, year: i32) -> Option<PathBuf> {
        self.workbooks
            .get(&year.to_string())
            .map(|p| PathBuf::from(shellexpand_path(p)))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("burc-sync")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    if path.exists() {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}: {e}; using defaults", path.display());
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Credentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

const URL_KEYS: &[&str] = &["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const KEY_KEYS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_KEY"];

/// Read store credentials from a dotenv-format secrets file without touching
/// the process environment.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        SyncError::MissingCredentials(format!("cannot read secrets file {}: {e}", path.display()))
    })?;

    let mut values: BTreeMap<String, String> = BTreeMap::new();
    for item in iter {
        match item {
            Ok((k, v)) => {
                values.insert(k, v);
            }
            Err(e) => log::warn!("{}: skipping unparseable line: {e}", path.display()),
        }
    }

    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| values.get(*k).filter(|v| !v.trim().is_empty()).cloned())
    };
    let url = pick(URL_KEYS).ok_or_else(|| {
        SyncError::MissingCredentials(format!("{} not set in {}", URL_KEYS[0], path.display()))
    })?;
    let service_key = pick(KEY_KEYS).ok_or_else(|| {
        SyncError::MissingCredentials(format!("{} not set in {}", KEY_KEYS[0], path.display()))
    })?;
    Ok(Credentials { url, service_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from(&dir.path().join("settings.json"));
        assert_eq!(s.secrets_file, ".env.local");
        assert_eq!(s.batch_size, 100);
        assert!(s.workbooks.is_empty());
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"batch_size": 25, "workbooks": {"2025": "/data/2025 APAC Performance.xlsx"}}"#,
        )
        .unwrap();
        let s = load_settings_from(&path);
        assert_eq!(s.batch_size, 25);
        assert_eq!(s.secrets_file, ".env.local");
        assert_eq!(
            s.workbook_for_year(2025),
            Some(PathBuf::from("/data/2025 APAC Performance.xlsx"))
        );
        assert_eq!(s.workbook_for_year(2024), None);
        assert_eq!(s.reconcile.table, "sales_pipeline_opportunities");
    }

    #[test]
    fn test_corrupt_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings_from(&path).batch_size, 100);
    }

    #[test]
    fn test_load_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(
            &path,
            "# local secrets\nNEXT_PUBLIC_SUPABASE_URL=https://abc.supabase.co\nSUPABASE_SERVICE_ROLE_KEY=\"sekret\"\n",
        )
        .unwrap();
        let creds = load_credentials(&path).unwrap();
        assert_eq!(creds.url, "https://abc.supabase.co");
        assert_eq!(creds.service_key, "sekret");
        assert!(!format!("{creds:?}").contains("sekret"));
    }

    #[test]
    fn test_missing_credentials_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_credentials(&dir.path().join("nope.env")).unwrap_err();
        assert!(matches!(missing, SyncError::MissingCredentials(_)));

        let path = dir.path().join(".env.local");
        std::fs::write(&path, "SUPABASE_URL=https://abc.supabase.co\nSUPABASE_SERVICE_ROLE_KEY=\n").unwrap();
        let err = load_credentials(&path).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));
    }
}

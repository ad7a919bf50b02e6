use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::snapshot::DEFAULT_RETENTION_DAYS;
use crate::toggl::{Credentials, DEFAULT_API_URL};

/// 現在時刻の前後何日分のエントリーを取得するか。
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// 設定ファイルの内容。
///
/// `TOGGL_API_TOKEN`、`TOGGL_WORKSPACE_ID`が設定されている場合はファイルの値より優先する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_token: Option<String>,
    pub workspace_id: Option<i64>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_window_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            workspace_id: None,
            api_url: default_api_url(),
            retention_days: default_retention_days(),
            window_days: default_window_days(),
        }
    }
}

impl Settings {
    /// 設定ファイルのデフォルトの場所。
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Cannot determine config directory")?
            .join("tooggls")
            .join("config.toml"))
    }

    /// 設定ファイルを読み込み、環境変数で上書きする。
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Self::load_file(path)?;
        settings.with_env_overrides(
            env::var("TOGGL_API_TOKEN").ok(),
            env::var("TOGGL_WORKSPACE_ID").ok(),
        )
    }

    /// 設定ファイルを読み込む。ファイルがない場合はデフォルト値を返す。
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let settings: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(settings)
    }

    fn with_env_overrides(mut self, token: Option<String>, workspace_id: Option<String>) -> Result<Self> {
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(workspace_id) = workspace_id {
            let id = workspace_id
                .parse()
                .with_context(|| format!("TOGGL_WORKSPACE_ID is not a number: {}", workspace_id))?;
            self.workspace_id = Some(id);
        }
        Ok(self)
    }

    /// 設定ファイルを書き込む。APIトークンを含むため所有者のみ読み書きできるようにする。
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        secure_write(path, &raw).with_context(|| format!("Failed to write config at {}", path.display()))
    }

    /// ログイン済みの場合に認証情報を返す。
    pub fn credentials(&self) -> Result<Credentials> {
        let token = self
            .api_token
            .clone()
            .context("Not logged in. Run `tooggls login` or set TOGGL_API_TOKEN")?;
        Ok(Credentials::ApiToken(token))
    }

    pub fn workspace(&self) -> Result<i64> {
        self.workspace_id
            .context("No workspace selected. Run `tooggls login` or set TOGGL_WORKSPACE_ID")
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_token.is_some()
    }
}

#[cfg(unix)]
fn secure_write(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(content.as_bytes())
}

#[cfg(not(unix))]
fn secure_write(path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(path, content)
}

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 1件のタイムエントリー。
///
/// `id`が`None`の場合はまだToggl側に作成されていないエントリーを表す。
/// `stop`が`None`の場合は計測中のエントリーを表す。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Option<i64>,
    pub workspace_id: i64,
    pub description: String,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
    pub project_id: Option<i64>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 最終更新日時。ローカルで作成しただけのエントリーには存在しない。
    pub at: Option<DateTime<Utc>>,
}

impl TimeEntry {
    /// ローカルで新しく作成する計測中のエントリーを返す。
    pub fn new_running(workspace_id: i64, description: &str, start: DateTime<Utc>) -> Self {
        Self {
            id: None,
            workspace_id,
            description: description.to_string(),
            start,
            stop: None,
            project_id: None,
            tags: BTreeSet::new(),
            at: None,
        }
    }

    /// 計測中かどうか。
    pub fn is_running(&self) -> bool {
        self.stop.is_none()
    }

    /// エントリーの長さを返す。
    ///
    /// 計測中の場合は`now`までの長さとする。
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.stop.unwrap_or(now) - self.start
    }
}

/// Togglのプロジェクト。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// `#rrggbb`形式の色。
    pub color: String,
}

/// `/me`で取得するユーザー情報。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub fullname: Option<String>,
    pub default_workspace_id: i64,
    pub api_token: Option<String>,
}

/// レスポンスヘッダーから得られるAPIクォータ。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiQuota {
    pub remaining: u32,
    pub resets_in_secs: u32,
}

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datetime::retention_cutoff;
use crate::model::Model;
use crate::time_entry::{Project, TimeEntry};

/// スナップショットに残すエントリーの日数。
pub const DEFAULT_RETENTION_DAYS: i64 = 14;

/// スナップショットの読み書きで発生するエラー。
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Snapshot JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// 実行の間にローカルへ保存するモデルの一部。
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tags: BTreeSet<String>,
    pub projects: Vec<Project>,
    pub entries: Vec<TimeEntry>,
}

impl Snapshot {
    /// モデルからスナップショットを作成する。
    ///
    /// `retention_days`日より前に開始したエントリーは含めない。
    pub fn capture(model: &Model, now: DateTime<Utc>, retention_days: i64) -> Self {
        let cutoff = retention_cutoff(now, retention_days);
        Self {
            tags: model.tags().clone(),
            projects: model.projects().into_iter().cloned().collect(),
            entries: model
                .entries()
                .filter(|entry| entry.start > cutoff)
                .cloned()
                .collect(),
        }
    }

    /// モデルの空のコレクションだけをスナップショットの内容で埋める。
    ///
    /// エントリー、プロジェクト、タグはそれぞれ独立して判定する。
    pub fn seed(self, model: &mut Model) {
        if !model.has_entries() {
            model.merge_entries(self.entries);
        }
        if !model.has_projects() {
            model.replace_projects(self.projects);
        }
        if model.tags().is_empty() {
            model.replace_tags(self.tags);
        }
    }

    /// スナップショットをファイルに書き込む。既存のファイルは置き換える。
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_error = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_error)?;
        std::fs::rename(&tmp, path).map_err(io_error)?;
        Ok(())
    }

    /// ファイルからスナップショットを読み込む。
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// スナップショットのデフォルトの保存先。
pub fn default_path() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .context("Cannot determine data directory")?
        .join("tooggls")
        .join("snapshot.json"))
}

/// モデルを保存する。失敗してもログに残すだけで処理は続ける。
pub fn persist_quietly(model: &Model, path: &Path, now: DateTime<Utc>, retention_days: i64) {
    let snapshot = Snapshot::capture(model, now, retention_days);
    match snapshot.save(path) {
        Ok(()) => info!(
            "Saved snapshot with {} entries to {}",
            snapshot.entries.len(),
            path.display()
        ),
        Err(e) => warn!("Failed to save snapshot: {}", e),
    }
}

/// 保存済みのスナップショットでモデルを埋める。
///
/// ファイルがない場合や読み込みに失敗した場合はモデルをそのままにする。
pub fn restore_quietly(model: &mut Model, path: &Path) {
    if !path.exists() {
        return;
    }
    match Snapshot::load(path) {
        Ok(snapshot) => {
            info!("Restored snapshot with {} entries", snapshot.entries.len());
            snapshot.seed(model);
        }
        Err(e) => warn!("Ignoring unreadable snapshot: {}", e),
    }
}

/// 保存済みのスナップショットを削除する。
pub fn remove(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove snapshot at {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, TimeZone, Utc};

    use super::{persist_quietly, restore_quietly, Snapshot, SnapshotError};
    use crate::model::tests::dummy_entry;
    use crate::model::Model;
    use crate::time_entry::Project;

    fn project(id: i64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            color: "#06aaf5".to_string(),
        }
    }

    #[test]
    fn test_round_trip_keeps_only_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut model = Model::new();
        let mut old = dummy_entry(1, 8, false);
        old.start -= Duration::days(30);
        model.merge_entries(vec![old, dummy_entry(2, 9, false), dummy_entry(3, 10, true)]);
        model.replace_projects(vec![project(5, "Docs")]);
        model.replace_tags(BTreeSet::from(["billable".to_string()]));
        let now = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();

        persist_quietly(&model, &path, now, 14);
        let mut restored = Model::new();
        restore_quietly(&mut restored, &path);

        let ids: Vec<_> = restored.entries().map(|entry| entry.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(restored.entry(2), model.entry(2));
        assert_eq!(restored.project(5).unwrap().name, "Docs");
        assert!(restored.tags().contains("billable"));
    }

    #[test]
    fn test_seed_never_overwrites_non_empty_collections() {
        let snapshot = Snapshot {
            tags: BTreeSet::from(["saved".to_string()]),
            projects: vec![project(1, "Saved")],
            entries: vec![dummy_entry(1, 8, false)],
        };
        let mut model = Model::new();
        model.upsert_entry(dummy_entry(2, 9, false));
        model.replace_tags(BTreeSet::from(["live".to_string()]));

        snapshot.seed(&mut model);

        // エントリーとタグは既にあるので上書きされず、プロジェクトだけ埋まる
        assert!(model.entry(1).is_none());
        assert!(model.entry(2).is_some());
        assert_eq!(model.tags().iter().collect::<Vec<_>>(), vec!["live"]);
        assert_eq!(model.project(1).unwrap().name, "Saved");
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let first = Snapshot {
            entries: vec![dummy_entry(1, 8, false)],
            ..Snapshot::default()
        };
        first.save(&path).unwrap();

        Snapshot::default().save(&path).unwrap();

        assert_eq!(Snapshot::load(&path).unwrap(), Snapshot::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{\"tags\": 3}").unwrap();

        assert!(matches!(Snapshot::load(&path), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn test_restore_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "not json").unwrap();
        let mut model = Model::new();

        restore_quietly(&mut model, &missing);
        restore_quietly(&mut model, &broken);

        assert!(!model.has_entries());
    }
}

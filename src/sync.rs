use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::datetime::{local_date, window_around};
use crate::error::TogglError;
use crate::model::Model;
use crate::time_entry::TimeEntry;
use crate::toggl::{DateFilter, TogglRepository};

/// エントリー、プロジェクト、タグを同時に取得してモデルに反映する。
///
/// 3つのリクエストがすべて終わるのを待ってから、成功したものをエントリー、プロジェクト、
/// タグの順に反映する。失敗があった場合は最初のエラーを返すが、反映済みの結果は残す。
///
/// # Arguments
///
/// * `repo` - Toggl APIと通信するためのリポジトリ
/// * `model` - 結果を書き込むモデル
/// * `workspace_id` - プロジェクトとタグを取得するワークスペース
/// * `now` - 取得範囲の中心
/// * `window_days` - `now`の前後何日分を取得するか
pub async fn refresh_all<T: TogglRepository + ?Sized>(
    repo: &T,
    model: &mut Model,
    workspace_id: i64,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<(), TogglError> {
    let (start, end) = window_around(now, window_days);
    let filter = DateFilter::Range {
        start_date: local_date(start),
        end_date: local_date(end),
    };
    info!("Refreshing entries from {} to {}", start, end);

    let (entries, projects, tags) = tokio::join!(
        repo.read_time_entries(filter),
        repo.read_projects(workspace_id),
        repo.read_tags(workspace_id),
    );
    model.set_quota(repo.last_quota());

    let mut first_error = None;
    match entries {
        Ok(entries) => model.merge_entries(entries),
        Err(e) => record(&mut first_error, "time entries", e),
    }
    match projects {
        Ok(projects) => model.replace_projects(projects),
        Err(e) => record(&mut first_error, "projects", e),
    }
    match tags {
        Ok(tags) => model.replace_tags(tags),
        Err(e) => record(&mut first_error, "tags", e),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// 読み込み済みの最も古いエントリーより前の`window_days`日分を取得してマージする。
///
/// 取得したエントリー数を返す。
pub async fn load_older<T: TogglRepository + ?Sized>(
    repo: &T,
    model: &mut Model,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<usize, TogglError> {
    let before = model.oldest_start().unwrap_or(now);
    let since = before - Duration::days(window_days);
    // `before`の日付は含まれないため翌日を指定し、重複はマージで取り除く
    let filter = DateFilter::Since {
        since,
        before: local_date(before) + Duration::days(1),
    };
    info!("Loading entries older than {}", before);

    let page = repo.read_time_entries(filter).await?;
    model.set_quota(repo.last_quota());
    let count = page.len();
    model.merge_entries(page);

    Ok(count)
}

/// 計測中のエントリーを取得してモデルに反映し、取得したエントリーを返す。
///
/// Toggl側で計測中でなくなったローカルのエントリーはモデルから取り除く。
pub async fn refresh_current<T: TogglRepository + ?Sized>(
    repo: &T,
    model: &mut Model,
) -> Result<Option<TimeEntry>, TogglError> {
    let current = repo.read_current_time_entry().await?;
    model.set_quota(repo.last_quota());

    let current_id = current.as_ref().and_then(|entry| entry.id);
    let dropped = model.drop_stale_running(current_id);
    if dropped > 0 {
        info!("Dropped {} running entries stopped elsewhere", dropped);
    }
    if let Some(entry) = &current {
        model.upsert_entry(entry.clone());
    }
    Ok(current)
}

fn record(slot: &mut Option<TogglError>, what: &str, error: TogglError) {
    warn!("Failed to refresh {}: {}", what, error);
    if slot.is_none() {
        *slot = Some(error);
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};

use crate::datetime::local_date;
use crate::time_entry::{ApiQuota, Project, TimeEntry};

/// プロジェクト、タグ、タイムエントリーを保持するインメモリのモデル。
///
/// 変更は常に単一スレッドから行う。通信結果はこのモデルに書き戻す前に
/// 呼び出し側で待ち合わせる。
#[derive(Debug, Default)]
pub struct Model {
    entries: HashMap<i64, TimeEntry>,
    /// 開始日時の降順に並べたエントリーのid。
    display: Vec<i64>,
    projects: HashMap<i64, Project>,
    tags: BTreeSet<String>,
    editing: Option<TimeEntry>,
    quota: Option<ApiQuota>,
}

impl Model {
    /// 空の`Model`を返す。
    pub fn new() -> Self {
        Self::default()
    }

    /// idをキーにエントリーを追加または置き換える。
    ///
    /// idのないエントリーは保持できないため`false`を返す。
    pub fn upsert_entry(&mut self, entry: TimeEntry) -> bool {
        let Some(id) = entry.id else {
            warn!("Ignoring time entry without id: {:?}", entry.description);
            return false;
        };
        self.reconcile_editing(&entry);
        self.entries.insert(id, entry);
        self.rebuild_display();
        true
    }

    /// 取得したエントリーをまとめてマージする。
    pub fn merge_entries(&mut self, page: Vec<TimeEntry>) {
        let total = page.len();
        for entry in page {
            let Some(id) = entry.id else {
                continue;
            };
            self.reconcile_editing(&entry);
            self.entries.insert(id, entry);
        }
        self.rebuild_display();
        debug!("Merged {} entries, {} in model", total, self.entries.len());
    }

    /// idを指定してエントリーを削除する。編集中であれば編集も終了する。
    pub fn delete_entry(&mut self, id: i64) -> Option<TimeEntry> {
        let removed = self.entries.remove(&id)?;
        self.display.retain(|other| *other != id);
        if self.editing.as_ref().and_then(|entry| entry.id) == Some(id) {
            self.editing = None;
        }
        Some(removed)
    }

    /// プロジェクト一覧を丸ごと置き換える。
    pub fn replace_projects(&mut self, projects: Vec<Project>) {
        self.projects = projects
            .into_iter()
            .map(|project| (project.id, project))
            .collect();
    }

    /// タグ一覧を丸ごと置き換える。
    pub fn replace_tags(&mut self, tags: BTreeSet<String>) {
        self.tags = tags;
    }

    pub fn set_quota(&mut self, quota: Option<ApiQuota>) {
        if quota.is_some() {
            self.quota = quota;
        }
    }

    pub fn quota(&self) -> Option<ApiQuota> {
        self.quota
    }

    /// 開始日時の降順でエントリーを返す。
    pub fn entries(&self) -> impl Iterator<Item = &TimeEntry> {
        self.display.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn entry(&self, id: i64) -> Option<&TimeEntry> {
        self.entries.get(&id)
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    /// 計測中のエントリー。複数ある場合は最も新しく開始したもの。
    pub fn running_entry(&self) -> Option<&TimeEntry> {
        self.entries().find(|entry| entry.is_running())
    }

    /// `current_id`以外の計測中のエントリーを取り除き、取り除いた数を返す。
    ///
    /// Toggl側で既に停止されたエントリーは停止日時が分からないため、次の取得まで保持しない。
    pub fn drop_stale_running(&mut self, current_id: Option<i64>) -> usize {
        let stale: Vec<i64> = self
            .entries
            .iter()
            .filter(|(id, entry)| entry.is_running() && Some(**id) != current_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.delete_entry(*id);
        }
        stale.len()
    }

    /// 最後に停止したエントリーの停止日時。
    pub fn last_stop(&self) -> Option<DateTime<Utc>> {
        self.entries.values().filter_map(|entry| entry.stop).max()
    }

    /// 最も古いエントリーの開始日時。ページングの起点に利用する。
    pub fn oldest_start(&self) -> Option<DateTime<Utc>> {
        self.display
            .last()
            .and_then(|id| self.entries.get(id))
            .map(|entry| entry.start)
    }

    /// 取得済みのタグと、読み込んだエントリーに付いているタグの和集合。
    pub fn tag_vocabulary(&self) -> BTreeSet<String> {
        let mut vocabulary = self.tags.clone();
        for entry in self.entries.values() {
            vocabulary.extend(entry.tags.iter().cloned());
        }
        vocabulary
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Localの日付ごとにエントリーをまとめる。新しい日付から順に返す。
    pub fn entries_by_day(&self) -> Vec<(NaiveDate, Vec<&TimeEntry>)> {
        let mut days: BTreeMap<NaiveDate, Vec<&TimeEntry>> = BTreeMap::new();
        for entry in self.entries() {
            days.entry(local_date(entry.start)).or_default().push(entry);
        }
        days.into_iter().rev().collect()
    }

    pub fn project(&self, id: i64) -> Option<&Project> {
        self.projects.get(&id)
    }

    /// プロジェクトを名前で探す。名前に一致しなければidとして解釈する。
    pub fn find_project(&self, name_or_id: &str) -> Option<&Project> {
        self.projects
            .values()
            .find(|project| project.name.eq_ignore_ascii_case(name_or_id))
            .or_else(|| {
                name_or_id
                    .parse::<i64>()
                    .ok()
                    .and_then(|id| self.projects.get(&id))
            })
    }

    /// 名前順のプロジェクト一覧。
    pub fn projects(&self) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self.projects.values().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    pub fn has_projects(&self) -> bool {
        !self.projects.is_empty()
    }

    /// 既存のエントリーの編集を開始する。
    pub fn begin_edit(&mut self, id: i64) -> Option<&mut TimeEntry> {
        let entry = self.entries.get(&id)?.clone();
        self.editing = Some(entry);
        self.editing.as_mut()
    }

    /// 新しいエントリーの編集を開始する。
    pub fn begin_new(&mut self, entry: TimeEntry) -> &mut TimeEntry {
        self.editing.insert(entry)
    }

    #[cfg(test)]
    pub fn editing(&self) -> Option<&TimeEntry> {
        self.editing.as_ref()
    }

    pub fn editing_mut(&mut self) -> Option<&mut TimeEntry> {
        self.editing.as_mut()
    }

    /// 編集を終了し、編集中だったエントリーを返す。
    pub fn finish_edit(&mut self) -> Option<TimeEntry> {
        self.editing.take()
    }

    /// 編集中のエントリーと同じidのエントリーが届いた場合、更新日時が新しい時だけ上書きする。
    ///
    /// どちらかの更新日時がない場合は上書きしない。
    fn reconcile_editing(&mut self, incoming: &TimeEntry) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        if editing.id.is_none() || editing.id != incoming.id {
            return;
        }
        match (editing.at, incoming.at) {
            (Some(current), Some(next)) if next > current => {
                debug!("Editing entry {:?} replaced by newer version", incoming.id);
                *editing = incoming.clone();
            }
            _ => {}
        }
    }

    fn rebuild_display(&mut self) {
        let mut ids: Vec<i64> = self.entries.keys().copied().collect();
        ids.sort_by(|a, b| {
            let start_a = self.entries[a].start;
            let start_b = self.entries[b].start;
            start_b.cmp(&start_a).then(b.cmp(a))
        });
        self.display = ids;
    }
}

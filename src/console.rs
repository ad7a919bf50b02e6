use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, Utc};

use crate::duration::{format_clock, format_duration};
use crate::model::Model;
use crate::time_entry::{ApiQuota, Project, TimeEntry};

/// 日毎の合計時間に表示する単位の数。
const DAY_TOTAL_UNITS: usize = 2;

/// Consoleにモデルの内容を表示するためのtrait。
pub trait ConsolePresenter {
    /// タイムエントリーを日付ごとにまとめて表示する。
    ///
    /// # Arguments
    ///
    /// * `model` - 表示するエントリーを持つモデル
    /// * `now` - 計測中のエントリーの長さを求めるための現在時刻
    fn show_days(&mut self, model: &Model, now: DateTime<Utc>) -> Result<()>;

    /// 1件のタイムエントリーを表示する。
    fn show_entry(&mut self, model: &Model, entry: &TimeEntry, now: DateTime<Utc>) -> Result<()>;

    /// プロジェクト一覧を表示する。
    fn show_projects(&mut self, projects: &[&Project]) -> Result<()>;

    /// タグ一覧を表示する。
    fn show_tags(&mut self, tags: &[String]) -> Result<()>;

    /// APIクォータを表示する。
    fn show_quota(&mut self, quota: &ApiQuota) -> Result<()>;
}

/// Markdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn entry_line(model: &Model, entry: &TimeEntry, now: DateTime<Utc>) -> String {
        let start_str = entry.start.with_timezone(&Local).format("%H:%M").to_string();
        let (end_str, length) = match entry.stop {
            Some(stop) => (
                stop.with_timezone(&Local).format("%H:%M").to_string(),
                format_duration(entry.duration(now), DAY_TOTAL_UNITS),
            ),
            None => ("now".to_string(), format_clock(entry.duration(now))),
        };
        let id = entry
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut line = format!(
            "- {} ~ {} ({}): {} [{}]",
            start_str, end_str, length, entry.description, id
        );
        if let Some(project) = entry.project_id.and_then(|id| model.project(id)) {
            line.push_str(&format!(" @{}", project.name));
        }
        if !entry.tags.is_empty() {
            let tags: Vec<String> = entry.tags.iter().map(|tag| format!("#{}", tag)).collect();
            line.push(' ');
            line.push_str(&tags.join(" "));
        }
        line
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_days(&mut self, model: &Model, now: DateTime<Utc>) -> Result<()> {
        for (date, entries) in model.entries_by_day() {
            let total = entries
                .iter()
                .fold(Duration::zero(), |acc, entry| acc + entry.duration(now));
            writeln!(
                self.writer,
                "## {} ({})",
                date,
                format_duration(total, DAY_TOTAL_UNITS)
            )
            .with_context(|| format!("Failed to write day header: {}", date))?;

            for entry in entries {
                writeln!(self.writer, "{}", Self::entry_line(model, entry, now))
                    .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
            }
        }

        Ok(())
    }

    fn show_entry(&mut self, model: &Model, entry: &TimeEntry, now: DateTime<Utc>) -> Result<()> {
        writeln!(self.writer, "{}", Self::entry_line(model, entry, now))
            .with_context(|| format!("Failed to write time entry: {:?}", entry))
    }

    fn show_projects(&mut self, projects: &[&Project]) -> Result<()> {
        for project in projects {
            writeln!(self.writer, "- {} ({}) {}", project.name, project.id, project.color)
                .with_context(|| format!("Failed to write project: {}", project.name))?;
        }
        Ok(())
    }

    fn show_tags(&mut self, tags: &[String]) -> Result<()> {
        for tag in tags {
            writeln!(self.writer, "- {}", tag).with_context(|| format!("Failed to write tag: {}", tag))?;
        }
        Ok(())
    }

    fn show_quota(&mut self, quota: &ApiQuota) -> Result<()> {
        writeln!(
            self.writer,
            "API quota: {} requests left, resets in {}s",
            quota.remaining, quota.resets_in_secs
        )
        .context("Failed to write quota")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone, Utc};

    use super::{ConsoleMarkdownList, ConsolePresenter};
    use crate::model::tests::dummy_entry;
    use crate::model::Model;
    use crate::time_entry::{Project, TimeEntry};

    fn hhmm(entry_time: chrono::DateTime<Utc>) -> String {
        entry_time.with_timezone(&Local).format("%H:%M").to_string()
    }

    fn render(model: &Model) -> String {
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();

        presenter.show_days(model, now).unwrap();

        String::from_utf8(writer).unwrap()
    }

    #[test]
    fn test_show_days_empty() {
        assert_eq!(render(&Model::new()), "");
    }

    #[test]
    fn test_show_days_single_entry() {
        let mut model = Model::new();
        let entry = dummy_entry(1, 8, false);
        model.upsert_entry(entry.clone());

        let date = entry.start.with_timezone(&Local).date_naive();
        let expected = format!(
            "## {} (30m)\n- {} ~ {} (30m): entry1 [1]\n",
            date,
            hhmm(entry.start),
            hhmm(entry.stop.unwrap())
        );
        assert_eq!(render(&model), expected);
    }

    #[test]
    fn test_show_days_running_entry_uses_clock() {
        let mut model = Model::new();
        let entry = dummy_entry(2, 11, true);
        model.upsert_entry(entry.clone());

        let output = render(&model);

        assert!(output.contains(&format!("- {} ~ now (1:00:00): entry2 [2]", hhmm(entry.start))));
    }

    #[test]
    fn test_show_days_newest_first_with_project_and_tags() {
        let mut model = Model::new();
        model.replace_projects(vec![Project {
            id: 3,
            name: "Docs".to_string(),
            color: "#06aaf5".to_string(),
        }]);
        let mut tagged = dummy_entry(2, 8, false);
        tagged.project_id = Some(3);
        tagged.tags.insert("review".to_string());
        model.merge_entries(vec![dummy_entry(1, 8, false), tagged]);

        let output = render(&model);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("(1h)"));
        assert!(lines[1].ends_with("entry2 [2] @Docs #review"));
        assert!(lines[2].ends_with("entry1 [1]"));
    }

    #[test]
    fn test_show_entry_without_id() {
        let model = Model::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 11, 0, 0).unwrap();
        let entry = TimeEntry::new_running(7, "draft", start);
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        presenter
            .show_entry(&model, &entry, start + Duration::seconds(5))
            .unwrap();

        let output = String::from_utf8(writer).unwrap();
        assert!(output.ends_with("~ now (0:00:05): draft [-]\n"));
    }

    #[test]
    fn test_show_projects_and_tags() {
        let project = Project {
            id: 3,
            name: "Docs".to_string(),
            color: "#06aaf5".to_string(),
        };
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        presenter.show_projects(&[&project]).unwrap();
        presenter.show_tags(&["a".to_string(), "b".to_string()]).unwrap();

        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "- Docs (3) #06aaf5\n- a\n- b\n"
        );
    }
}

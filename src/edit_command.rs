use anyhow::{bail, Context, Result};
use log::info;

use crate::datetime::parse_local_time;
use crate::model::Model;
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// タイムエントリーを編集するためのサブコマンド。
#[derive(Debug, Default, clap::Args)]
pub struct EditArgs {
    #[clap(help = "Id of the time entry to edit")]
    id: i64,

    #[clap(short = 'd', long = "description", help = "New description")]
    description: Option<String>,

    #[clap(short = 'p', long = "project", help = "Project name or id", conflicts_with = "no-project")]
    project: Option<String>,

    #[clap(long = "no-project", help = "Remove the project")]
    no_project: bool,

    #[clap(short = 't', long = "tag", help = "Replace tags, can be repeated")]
    tags: Vec<String>,

    #[clap(long = "start", help = "New start time as `YYYY-MM-DD HH:MM` or `HH:MM`")]
    start: Option<String>,

    #[clap(long = "stop", help = "New stop time as `YYYY-MM-DD HH:MM` or `HH:MM`")]
    stop: Option<String>,
}

/// タイムエントリーを削除するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct DeleteArgs {
    #[clap(help = "Id of the time entry to delete")]
    id: i64,
}

pub struct EditCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> EditCommand<'a, T> {
    /// 新しい`EditCommand`を返す。
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `edit`サブコマンドの処理を行う。
    ///
    /// 読み込み済みのエントリーを編集中の状態にし、変更を適用してからTogglへ送信する。
    /// 送信に失敗した場合も編集中の状態は破棄する。
    pub async fn edit(&self, args: EditArgs, model: &mut Model) -> Result<TimeEntry> {
        if model.begin_edit(args.id).is_none() {
            bail!("Time entry {} is not loaded, run `list` first", args.id);
        }
        let applied = apply_changes(&args, model);
        let draft = model.finish_edit();
        applied?;
        let draft = draft.context("Edit was closed unexpectedly")?;

        let updated = self
            .toggl_client
            .update_time_entry(draft)
            .await
            .with_context(|| format!("Failed to update time entry {}", args.id))?;
        info!("Updated time entry {}", args.id);
        model.upsert_entry(updated.clone());

        Ok(updated)
    }

    /// `delete`サブコマンドの処理を行う。
    pub async fn delete(&self, args: DeleteArgs, model: &mut Model, workspace_id: i64) -> Result<()> {
        let workspace_id = model
            .entry(args.id)
            .map(|entry| entry.workspace_id)
            .unwrap_or(workspace_id);
        self.toggl_client
            .delete_time_entry(workspace_id, args.id)
            .await
            .with_context(|| format!("Failed to delete time entry {}", args.id))?;
        model.delete_entry(args.id);
        info!("Deleted time entry {}", args.id);

        Ok(())
    }
}

/// 引数の変更を編集中のエントリーに適用する。
fn apply_changes(args: &EditArgs, model: &mut Model) -> Result<()> {
    let project_id = match &args.project {
        Some(name) => Some(
            model
                .find_project(name)
                .map(|project| project.id)
                .with_context(|| format!("Unknown project: {}", name))?,
        ),
        None => None,
    };
    let entry = model.editing_mut().context("No time entry is being edited")?;

    if let Some(description) = &args.description {
        entry.description = description.clone();
    }
    if project_id.is_some() {
        entry.project_id = project_id;
    } else if args.no_project {
        entry.project_id = None;
    }
    if !args.tags.is_empty() {
        entry.tags = args.tags.iter().cloned().collect();
    }
    if let Some(start) = &args.start {
        entry.start = parse_local_time(start, entry.start)?;
    }
    if let Some(stop) = &args.stop {
        entry.stop = Some(parse_local_time(stop, entry.stop.unwrap_or(entry.start))?);
    }
    if let Some(stop) = entry.stop {
        if stop < entry.start {
            bail!("Stop time {} is before start time {}", stop, entry.start);
        }
    }

    Ok(())
}

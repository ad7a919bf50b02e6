use anyhow::{Context, Result};
use log::info;

use crate::datetime;
use crate::model::Model;
use crate::sync::refresh_current;
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// タイマーを開始するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct StartArgs {
    #[clap(help = "Description of the new time entry")]
    description: String,

    #[clap(short = 'p', long = "project", help = "Project name or id")]
    project: Option<String>,

    #[clap(short = 't', long = "tag", help = "Tag to attach, can be repeated")]
    tags: Vec<String>,

    #[clap(
        long = "from-last-stop",
        help = "Start at the stop time of the latest entry instead of now"
    )]
    from_last_stop: bool,
}

/// 既存のエントリーと同じ内容でタイマーを開始するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ResumeArgs {
    #[clap(help = "Id of the time entry to continue")]
    id: i64,
}

pub struct TimerCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> TimerCommand<'a, T> {
    /// 新しい`TimerCommand`を返す。
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `start`サブコマンドの処理を行う。
    ///
    /// 計測中のエントリーがあれば先に停止し、同時に計測中のエントリーが1つになるようにする。
    /// `--from-last-stop`の場合は、直前のエントリーの停止日時から開始する。
    pub async fn start(&self, args: StartArgs, model: &mut Model, workspace_id: i64) -> Result<TimeEntry> {
        let project_id = match &args.project {
            Some(name) => Some(
                model
                    .find_project(name)
                    .map(|project| project.id)
                    .with_context(|| format!("Unknown project: {}", name))?,
            ),
            None => None,
        };

        let mut entry = TimeEntry::new_running(workspace_id, &args.description, datetime::now());
        entry.project_id = project_id;
        entry.tags = args.tags.into_iter().collect();
        self.start_entry(entry, model, args.from_last_stop).await
    }

    /// `resume`サブコマンドの処理を行う。
    pub async fn resume(&self, args: ResumeArgs, model: &mut Model) -> Result<TimeEntry> {
        let source = model
            .entry(args.id)
            .with_context(|| format!("Time entry {} is not loaded", args.id))?;

        let mut entry = TimeEntry::new_running(source.workspace_id, &source.description, datetime::now());
        entry.project_id = source.project_id;
        entry.tags = source.tags.clone();
        self.start_entry(entry, model, false).await
    }

    /// `stop`サブコマンドの処理を行う。
    pub async fn stop(&self, model: &mut Model) -> Result<TimeEntry> {
        let running = refresh_current(self.toggl_client, model)
            .await
            .context("Failed to fetch the running time entry")?
            .context("No time entry is running")?;

        self.stop_entry(&running, model).await
    }

    async fn start_entry(
        &self,
        mut entry: TimeEntry,
        model: &mut Model,
        from_last_stop: bool,
    ) -> Result<TimeEntry> {
        // Toggl側で計測中のエントリーだけを停止する
        let running = refresh_current(self.toggl_client, model)
            .await
            .context("Failed to fetch the running time entry")?;
        if let Some(running) = running {
            self.stop_entry(&running, model).await?;
        }
        if from_last_stop {
            if let Some(last_stop) = model.last_stop() {
                entry.start = last_stop;
            }
        }

        let draft = model.begin_new(entry).clone();
        let created = self
            .toggl_client
            .create_time_entry(draft)
            .await
            .context("Failed to start time entry")?;
        model.finish_edit();
        info!("Started time entry {:?}", created.id);
        model.upsert_entry(created.clone());

        Ok(created)
    }

    async fn stop_entry(&self, running: &TimeEntry, model: &mut Model) -> Result<TimeEntry> {
        let id = running.id.context("Running time entry has no id")?;
        let stopped = self
            .toggl_client
            .stop_time_entry(running.workspace_id, id)
            .await
            .with_context(|| format!("Failed to stop time entry {}", id))?;
        info!("Stopped time entry {}", id);
        model.upsert_entry(stopped.clone());

        Ok(stopped)
    }
}

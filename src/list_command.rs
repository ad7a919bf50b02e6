use anyhow::Result;
use log::{info, warn};

use crate::config::Settings;
use crate::datetime;
use crate::model::Model;
use crate::sync::{load_older, refresh_all};
use crate::toggl::TogglRepository;

/// 日毎にまとめたタイムエントリーを表示するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct ListArgs {
    #[clap(long = "offline", help = "Show the saved snapshot without contacting Toggl")]
    offline: bool,

    #[clap(
        short = 'p',
        long = "pages",
        default_value = "0",
        help = "Number of older windows to load after refreshing"
    )]
    pages: usize,

    #[clap(long = "quota", help = "Show the remaining API quota")]
    pub quota: bool,
}

pub struct ListCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> ListCommand<'a, T> {
    /// 新しい`ListCommand`を返す。
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `list`サブコマンドの処理を行う。
    ///
    /// 現在時刻の前後のエントリー、プロジェクト、タグを取得してモデルに反映する。
    /// 取得に失敗した場合は警告を出し、スナップショットから復元した内容のまま表示を続ける。
    ///
    /// # Arguments
    ///
    /// * `args` - `list`サブコマンドの引数
    /// * `model` - 表示に使うモデル
    /// * `settings` - ワークスペースと取得範囲を含む設定
    pub async fn run(&self, args: &ListArgs, model: &mut Model, settings: &Settings) -> Result<()> {
        if args.offline {
            info!("Offline mode, showing saved snapshot only");
            return Ok(());
        }

        let workspace_id = settings.workspace()?;
        let now = datetime::now();
        if let Err(e) = refresh_all(self.toggl_client, model, workspace_id, now, settings.window_days).await {
            warn!("Showing cached entries, refresh failed: {}", e);
            return Ok(());
        }

        for page in 0..args.pages {
            match load_older(self.toggl_client, model, now, settings.window_days).await {
                Ok(0) => {
                    info!("No more entries before page {}", page + 1);
                    break;
                }
                Ok(count) => info!("Loaded {} older entries", count),
                Err(e) => {
                    warn!("Failed to load older entries: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }
}

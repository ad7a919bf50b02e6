use anyhow::{Context, Result};

use crate::model::Model;
use crate::toggl::TogglRepository;

/// プロジェクト、タグの一覧を取得するためのコマンド。
pub struct CatalogCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> CatalogCommand<'a, T> {
    /// 新しい`CatalogCommand`を返す。
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `projects`サブコマンドの処理を行う。プロジェクト一覧を丸ごと置き換える。
    pub async fn projects(&self, model: &mut Model, workspace_id: i64) -> Result<()> {
        let projects = self
            .toggl_client
            .read_projects(workspace_id)
            .await
            .context("Failed to retrieve projects")?;
        model.replace_projects(projects);
        model.set_quota(self.toggl_client.last_quota());
        Ok(())
    }

    /// `tags`サブコマンドの処理を行う。
    ///
    /// 取得したタグとエントリーに付いているタグを合わせて返す。
    pub async fn tags(&self, model: &mut Model, workspace_id: i64) -> Result<Vec<String>> {
        let tags = self
            .toggl_client
            .read_tags(workspace_id)
            .await
            .context("Failed to retrieve tags")?;
        model.replace_tags(tags);
        model.set_quota(self.toggl_client.last_quota());
        Ok(model.tag_vocabulary().into_iter().collect())
    }
}

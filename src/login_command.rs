use anyhow::{bail, Context, Result};
use log::info;

use crate::config::Settings;
use crate::toggl::{Credentials, TogglRepository};

/// Togglにログインするためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    #[clap(long = "token", help = "Log in with an API token", conflicts_with = "email")]
    token: Option<String>,

    #[clap(long = "email", help = "Log in with email and password", requires = "password")]
    email: Option<String>,

    #[clap(
        long = "password",
        help = "Password used with --email",
        env = "TOGGL_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,
}

impl LoginArgs {
    /// 引数から認証情報を作成する。
    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.token, &self.email, &self.password) {
            (Some(token), _, _) => Ok(Credentials::ApiToken(token.clone())),
            (None, Some(email), Some(password)) => Ok(Credentials::Password {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => bail!("Either --token or --email with --password is required"),
        }
    }
}

pub struct LoginCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> LoginCommand<'a, T> {
    /// 新しい`LoginCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - ログインに使う認証情報を持ったリポジトリ
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `login`サブコマンドの処理を行う。
    ///
    /// 認証情報でユーザー情報を取得し、APIトークンとデフォルトのワークスペースを設定に反映する。
    /// パスワードでログインした場合は、レスポンスに含まれるAPIトークンを保存する。
    ///
    /// # Arguments
    ///
    /// * `args` - `login`サブコマンドの引数
    /// * `settings` - 現在の設定
    pub async fn run(&self, args: &LoginArgs, settings: Settings) -> Result<Settings> {
        let profile = self
            .toggl_client
            .me()
            .await
            .context("Failed to log in to Toggl")?;
        info!(
            "Logged in as {} (user {})",
            profile.fullname.as_deref().unwrap_or(&profile.email),
            profile.id
        );

        let api_token = match (&args.token, profile.api_token) {
            (Some(token), _) => token.clone(),
            (None, Some(token)) => token,
            (None, None) => bail!("Toggl did not return an API token for {}", profile.email),
        };

        Ok(Settings {
            api_token: Some(api_token),
            workspace_id: Some(profile.default_workspace_id),
            ..settings
        })
    }
}

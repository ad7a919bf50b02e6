use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};

mod catalog_command;
mod config;
mod console;
mod datetime;
mod duration;
mod edit_command;
mod error;
mod list_command;
mod login_command;
mod model;
mod snapshot;
mod sync;
mod time_entry;
mod timer_command;
mod toggl;

use catalog_command::CatalogCommand;
use config::Settings;
use console::{ConsoleMarkdownList, ConsolePresenter};
use edit_command::{DeleteArgs, EditArgs, EditCommand};
use list_command::{ListArgs, ListCommand};
use login_command::{LoginArgs, LoginCommand};
use model::Model;
use timer_command::{ResumeArgs, StartArgs, TimerCommand};
use toggl::TogglClient;

/// Togglのtime entryを管理するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- login --token <API_TOKEN>
/// $ cargo run -- list --pages 1
/// $ cargo run -- start "write report" --project Docs --tag billable
/// $ cargo run -- stop
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(long = "config", global = true, help = "Path to the config file")]
    config: Option<PathBuf>,

    #[clap(long = "snapshot", global = true, help = "Path to the local snapshot")]
    snapshot: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Log in and remember the API token and default workspace
    Login(LoginArgs),
    /// Forget the API token and remove the local snapshot
    Logout,
    /// Show time entries grouped by day
    List(ListArgs),
    /// Start a new timer
    Start(StartArgs),
    /// Stop the running timer
    Stop,
    /// Start a new timer with the same details as an existing entry
    Resume(ResumeArgs),
    /// Edit a time entry
    Edit(EditArgs),
    /// Delete a time entry
    Delete(DeleteArgs),
    /// List projects of the workspace
    Projects,
    /// List tags of the workspace and loaded entries
    Tags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let config_path = match args.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let snapshot_path = match args.snapshot {
        Some(path) => path,
        None => snapshot::default_path()?,
    };
    let settings = Settings::load(&config_path)?;

    match args.subcommand {
        SubCommands::Login(login) => {
            let client = TogglClient::with_api_url(login.credentials()?, &settings.api_url);
            let settings = LoginCommand::new(&client).run(&login, settings).await?;
            settings.save(&config_path)?;
            info!("Saved credentials to {}", config_path.display());
            return Ok(());
        }
        SubCommands::Logout => {
            let settings = Settings {
                api_token: None,
                workspace_id: None,
                ..settings
            };
            settings.save(&config_path)?;
            snapshot::remove(&snapshot_path)?;
            info!("Logged out");
            return Ok(());
        }
        subcommand => run_session(subcommand, &settings, &snapshot_path).await?,
    }

    Ok(())
}

/// ログイン済みの状態でサブコマンドを実行する。
///
/// 保存済みのスナップショットでモデルを埋めてから実行し、終了時にモデルを保存する。
async fn run_session(subcommand: SubCommands, settings: &Settings, snapshot_path: &Path) -> Result<()> {
    // 未ログインの場合は前回のユーザーのスナップショットに触れない
    if !settings.is_authenticated() {
        bail!("Not logged in. Run `tooggls login` or set TOGGL_API_TOKEN");
    }
    let client = TogglClient::with_api_url(settings.credentials()?, &settings.api_url);
    let mut model = Model::new();
    snapshot::restore_quietly(&mut model, snapshot_path);

    let result = dispatch(subcommand, &client, &mut model, settings).await;

    snapshot::persist_quietly(&model, snapshot_path, datetime::now(), settings.retention_days);
    result
}

async fn dispatch(subcommand: SubCommands, client: &TogglClient, model: &mut Model, settings: &Settings) -> Result<()> {
    let now = datetime::now();
    let mut stdout = io::stdout().lock();
    let mut presenter = ConsoleMarkdownList::new(&mut stdout);

    match subcommand {
        SubCommands::List(list) => {
            ListCommand::new(client).run(&list, model, settings).await?;
            presenter.show_days(model, now)?;
            if list.quota {
                if let Some(quota) = model.quota() {
                    presenter.show_quota(&quota)?;
                }
            }
        }
        SubCommands::Start(start) => {
            let entry = TimerCommand::new(client)
                .start(start, model, settings.workspace()?)
                .await?;
            presenter.show_entry(model, &entry, now)?;
        }
        SubCommands::Stop => {
            let entry = TimerCommand::new(client).stop(model).await?;
            presenter.show_entry(model, &entry, now)?;
        }
        SubCommands::Resume(resume) => {
            let entry = TimerCommand::new(client).resume(resume, model).await?;
            presenter.show_entry(model, &entry, now)?;
        }
        SubCommands::Edit(edit) => {
            let entry = EditCommand::new(client).edit(edit, model).await?;
            presenter.show_entry(model, &entry, now)?;
        }
        SubCommands::Delete(delete) => {
            EditCommand::new(client)
                .delete(delete, model, settings.workspace()?)
                .await?;
        }
        SubCommands::Projects => {
            CatalogCommand::new(client)
                .projects(model, settings.workspace()?)
                .await?;
            presenter.show_projects(&model.projects())?;
        }
        SubCommands::Tags => {
            let tags = CatalogCommand::new(client)
                .tags(model, settings.workspace()?)
                .await?;
            presenter.show_tags(&tags)?;
        }
        SubCommands::Login(_) | SubCommands::Logout => bail!("login and logout run without a session"),
    }

    Ok(())
}

/// ログの出力先とフォーマットを設定する。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
        .context("Failed to initialize logger")?;

    Ok(())
}

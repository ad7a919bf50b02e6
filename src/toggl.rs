use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::HeaderMap, header::CONTENT_TYPE, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TogglError;
use crate::time_entry::{ApiQuota, Profile, Project, TimeEntry};

/// Toggl APIのベースURL。
pub const DEFAULT_API_URL: &str = "https://api.track.toggl.com/api/v9";

/// タイムエントリーを作成したクライアント名としてAPIに渡す値。
const CREATED_WITH: &str = "tooggls";

/// タイムエントリー取得時の日付フィルタ。
///
/// Toggl APIでは2つの形式を同時に指定できない。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateFilter {
    /// `since`(epoch秒)以降に更新され、`before`の日付より前に開始したエントリー。
    Since {
        since: DateTime<Utc>,
        before: NaiveDate,
    },
    /// `start_date`から`end_date`までに開始したエントリー。
    Range {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl DateFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Since { since, before } => vec![
                ("since", since.timestamp().to_string()),
                ("before", before.format("%Y-%m-%d").to_string()),
            ],
            Self::Range {
                start_date,
                end_date,
            } => vec![
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
            ],
        }
    }
}

/// Toggl APIへの認証情報。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    ApiToken(String),
    Password { email: String, password: String },
}

impl Credentials {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiToken(token) => request.basic_auth(token, Some("api_token")),
            Self::Password { email, password } => request.basic_auth(email, Some(password)),
        }
    }
}

/// Toggl APIのタイムエントリーをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    id: i64,
    workspace_id: i64,
    description: Option<String>,
    project_id: Option<i64>,
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
    tags: Option<Vec<String>>,
    at: Option<DateTime<Utc>>,
}

impl From<TogglTimeEntry> for TimeEntry {
    fn from(entry: TogglTimeEntry) -> Self {
        Self {
            id: Some(entry.id),
            workspace_id: entry.workspace_id,
            description: entry.description.unwrap_or_default(),
            start: entry.start,
            stop: entry.stop,
            project_id: entry.project_id,
            tags: entry.tags.unwrap_or_default().into_iter().collect(),
            at: entry.at,
        }
    }
}

/// タイムエントリーの作成、更新時に送信する構造体。
#[derive(Debug, Serialize)]
struct TogglTimeEntryBody<'a> {
    created_with: &'a str,
    workspace_id: i64,
    description: &'a str,
    project_id: Option<i64>,
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
    duration: i64,
    tags: Vec<&'a str>,
}

impl<'a> From<&'a TimeEntry> for TogglTimeEntryBody<'a> {
    fn from(entry: &'a TimeEntry) -> Self {
        // 計測中のエントリーは負のdurationで表す
        let duration = entry
            .stop
            .map(|stop| (stop - entry.start).num_seconds())
            .unwrap_or(-1);
        Self {
            created_with: CREATED_WITH,
            workspace_id: entry.workspace_id,
            description: &entry.description,
            project_id: entry.project_id,
            start: entry.start,
            stop: entry.stop,
            duration,
            tags: entry.tags.iter().map(String::as_str).collect(),
        }
    }
}

/// Toggl APIのプロジェクト情報をデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglProject {
    id: i64,
    name: String,
    color: Option<String>,
}

impl From<TogglProject> for Project {
    fn from(project: TogglProject) -> Self {
        Self {
            id: project.id,
            name: project.name,
            color: project.color.unwrap_or_else(|| "#000000".to_string()),
        }
    }
}

/// Toggl APIのタグ情報をデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTag {
    name: String,
}

/// Toggl APIとやりとりするためのリポジトリ。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TogglRepository: Send + Sync {
    /// 認証中のユーザー情報を取得する。ログイン確認にも利用する。
    async fn me(&self) -> Result<Profile, TogglError>;

    /// 指定した範囲のタイムエントリーを取得する。
    async fn read_time_entries(&self, filter: DateFilter) -> Result<Vec<TimeEntry>, TogglError>;

    /// 計測中のタイムエントリーを取得する。
    async fn read_current_time_entry(&self) -> Result<Option<TimeEntry>, TogglError>;

    /// ワークスペースのプロジェクト一覧を取得する。
    async fn read_projects(&self, workspace_id: i64) -> Result<Vec<Project>, TogglError>;

    /// ワークスペースのタグ一覧を取得する。
    async fn read_tags(&self, workspace_id: i64) -> Result<BTreeSet<String>, TogglError>;

    /// タイムエントリーを作成し、作成されたエントリーを返す。
    async fn create_time_entry(&self, entry: TimeEntry) -> Result<TimeEntry, TogglError>;

    /// タイムエントリーを更新し、更新後のエントリーを返す。
    async fn update_time_entry(&self, entry: TimeEntry) -> Result<TimeEntry, TogglError>;

    /// 計測中のタイムエントリーを停止する。
    async fn stop_time_entry(&self, workspace_id: i64, id: i64) -> Result<TimeEntry, TogglError>;

    /// タイムエントリーを削除する。
    async fn delete_time_entry(&self, workspace_id: i64, id: i64) -> Result<(), TogglError>;

    /// 最後のレスポンスで得られたAPIクォータ。
    fn last_quota(&self) -> Option<ApiQuota>;
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new(Credentials::ApiToken(token));
/// let projects = client.read_projects(workspace_id).await?;
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    credentials: Credentials,
    quota: Mutex<Option<ApiQuota>>,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    pub fn new(credentials: Credentials) -> Self {
        Self::with_api_url(credentials, DEFAULT_API_URL)
    }

    /// 接続先を指定して新しい`TogglClient`を返す。
    pub fn with_api_url(credentials: Credentials, api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
            quota: Mutex::new(None),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .header(CONTENT_TYPE, "application/json");
        self.credentials.apply(request)
    }

    /// リクエストを送信し、ステータスを確認したうえでボディを返す。
    async fn send(&self, request: RequestBuilder) -> Result<String, TogglError> {
        let response = request.send().await?;
        let status = response.status();
        self.record_quota(response.headers());
        let body = response.text().await?;
        debug!("Toggl API responded {} ({} bytes)", status, body.len());

        match TogglError::from_status(status, &body) {
            Some(error) => Err(error),
            None => Ok(body),
        }
    }

    /// リクエストを送信し、JSONボディをデシリアライズする。
    ///
    /// 成功レスポンスのボディが空の場合はエラーとする。
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TogglError> {
        let body = self.send(request).await?;
        if body.trim().is_empty() {
            return Err(TogglError::EmptyBody);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn record_quota(&self, headers: &HeaderMap) {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok())
        };
        if let (Some(remaining), Some(resets_in_secs)) = (
            read("X-Toggl-Quota-Remaining"),
            read("X-Toggl-Quota-Resets-In"),
        ) {
            if let Ok(mut quota) = self.quota.lock() {
                *quota = Some(ApiQuota {
                    remaining,
                    resets_in_secs,
                });
            }
        }
    }
}

#[async_trait]
impl TogglRepository for TogglClient {
    async fn me(&self) -> Result<Profile, TogglError> {
        self.send_json(self.request(Method::GET, "/me")).await
    }

    async fn read_time_entries(&self, filter: DateFilter) -> Result<Vec<TimeEntry>, TogglError> {
        let request = self
            .request(Method::GET, "/me/time_entries")
            .query(&filter.query());
        let entries: Vec<TogglTimeEntry> = self.send_json(request).await?;
        info!("length of time entries: {}", entries.len());

        Ok(entries.into_iter().map(TimeEntry::from).collect())
    }

    async fn read_current_time_entry(&self) -> Result<Option<TimeEntry>, TogglError> {
        let entry: Option<TogglTimeEntry> = self
            .send_json(self.request(Method::GET, "/me/time_entries/current"))
            .await?;

        Ok(entry.map(TimeEntry::from))
    }

    async fn read_projects(&self, workspace_id: i64) -> Result<Vec<Project>, TogglError> {
        let path = format!("/workspaces/{}/projects", workspace_id);
        let projects: Vec<TogglProject> = self.send_json(self.request(Method::GET, &path)).await?;

        Ok(projects.into_iter().map(Project::from).collect())
    }

    async fn read_tags(&self, workspace_id: i64) -> Result<BTreeSet<String>, TogglError> {
        let path = format!("/workspaces/{}/tags", workspace_id);
        // タグが1つもない場合はnullが返る
        let tags: Option<Vec<TogglTag>> = self.send_json(self.request(Method::GET, &path)).await?;

        Ok(tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }

    async fn create_time_entry(&self, entry: TimeEntry) -> Result<TimeEntry, TogglError> {
        let path = format!("/workspaces/{}/time_entries", entry.workspace_id);
        let request = self
            .request(Method::POST, &path)
            .json(&TogglTimeEntryBody::from(&entry));
        let created: TogglTimeEntry = self.send_json(request).await?;

        Ok(created.into())
    }

    async fn update_time_entry(&self, entry: TimeEntry) -> Result<TimeEntry, TogglError> {
        let id = entry
            .id
            .ok_or_else(|| TogglError::Decode("time entry has no id".to_string()))?;
        let path = format!("/workspaces/{}/time_entries/{}", entry.workspace_id, id);
        let request = self
            .request(Method::PUT, &path)
            .json(&TogglTimeEntryBody::from(&entry));
        let updated: TogglTimeEntry = self.send_json(request).await?;

        Ok(updated.into())
    }

    async fn stop_time_entry(&self, workspace_id: i64, id: i64) -> Result<TimeEntry, TogglError> {
        let path = format!("/workspaces/{}/time_entries/{}/stop", workspace_id, id);
        let stopped: TogglTimeEntry = self.send_json(self.request(Method::PATCH, &path)).await?;

        Ok(stopped.into())
    }

    async fn delete_time_entry(&self, workspace_id: i64, id: i64) -> Result<(), TogglError> {
        let path = format!("/workspaces/{}/time_entries/{}", workspace_id, id);
        self.send(self.request(Method::DELETE, &path)).await?;

        Ok(())
    }

    fn last_quota(&self) -> Option<ApiQuota> {
        self.quota.lock().ok().and_then(|quota| *quota)
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockito::{Matcher, Server};

    use super::{Credentials, DateFilter, TogglClient, TogglRepository};
    use crate::error::TogglError;
    use crate::time_entry::{ApiQuota, TimeEntry};

    const TOKEN: &str = "secret-token";

    fn auth_header() -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:api_token", TOKEN));
        format!("Basic {}", encoded)
    }

    fn client(server: &Server) -> TogglClient {
        TogglClient::with_api_url(Credentials::ApiToken(TOKEN.to_string()), &server.url())
    }

    const ENTRY_JSON: &str = r#"{
        "id": 10,
        "workspace_id": 7,
        "description": "write report",
        "project_id": 3,
        "start": "2024-01-01T09:00:00Z",
        "stop": "2024-01-01T10:00:00Z",
        "duration": 3600,
        "tags": ["docs"],
        "at": "2024-01-01T10:00:01Z"
    }"#;

    #[tokio::test]
    async fn test_read_time_entries_with_range() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/me/time_entries")
            .match_header("authorization", auth_header().as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start_date".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("end_date".into(), "2024-01-08".into()),
            ]))
            .with_status(200)
            .with_body(format!("[{}]", ENTRY_JSON))
            .create_async()
            .await;

        let entries = client(&server)
            .read_time_entries(DateFilter::Range {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, Some(10));
        assert_eq!(entries[0].project_id, Some(3));
        assert!(entries[0].tags.contains("docs"));
    }

    #[tokio::test]
    async fn test_read_time_entries_with_since() {
        let mut server = Server::new_async().await;
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mock = server
            .mock("GET", "/me/time_entries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("since".into(), since.timestamp().to_string()),
                Matcher::UrlEncoded("before".into(), "2024-01-05".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let entries = client(&server)
            .read_time_entries(DateFilter::Since {
                since,
                before: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_null_tags_decode_as_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/time_entries/current")
            .with_status(200)
            .with_body(
                r#"{"id": 1, "workspace_id": 7, "description": null, "project_id": null,
                    "start": "2024-01-01T09:00:00Z", "stop": null, "duration": -1,
                    "tags": null, "at": null}"#,
            )
            .create_async()
            .await;

        let entry = client(&server).read_current_time_entry().await.unwrap().unwrap();

        assert!(entry.tags.is_empty());
        assert!(entry.is_running());
        assert_eq!(entry.description, "");
    }

    #[tokio::test]
    async fn test_current_time_entry_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/time_entries/current")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let entry = client(&server).read_current_time_entry().await.unwrap();

        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_is_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let result = client(&server).me().await;

        assert_eq!(result.unwrap_err(), TogglError::EmptyBody);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me")
            .with_status(403)
            .with_body("1 login attempts remaining")
            .create_async()
            .await;

        let result = client(&server).me().await;

        assert_eq!(
            result.unwrap_err(),
            TogglError::InvalidCredentials {
                attempts_remaining: Some(1)
            }
        );
    }

    #[tokio::test]
    async fn test_password_login() {
        let mut server = Server::new_async().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode("me@example.com:hunter2");
        let mock = server
            .mock("GET", "/me")
            .match_header("authorization", format!("Basic {}", encoded).as_str())
            .with_status(200)
            .with_body(
                r#"{"id": 1, "email": "me@example.com", "fullname": "Me",
                    "default_workspace_id": 7, "api_token": "abc"}"#,
            )
            .create_async()
            .await;
        let client = TogglClient::with_api_url(
            Credentials::Password {
                email: "me@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            &server.url(),
        );

        let profile = client.me().await.unwrap();

        mock.assert_async().await;
        assert_eq!(profile.default_workspace_id, 7);
        assert_eq!(profile.api_token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_quota_headers_are_recorded() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/workspaces/7/projects")
            .with_status(200)
            .with_header("X-Toggl-Quota-Remaining", "29")
            .with_header("X-Toggl-Quota-Resets-In", "3599")
            .with_body(r##"[{"id": 3, "name": "Docs", "color": "#06aaf5"}]"##)
            .create_async()
            .await;
        let client = client(&server);

        let projects = client.read_projects(7).await.unwrap();

        assert_eq!(projects[0].name, "Docs");
        assert_eq!(
            client.last_quota(),
            Some(ApiQuota {
                remaining: 29,
                resets_in_secs: 3599
            })
        );
    }

    #[tokio::test]
    async fn test_read_tags_null() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/workspaces/7/tags")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let tags = client(&server).read_tags(7).await.unwrap();

        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_create_running_entry_sends_negative_duration() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/7/time_entries")
            .match_body(Matcher::PartialJsonString(
                r#"{"duration": -1, "description": "write report", "created_with": "tooggls"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(ENTRY_JSON)
            .create_async()
            .await;
        let entry = TimeEntry::new_running(7, "write report", Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());

        let created = client(&server).create_time_entry(entry).await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, Some(10));
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/workspaces/7/time_entries/10")
            .with_status(200)
            .create_async()
            .await;

        client(&server).delete_time_entry(7, 10).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connectivity_error() {
        // 予約済みのポートには接続できない
        let client = TogglClient::with_api_url(Credentials::ApiToken(TOKEN.to_string()), "http://127.0.0.1:1");

        let result = client.me().await;

        assert!(matches!(result, Err(TogglError::Connectivity(_))));
    }
}

use reqwest::StatusCode;
use thiserror::Error;

/// Toggl APIとの通信で発生するエラー。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TogglError {
    #[error("Rate limited by Toggl API, try again later")]
    RateLimited,
    #[error("Invalid credentials{}", attempts_hint(.attempts_remaining))]
    InvalidCredentials { attempts_remaining: Option<u32> },
    #[error("Unauthorized, please log in again")]
    Unauthorized,
    #[error("Toggl API returned status {status}")]
    Server { status: u16 },
    #[error("Could not reach Toggl API: {0}")]
    Connectivity(String),
    #[error("Toggl API returned an empty body")]
    EmptyBody,
    #[error("Failed to decode Toggl API response: {0}")]
    Decode(String),
}

impl TogglError {
    /// 成功以外のステータスコードをエラーに変換する。
    ///
    /// 成功ステータスの場合は`None`を返す。
    ///
    /// # Arguments
    ///
    /// * `status` - レスポンスのステータスコード
    /// * `body` - レスポンスボディ。403の場合に残りの試行回数を読み取る
    pub fn from_status(status: StatusCode, body: &str) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        let error = match status.as_u16() {
            429 => Self::RateLimited,
            403 => Self::InvalidCredentials {
                attempts_remaining: parse_attempts_remaining(body),
            },
            401 => Self::Unauthorized,
            code => Self::Server { status: code },
        };
        Some(error)
    }
}

impl From<reqwest::Error> for TogglError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Server {
                status: status.as_u16(),
            }
        } else {
            Self::Connectivity(error.to_string())
        }
    }
}

impl From<serde_json::Error> for TogglError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

/// "... 2 login attempts remaining" のようなボディから残りの試行回数を取り出す。
fn parse_attempts_remaining(body: &str) -> Option<u32> {
    let lower = body.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let at = words.iter().position(|word| word.starts_with("attempt"))?;
    let number = |word: &&str| {
        word.trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .parse::<u32>()
            .ok()
    };

    // "attempt"の直前2語、なければ直後2語から数字を探す
    words[at.saturating_sub(2)..at]
        .iter()
        .rev()
        .find_map(number)
        .or_else(|| words.iter().skip(at + 1).take(2).find_map(number))
}

fn attempts_hint(attempts_remaining: &Option<u32>) -> String {
    match attempts_remaining {
        Some(n) => format!(" ({} attempts remaining)", n),
        None => String::new(),
    }
}

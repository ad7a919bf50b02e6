use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// `now`を中心に前後`days`日の範囲を返す。
pub fn window_around(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::days(days), now + Duration::days(days))
}

/// `now`から`days`日前の時刻を返す。スナップショットの保持期限に利用する。
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// `YYYY-MM-DD HH:MM`または`HH:MM`形式のLocal時刻をパースする。
///
/// 時刻のみの場合は`base`のLocal日付を利用する。
pub fn parse_local_time(s: &str, base: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let naive = match NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        Ok(naive) => naive,
        Err(_) => {
            let time = chrono::NaiveTime::parse_from_str(s, "%H:%M")
                .with_context(|| format!("Failed to parse time: {}", s))?;
            base.with_timezone(&Local).date_naive().and_time(time)
        }
    };
    let datetime = Local
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("Ambiguous local time: {}", s))?
        .to_utc();

    Ok(datetime)
}

/// UTC時刻をLocalの日付に変換する。
pub fn local_date(datetime: DateTime<Utc>) -> NaiveDate {
    datetime.with_timezone(&Local).date_naive()
}

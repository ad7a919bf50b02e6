use chrono::Duration;

/// 長さが0の場合に表示する文字列。
pub const ZERO_DURATION: &str = "0m";

const UNITS: [(i64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

/// 期間を`1h 5m`のような文字列にする。
///
/// 大きい単位から順に、値が0の単位は飛ばして最大`max_units`個まで出力する。
/// それより細かい値は切り捨てる。
///
/// # Arguments
///
/// * `duration` - 表示する期間
/// * `max_units` - 出力する単位の最大数
pub fn format_duration(duration: Duration, max_units: usize) -> String {
    let mut remaining = duration.num_seconds();
    if remaining <= 0 || max_units == 0 {
        return ZERO_DURATION.to_string();
    }

    let mut parts = Vec::new();
    for (seconds, suffix) in UNITS {
        if parts.len() == max_units {
            break;
        }
        let value = remaining / seconds;
        remaining %= seconds;
        if value > 0 {
            parts.push(format!("{}{}", value, suffix));
        }
    }

    if parts.is_empty() {
        ZERO_DURATION.to_string()
    } else {
        parts.join(" ")
    }
}

/// 計測中のタイマー向けに`H:MM:SS`形式にする。
pub fn format_clock(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{}:{:02}:{:02}",
        total / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}

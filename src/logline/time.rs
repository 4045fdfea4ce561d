//! 时间戳格式
//!
//! PostgreSQL 根据 `log_timezone` 的不同，时间戳末尾可能是数字偏移
//! （`2023-08-23 06:52:53 +0530`）或时区缩写（`2023-08-23 06:52:53 UTC`）。
//! 两种格式都允许带小数秒。

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const DATETIME: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 支持的时间戳格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `YYYY-MM-DD HH:MM:SS[.f] ±HHMM`
    NumericOffset,
    /// `YYYY-MM-DD HH:MM:SS[.f] ZONE`
    NamedZone,
}

impl TimeFormat {
    /// 另一种格式
    pub fn other(self) -> Self {
        match self {
            TimeFormat::NumericOffset => TimeFormat::NamedZone,
            TimeFormat::NamedZone => TimeFormat::NumericOffset,
        }
    }

    /// 按当前格式解析时间戳，统一转换为 UTC
    pub fn parse(self, text: &str) -> Option<DateTime<Utc>> {
        let (datetime, zone) = text.trim().rsplit_once(' ')?;
        let naive = NaiveDateTime::parse_from_str(datetime, DATETIME).ok()?;
        match self {
            TimeFormat::NumericOffset => {
                let offset = parse_offset(zone)?;
                offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|t| t.with_timezone(&Utc))
            }
            TimeFormat::NamedZone => {
                // 无法识别的时区缩写按零偏移处理
                if zone.len() < 3
                    || !zone.chars().all(|c| c.is_ascii_alphabetic())
                {
                    return None;
                }
                Some(Utc.from_utc_datetime(&naive))
            }
        }
    }
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

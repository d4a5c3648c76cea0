//! Rendering of one day's metrics into a markdown section.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime};
use fitbit_client::{MetricKind, SleepDay, SleepLog};

use crate::fetcher::MetricSnapshot;
use crate::template::{HeadingTemplate, Locale};

/// Offset used for clock fields (UTC+9).
pub const LOCAL_OFFSET_SECS: i32 = 9 * 3600;

/// Ordered lines of one data section. The first line is the heading, the last
/// one is blank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedSection {
    lines: Vec<String>,
}

impl FormattedSection {
    pub fn new(heading: String, body: Vec<String>) -> Self {
        let mut lines = Vec::with_capacity(body.len() + 2);
        lines.push(heading);
        lines.extend(body);
        if lines.last().is_none_or(|l| !l.is_empty()) {
            lines.push(String::new());
        }
        Self { lines }
    }

    pub fn heading(&self) -> &str {
        &self.lines[0]
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Section as text; ends with exactly one newline after the last row.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageBreakdown {
    pub deep: u32,
    pub light: u32,
    pub rem: u32,
    pub wake: u32,
}

impl StageBreakdown {
    pub fn is_all_zero(&self) -> bool {
        self.deep == 0 && self.light == 0 && self.rem == 0 && self.wake == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageSource {
    Entry,
    DayAggregate,
}

/// The sleep log entry chosen for a day, normalized.
#[derive(Clone, Debug, PartialEq)]
pub struct SleepSession {
    pub asleep_minutes: u32,
    pub time_in_bed_minutes: u32,
    pub start_time: Option<String>,
    pub awake_count: u32,
    pub restless_count: u32,
    pub stages: StageBreakdown,
    pub stage_source: StageSource,
}

impl SleepSession {
    /// Bedtime and wake time as `HH:MM` at UTC+9, or `None` when the start
    /// time is missing or unparseable.
    pub fn clock(&self) -> Option<(String, String)> {
        let start = parse_start_time(self.start_time.as_deref()?)?;
        let wake = start + Duration::minutes(i64::from(self.asleep_minutes));
        Some((
            start.format("%H:%M").to_string(),
            wake.format("%H:%M").to_string(),
        ))
    }
}

/// Pick the main sleep entry, else the longest one (first wins on ties).
pub fn select_sleep_log(logs: &[SleepLog]) -> Option<&SleepLog> {
    if let Some(main) = logs.iter().find(|l| l.is_main()) {
        return Some(main);
    }
    let mut best: Option<&SleepLog> = None;
    for log in logs {
        if best.is_none_or(|b| log.asleep_minutes() > b.asleep_minutes()) {
            best = Some(log);
        }
    }
    best
}

/// Build the session for a day. Stage minutes come from the entry; the
/// day-level aggregate replaces them only when all four are zero.
pub fn select_sleep(day: &SleepDay) -> Option<SleepSession> {
    let log = select_sleep_log(&day.sleep)?;
    tracing::debug!(
        date_of_sleep = log.date_of_sleep.as_deref().unwrap_or_default(),
        is_main = log.is_main(),
        log_type = log.log_type.as_deref().unwrap_or_default(),
        minutes_asleep = log.asleep_minutes(),
        "selected sleep log"
    );

    let entry_stages = log
        .levels
        .as_ref()
        .and_then(|l| l.summary.as_ref())
        .map(|s| {
            let minutes = |m: &Option<fitbit_client::StageMinutes>| {
                m.as_ref().and_then(|m| m.minutes).unwrap_or(0)
            };
            StageBreakdown {
                deep: minutes(&s.deep),
                light: minutes(&s.light),
                rem: minutes(&s.rem),
                wake: minutes(&s.wake),
            }
        })
        .unwrap_or_default();

    let (stages, stage_source) = if entry_stages.is_all_zero() {
        let aggregate = day
            .summary
            .as_ref()
            .and_then(|s| s.stages.as_ref())
            .map(|s| StageBreakdown {
                deep: s.deep.unwrap_or(0),
                light: s.light.unwrap_or(0),
                rem: s.rem.unwrap_or(0),
                wake: s.wake.unwrap_or(0),
            });
        match aggregate {
            Some(stages) => {
                tracing::debug!(?stages, "entry stages empty; using day aggregate");
                (stages, StageSource::DayAggregate)
            }
            None => {
                tracing::debug!("no stage data for selected sleep log");
                (entry_stages, StageSource::Entry)
            }
        }
    } else {
        (entry_stages, StageSource::Entry)
    };

    Some(SleepSession {
        asleep_minutes: log.asleep_minutes(),
        time_in_bed_minutes: log.time_in_bed.unwrap_or(0),
        start_time: log.start_time.clone().filter(|s| !s.trim().is_empty()),
        awake_count: log.awake_count.unwrap_or(0),
        restless_count: log.restless_count.unwrap_or(0),
        stages,
        stage_source,
    })
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` taken
/// as UTC, and shift it to UTC+9.
pub fn parse_start_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(LOCAL_OFFSET_SECS)?;
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&offset));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().with_timezone(&offset))
}

/// Activity totals with their documented zero defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActivityTotals {
    pub steps: u64,
    pub distance_km: f64,
    pub calories: u64,
    pub active_minutes: u64,
}

impl ActivityTotals {
    pub fn from_snapshot(snapshot: &MetricSnapshot) -> Self {
        let value = |kind: MetricKind| {
            snapshot
                .get(kind)
                .and_then(|payload| kind.first_value(payload))
        };
        let count = |kind: MetricKind| {
            value(kind)
                .filter(|v| *v >= 0.0)
                .map(|v| v.trunc() as u64)
                .unwrap_or(0)
        };
        Self {
            steps: count(MetricKind::Steps),
            distance_km: value(MetricKind::Distance).unwrap_or(0.0),
            calories: count(MetricKind::Calories),
            active_minutes: count(MetricKind::ActiveMinutes),
        }
    }
}

struct Labels {
    activity: &'static str,
    sleep: &'static str,
    data: &'static str,
    unit: &'static str,
    steps: &'static str,
    steps_unit: &'static str,
    distance: &'static str,
    calories: &'static str,
    active: &'static str,
    minutes_unit: &'static str,
    wake_stage: &'static str,
    rem: &'static str,
    light: &'static str,
    deep: &'static str,
    total_asleep: &'static str,
    bedtime: &'static str,
    wake_time: &'static str,
    time_in_bed: &'static str,
    awake_count: &'static str,
    restless_count: &'static str,
    count_unit: &'static str,
    unknown: &'static str,
}

const JA: Labels = Labels {
    activity: "**アクティビティ**",
    sleep: "**睡眠**",
    data: "データ",
    unit: "単位",
    steps: "🚶‍♂️ 歩数",
    steps_unit: "歩",
    distance: "📏 距離",
    calories: "🔥 消費カロリー",
    active: "⚡ 高強度アクティブ時間",
    minutes_unit: "分",
    wake_stage: "💡 目覚めた状態",
    rem: "🧠 レム睡眠",
    light: "😴 浅い睡眠",
    deep: "🌌 深い睡眠",
    total_asleep: "💤 総睡眠時間",
    bedtime: "🌃 就寝時刻",
    wake_time: "🌅 起床時刻",
    time_in_bed: "🛌 ベッドにいた合計時間",
    awake_count: "👀 起床回数",
    restless_count: "🔄 寝返りの回数",
    count_unit: "回",
    unknown: "不明",
};

const EN: Labels = Labels {
    activity: "**Activity**",
    sleep: "**Sleep**",
    data: "Data",
    unit: "Unit",
    steps: "🚶‍♂️ Steps",
    steps_unit: "steps",
    distance: "📏 Distance",
    calories: "🔥 Calories burned",
    active: "⚡ Very active time",
    minutes_unit: "min",
    wake_stage: "💡 Awake",
    rem: "🧠 REM sleep",
    light: "😴 Light sleep",
    deep: "🌌 Deep sleep",
    total_asleep: "💤 Total sleep",
    bedtime: "🌃 Bedtime",
    wake_time: "🌅 Wake time",
    time_in_bed: "🛌 Time in bed",
    awake_count: "👀 Awakenings",
    restless_count: "🔄 Restless count",
    count_unit: "times",
    unknown: "unknown",
};

impl Locale {
    fn labels(&self) -> &'static Labels {
        match self {
            Locale::Ja => &JA,
            Locale::En => &EN,
        }
    }

    /// Sentinel rendered for clock fields that cannot be determined.
    pub fn unknown(&self) -> &'static str {
        self.labels().unknown
    }
}

/// Minutes as zero-padded `HH:MM`.
pub fn hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Integer with `,` thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Debug, Default)]
pub struct MetricsFormatter {
    heading: HeadingTemplate,
    locale: Locale,
}

impl MetricsFormatter {
    pub fn new(heading: HeadingTemplate, locale: Locale) -> Self {
        Self { heading, locale }
    }

    pub fn heading(&self) -> &HeadingTemplate {
        &self.heading
    }

    /// Render `snapshot` as the data section for `date`. Pure: identical
    /// inputs give byte-identical output.
    pub fn format(&self, snapshot: &MetricSnapshot, date: NaiveDate) -> FormattedSection {
        let l = self.locale.labels();
        let totals = ActivityTotals::from_snapshot(snapshot);
        let session = snapshot
            .get(MetricKind::Sleep)
            .and_then(|v| serde_json::from_value::<SleepDay>(v.clone()).ok())
            .and_then(|day| select_sleep(&day));

        let mut body = vec![
            String::new(),
            format!("| {} | {} | {} |", l.activity, l.data, l.unit),
            "| :--- | :--- | :--- |".to_string(),
            format!(
                "| {} | {} | {} |",
                l.steps,
                group_thousands(totals.steps),
                l.steps_unit
            ),
            format!("| {} | {:.2} | km |", l.distance, totals.distance_km),
            format!(
                "| {} | {} | kcal |",
                l.calories,
                group_thousands(totals.calories)
            ),
            format!(
                "| {} | {} | {} |",
                l.active, totals.active_minutes, l.minutes_unit
            ),
            String::new(),
            format!(
                "| {s} | {d} | {u} | {s} | {d} | {u} |",
                s = l.sleep,
                d = l.data,
                u = l.unit
            ),
            "| :--- | :--- | :--- | :--- | :--- | :--- |".to_string(),
        ];

        let stages = session.as_ref().map(|s| s.stages).unwrap_or_default();
        let (bedtime, wake_time) = session
            .as_ref()
            .and_then(SleepSession::clock)
            .unwrap_or_else(|| (l.unknown.to_string(), l.unknown.to_string()));
        let asleep = session.as_ref().map_or(0, |s| s.asleep_minutes);
        let in_bed = session.as_ref().map_or(0, |s| s.time_in_bed_minutes);
        let awake_count = session.as_ref().map_or(0, |s| s.awake_count);
        let restless_count = session.as_ref().map_or(0, |s| s.restless_count);

        let rows: [(&str, String, &str, String, &str); 5] = [
            (l.wake_stage, hhmm(stages.wake), l.bedtime, bedtime, "hh:mm"),
            (l.rem, hhmm(stages.rem), l.wake_time, wake_time, "hh:mm"),
            (l.light, hhmm(stages.light), l.time_in_bed, hhmm(in_bed), "hh:mm"),
            (
                l.deep,
                hhmm(stages.deep),
                l.awake_count,
                awake_count.to_string(),
                l.count_unit,
            ),
            (
                l.total_asleep,
                hhmm(asleep),
                l.restless_count,
                restless_count.to_string(),
                l.count_unit,
            ),
        ];
        for (left, left_value, right, right_value, right_unit) in rows {
            body.push(format!(
                "| {left} | {left_value} | hh:mm | {right} | {right_value} | {right_unit} |"
            ));
        }

        FormattedSection::new(self.heading.render(date), body)
    }
}

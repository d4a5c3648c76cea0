//! Typed heading and filename templates for daily notes.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::SyncError;

pub const DEFAULT_HEADING_TEMPLATE: &str = "## 📊 Fitbitデータ ({date})";
pub const DEFAULT_FILENAME_TEMPLATE: &str = "📅{date}({weekday}).md";

/// Language of generated labels, weekday names and sentinels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl Locale {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja" | "ja-jp" | "ja_jp" => Ok(Locale::Ja),
            "en" | "en-us" | "en_us" => Ok(Locale::En),
            other => Err(SyncError::Config(format!("unsupported locale: {other}"))),
        }
    }

    pub fn weekday_name(&self, weekday: Weekday) -> &'static str {
        const JA: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];
        const EN: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let idx = weekday.num_days_from_monday() as usize;
        match self {
            Locale::Ja => JA[idx],
            Locale::En => EN[idx],
        }
    }

    /// First line of a newly created daily note.
    pub fn creation_header(&self, date: NaiveDate) -> String {
        let weekday = self.weekday_name(date.weekday());
        match self {
            Locale::Ja => format!("# {}({weekday})", date.format("%Y年%m月%d日")),
            Locale::En => format!("# {} ({weekday})", date.format("%Y-%m-%d")),
        }
    }
}

/// Section heading with a single `{date}` placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadingTemplate {
    before: String,
    after: String,
}

impl HeadingTemplate {
    pub fn parse(template: &str) -> Result<Self, SyncError> {
        let Some((before, after)) = template.split_once("{date}") else {
            return Err(SyncError::Config(format!(
                "heading template must contain {{date}}: {template}"
            )));
        };
        if after.contains("{date}") {
            return Err(SyncError::Config(format!(
                "heading template must contain {{date}} exactly once: {template}"
            )));
        }
        let parsed = Self {
            before: before.to_string(),
            after: after.to_string(),
        };
        // markers alone would match every heading of that level
        if parsed.detection_prefix().trim_start_matches('#').trim().is_empty() {
            return Err(SyncError::Config(format!(
                "heading template needs heading text before {{date}}: {template}"
            )));
        }
        Ok(parsed)
    }

    pub fn render(&self, date: NaiveDate) -> String {
        format!("{}{}{}", self.before, date.format("%Y-%m-%d"), self.after)
    }

    /// Heading text with the date part removed. Matches a section of this kind
    /// regardless of the date it was generated for. An opening bracket directly
    /// wrapping the placeholder, as in `Data ({date})`, is dropped with it.
    pub fn detection_prefix(&self) -> &str {
        self.before
            .trim_end()
            .trim_end_matches(['(', '[', '（'])
            .trim()
    }
}

impl Default for HeadingTemplate {
    fn default() -> Self {
        Self {
            before: "## 📊 Fitbitデータ (".into(),
            after: ")".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Date,
    Weekday,
}

/// Note filename with `{date}` and `{weekday}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilenameTemplate {
    segments: Vec<Segment>,
}

impl FilenameTemplate {
    pub fn parse(template: &str) -> Result<Self, SyncError> {
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let Some(close) = rest[open..].find('}') else {
                return Err(SyncError::Config(format!(
                    "unterminated placeholder in filename template: {template}"
                )));
            };
            let name = &rest[open + 1..open + close];
            segments.push(match name {
                "date" => Segment::Date,
                "weekday" => Segment::Weekday,
                other => {
                    return Err(SyncError::Config(format!(
                        "unknown placeholder {{{other}}} in filename template"
                    )));
                }
            });
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        if !segments.contains(&Segment::Date) {
            return Err(SyncError::Config(format!(
                "filename template must contain {{date}}: {template}"
            )));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, date: NaiveDate, locale: Locale) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Date => out.push_str(&date.format("%Y-%m-%d").to_string()),
                Segment::Weekday => out.push_str(locale.weekday_name(date.weekday())),
            }
        }
        out
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Literal("📅".into()),
                Segment::Date,
                Segment::Literal("(".into()),
                Segment::Weekday,
                Segment::Literal(").md".into()),
            ],
        }
    }
}

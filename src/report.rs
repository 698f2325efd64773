//! Renders a [`DeltaReport`] as the text posted to the chat.
//!
//! ```text
//! 📊 Bitnodes by Country - 2026-10-16 14:30 PKT
//! Total: 21,474 (+70, +0.33%)
//! • United States: 6,012 (+50, +0.84%)
//! • Germany: 3,020 (-4, -0.13%)
//! • Others: 7,301 (+20, +0.27%)
//!
//! Source: bitnodes.io (snapshot every ~10 min), posted every 30 min
//! ```
use crate::countries::name_for;
use crate::delta::{Change, DeltaEntry, DeltaReport, Label, PctChange};
use chrono::{DateTime, FixedOffset, Utc};
use std::borrow::Cow;
use std::time::Duration;

/// Fixed offset plus the label printed after the time.
#[derive(Debug, Clone)]
pub struct ReportZone {
    pub offset: FixedOffset,
    pub label: String,
}

impl ReportZone {
    /// `None` when the offset is beyond ±24h.
    pub fn new(utc_offset_minutes: i32, label: impl Into<String>) -> Option<Self> {
        Some(ReportZone {
            offset: FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?,
            label: label.into(),
        })
    }
}

/// Builds the whole message, safe for Telegram's HTML parse mode. Output only
/// depends on the arguments, except that a `generated_at` outside chrono's
/// range is stamped with the current time.
pub fn format(
    report: &DeltaReport,
    generated_at: i64,
    zone: &ReportZone,
    report_interval: Duration,
) -> String {
    let local = DateTime::<Utc>::from_timestamp(generated_at, 0)
        .unwrap_or_else(Utc::now)
        .with_timezone(&zone.offset);

    let mut lines = Vec::with_capacity(report.countries.len() + 5);
    lines.push(format!(
        "📊 Bitnodes by Country - {} {}",
        local.format("%Y-%m-%d %H:%M"),
        zone.label
    ));

    lines.push(match &report.total.change {
        Some(change) => format!("Total: {} ({})", grouped(report.total.count), suffix(change)),
        None => format!("Total: {} (first run)", grouped(report.total.count)),
    });

    for entry in report.countries.iter().chain(report.others.iter()) {
        lines.push(format!("• {}", entry_line(entry)));
    }

    lines.push(String::new());
    lines.push(format!(
        "Source: bitnodes.io (snapshot every ~10 min), posted every {}",
        cadence(report_interval)
    ));

    sanitize(&lines.join("\n"))
}

fn entry_line(entry: &DeltaEntry) -> String {
    let name: Cow<str> = match &entry.label {
        Label::Country(code) => name_for(code),
        Label::Others => Cow::Borrowed("Others"),
        Label::Total => Cow::Borrowed("Total"),
    };
    match &entry.change {
        Some(change) => format!("{}: {} ({})", name, grouped(entry.count), suffix(change)),
        None => format!("{}: {}", name, grouped(entry.count)),
    }
}

fn suffix(change: &Change) -> String {
    let sign = if change.delta < 0 { "-" } else { "+" };
    let pct = match change.pct {
        PctChange::New => "new".to_string(),
        PctChange::Ratio(p) if p == 0.0 => "0.00%".to_string(),
        PctChange::Ratio(p) => format!("{:+.2}%", p),
    };
    format!("{}{}, {}", sign, grouped(change.delta.unsigned_abs()), pct)
}

/// `1234567` -> `1,234,567`
pub fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn cadence(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{} h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{} min", secs / 60)
    } else {
        format!("{} s", secs)
    }
}

/// Drops control characters other than newlines and escapes the three
/// characters Telegram's HTML mode treats as markup.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => out.push('\n'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

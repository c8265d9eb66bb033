//! Blocked-event snapshots and their text summary.

use crate::provider::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest serialised snapshot sent to the collector.
pub const MAX_REPORT_BYTES: usize = 10_000;

/// Longest value rendered on one summary line, in characters.
const SUMMARY_VALUE_MAX: usize = 300;

/// Strings are never shrunk below this many characters while capping.
const MIN_FIELD_CHARS: usize = 16;

/// Record of a blocked verdict, captured when it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    /// Always `"blocked"`.
    pub status: String,
    /// Provider wire name.
    pub provider: String,
    /// Provider name used for message selection.
    pub provider_norm: String,
    /// Reason code.
    pub reason: String,
    /// Free-form details (failing URL, error message, marker).
    pub details: String,
    /// DOM id of the selected option.
    pub payment_option_id: String,
    /// Module name of the selected option.
    pub module_name: String,
    /// What the detector expected to find.
    pub expected: String,
    /// What it found instead.
    pub found: String,
    /// Readiness at the time of the verdict, when evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_ready: Option<bool>,
    /// Whether the provider SDK globals were present, when evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals_present: Option<bool>,
    /// Page URL.
    pub url: String,
    /// User agent.
    pub ua: String,
    /// Verdict time.
    pub ts: DateTime<Utc>,
    /// Detector version.
    pub version: String,
    /// Pre-rendered text summary.
    pub summary: String,
}

/// Inputs of a snapshot that come from the verdict itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotExtras {
    /// Expected marker.
    pub expected: String,
    /// Found marker.
    pub found: String,
    /// Readiness flag.
    pub widget_ready: Option<bool>,
    /// SDK globals flag.
    pub globals_present: Option<bool>,
}

/// Page context of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Page URL.
    pub url: &'a str,
    /// User agent.
    pub ua: &'a str,
    /// Selected option id.
    pub payment_option_id: &'a str,
    /// Selected option module name.
    pub module_name: &'a str,
    /// Verdict time, ms since epoch.
    pub now_ms: u64,
}

impl DiagnosticSnapshot {
    /// Build a snapshot and render its summary.
    #[must_use]
    pub fn capture(
        provider: Provider,
        reason: &str,
        details: &str,
        extras: SnapshotExtras,
        page: PageContext<'_>,
    ) -> Self {
        let ts = i64::try_from(page.now_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        let mut snapshot = Self {
            status: "blocked".to_string(),
            provider: provider.wire_name().to_string(),
            provider_norm: provider.wire_name().to_string(),
            reason: reason.to_string(),
            details: details.to_string(),
            payment_option_id: page.payment_option_id.to_string(),
            module_name: page.module_name.to_string(),
            expected: extras.expected,
            found: extras.found,
            widget_ready: extras.widget_ready,
            globals_present: extras.globals_present,
            url: page.url.to_string(),
            ua: page.ua.to_string(),
            ts,
            version: env!("CARGO_PKG_VERSION").to_string(),
            summary: String::new(),
        };
        snapshot.summary = snapshot.render_summary();
        snapshot
    }

    /// Render the text summary: a header plus one line per present field.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let mut lines = vec!["Payguard diagnostic".to_string()];
        let mut push = |label: &str, value: &str| {
            if !value.is_empty() {
                lines.push(format!("{label}: {}", truncate_chars(value, SUMMARY_VALUE_MAX)));
            }
        };
        push("Version", &self.version);
        push("Provider", &self.provider);
        push("Reason", &self.reason);
        push("Details", &self.details);
        push("Module", &self.module_name);
        push("Payment option id", &self.payment_option_id);
        push("Expected", &self.expected);
        push("Found", &self.found);
        if let Some(ready) = self.widget_ready {
            push("Widget ready", yes_no(ready));
        }
        if let Some(globals) = self.globals_present {
            push("Globals present", yes_no(globals));
        }
        push("Page", &self.url);
        push("User-Agent", &self.ua);
        push("Time", &self.ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        lines.join("\n")
    }

    /// Serialised size in bytes.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map_or(usize::MAX, |v| v.len())
    }

    /// Shrink the longest string fields until the serialised form fits in
    /// `max_bytes`, or nothing is left to shrink.
    #[must_use]
    pub fn capped(mut self, max_bytes: usize) -> Self {
        while self.serialized_len() > max_bytes {
            let longest = self
                .string_fields()
                .into_iter()
                .max_by_key(|s| s.chars().count())
                .filter(|s| s.chars().count() > MIN_FIELD_CHARS);
            let Some(field) = longest else {
                break;
            };
            let keep = (field.chars().count() / 2).max(MIN_FIELD_CHARS);
            *field = truncate_chars(field, keep);
        }
        self
    }

    fn string_fields(&mut self) -> Vec<&mut String> {
        vec![
            &mut self.provider,
            &mut self.provider_norm,
            &mut self.reason,
            &mut self.details,
            &mut self.payment_option_id,
            &mut self.module_name,
            &mut self.expected,
            &mut self.found,
            &mut self.url,
            &mut self.ua,
            &mut self.version,
            &mut self.summary,
        ]
    }
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

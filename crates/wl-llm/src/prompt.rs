//! Prompt text for the summary and chat modes.

use chrono::{Datelike, NaiveDateTime};

use crate::digest::WorkDigest;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You summarize a developer's work activity for standups and status reports. \
Be concise, group related activity, and focus on outcomes rather than raw \
events. Format the answer as markdown. If a source is listed under warnings, \
mention briefly that its data is missing.";

const REPORT_FORMATS: &str = "\
## Report Formats

For standup notes, use this structure:
### Standup - [Date]
**Yesterday:**
- [accomplishments based on data]

**Today:**
- [planned work based on calendar]

**Blockers:**
- [any identified concerns, or \"None\" if clear]

For weekly reports, use this structure:
### Weekly Report - Week [N]
**Key Accomplishments:**
- [bullet points from commits and calendar]

**Meetings & Collaboration:**
- [summary of meetings attended]

**Code Contributions:**
- [repositories worked on and highlights]

**Communication:**
- [key Slack discussions]

**Research & Learning:**
- [topics explored based on browser history]
";

/// System prompt for chat, anchored to the current local time.
pub fn chat_system_prompt(now: NaiveDateTime) -> String {
    let mut lines = Vec::new();
    lines.push(
        "You are a helpful engineering-lead assistant built into a developer's worklog CLI. \
         You help analyze work patterns, write reports and answer questions about the \
         user's activity."
            .to_string(),
    );
    lines.push(String::new());
    lines.push("## Current Context".to_string());
    lines.push(format!("- Today's date: {}", now.format("%A, %B %d, %Y")));
    lines.push(format!("- Current time: {}", now.format("%H:%M")));
    lines.push(format!("- Week number: {}", now.iso_week().week()));
    lines.push(String::new());
    lines.push("## Data".to_string());
    lines.push(
        "Use the get_work_data tool to fetch calendar events, browser history, GitHub \
         commits, Slack messages and Linear issues for a date range. Always fetch data \
         before answering questions about the user's work."
            .to_string(),
    );
    lines.push(
        "Use the query_linear tool for questions about the Linear workspace itself: \
         projects, teams, issue search or audit logs."
            .to_string(),
    );
    lines.push(String::new());
    lines.push("## Guidelines".to_string());
    lines.push("- \"today\" is today's date only; \"yesterday\" is one day ago.".to_string());
    lines.push("- \"this week\" is Monday of the current week through today.".to_string());
    lines.push("- \"last week\" is the previous Monday through Sunday.".to_string());
    lines.push("- \"this month\" is the 1st of the current month through today.".to_string());
    lines.push("- Be concise, use markdown, and acknowledge missing data.".to_string());
    lines.push(String::new());
    lines.push(REPORT_FORMATS.to_string());
    lines.join("\n")
}

/// User prompt asking for a summary of `digest`.
pub fn summary_prompt(digest: &WorkDigest) -> String {
    let period = if digest.start == digest.end {
        format!("on {}", digest.start.format("%A, %B %d, %Y"))
    } else {
        format!(
            "from {} to {}",
            digest.start.format("%B %d, %Y"),
            digest.end.format("%B %d, %Y")
        )
    };
    // Serializing plain data cannot fail
    let data = serde_json::to_string_pretty(digest).unwrap_or_default();
    format!(
        "Summarize my work {period}.\n\n\
         Write a short overview, then bullet points for meetings, code, \
         communication and research. Skip sections with no data.\n\n\
         Activity data (JSON):\n{data}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wl_core::{DateRange, aggregate};

    #[test]
    fn chat_prompt_includes_date_context() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 29)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let prompt = chat_system_prompt(now);
        assert!(prompt.contains("Today's date: Wednesday, January 29, 2025"));
        assert!(prompt.contains("Current time: 14:05"));
        assert!(prompt.contains("Week number: 5"));
        assert!(prompt.contains("get_work_data"));
        assert!(prompt.contains("query_linear"));
    }

    #[test]
    fn summary_prompt_names_period_and_embeds_data() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
        )
        .unwrap();
        let digest = WorkDigest::from_aggregation(&aggregate(range, Vec::new()));
        let prompt = summary_prompt(&digest);
        assert!(prompt.starts_with("Summarize my work from January 27, 2025 to February 02, 2025."));
        assert!(prompt.contains("\"start\": \"2025-01-27\""));
    }
}

//! Colored terminal output for audit records.
//!
//! Formatting is split from printing so the plain text can be tested without
//! ANSI escapes.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::audit::{summarize_changes, AuditAction, AuditRecord, AuditStats, Page, Snapshot};

/// Timestamp format used in every listing.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Maximum length of a change summary in list output.
const SUMMARY_MAX_LEN: usize = 100;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// One-line description of what a record changed.
///
/// Updates list the changed attributes. Creations and deletions count the
/// captured attributes. Restorations carry no values.
#[must_use]
pub fn change_summary(record: &AuditRecord) -> Option<String> {
    match (&record.before_values, &record.after_values) {
        (Some(before), Some(after)) => summarize_changes(&before.diff(after)),
        (None, Some(values)) | (Some(values), None) => {
            Some(format!("{} attributes", values.len()))
        }
        (None, None) => None,
    }
}

/// Plain one-line rendering of a record.
#[must_use]
pub fn format_record(record: &AuditRecord) -> String {
    let mut line = format!(
        "#{} {} {} {}:{} by {}",
        record.id,
        record.created_at.format(TIME_FORMAT),
        record.action,
        record.entity_type,
        record.entity_id,
        record.actor_id.as_deref().unwrap_or("system"),
    );
    if let Some(summary) = change_summary(record) {
        line.push_str(" (");
        line.push_str(&truncate(&summary, SUMMARY_MAX_LEN));
        line.push(')');
    }
    line
}

fn action_label(action: AuditAction) -> String {
    let label = format!("[{}]", action.as_str().to_uppercase());
    match action {
        AuditAction::Created => label.green().bold().to_string(),
        AuditAction::Updated => label.cyan().bold().to_string(),
        AuditAction::Deleted => label.yellow().bold().to_string(),
        AuditAction::Restored => label.blue().bold().to_string(),
        AuditAction::ForceDeleted => label.red().bold().to_string(),
    }
}

/// Print a list of records, one per line.
pub fn print_records(records: &[AuditRecord]) {
    if records.is_empty() {
        println!("{}", "No audit records".dimmed());
    }
    for record in records {
        println!(
            "{} {} {}:{} by {} {}",
            record.created_at.format(TIME_FORMAT).dimmed(),
            action_label(record.action),
            record.entity_type.bold(),
            record.entity_id,
            record.actor_id.as_deref().unwrap_or("system").cyan(),
            change_summary(record)
                .map(|s| truncate(&s, SUMMARY_MAX_LEN))
                .unwrap_or_default()
                .dimmed()
        );
    }
    let _ = io::stdout().flush();
}

/// Print one page of records followed by its position.
pub fn print_page(page: &Page<AuditRecord>) {
    print_records(&page.data);
    println!(
        "{}",
        format!(
            "page {}/{} ({} records, {} per page)",
            page.meta.current_page, page.meta.last_page, page.meta.total, page.meta.page_size
        )
        .dimmed()
    );
    let _ = io::stdout().flush();
}

fn print_snapshot(title: &str, snapshot: &Snapshot) {
    println!("  {}", title.bold());
    for (name, value) in snapshot.iter() {
        println!("    {name} = {value}");
    }
}

/// Print every field of one record, plus the live entity if it still exists.
pub fn print_record_detail(record: &AuditRecord, entity: Option<&Snapshot>) {
    println!(
        "{} #{} {}:{}",
        action_label(record.action),
        record.id,
        record.entity_type.bold(),
        record.entity_id
    );
    println!("  at     {}", record.created_at.format(TIME_FORMAT));
    println!("  actor  {}", record.actor_id.as_deref().unwrap_or("system"));
    if let Some(address) = &record.client_address {
        println!("  ip     {address}");
    }
    if let Some(agent) = &record.client_agent {
        println!("  agent  {agent}");
    }
    if let Some(before) = &record.before_values {
        print_snapshot("before", before);
    }
    if let Some(after) = &record.after_values {
        print_snapshot("after", after);
    }
    match entity {
        Some(current) => print_snapshot("current", current),
        None => println!("  {}", "entity no longer exists".dimmed()),
    }
    let _ = io::stdout().flush();
}

/// Print aggregate counts.
pub fn print_stats(stats: &AuditStats) {
    println!("{} {}", "total".bold(), stats.total);
    println!("{} {}", "this month".bold(), stats.this_month);
    println!("{} {}", "today".bold(), stats.today);
    println!("{}", "by action".bold());
    for (action, count) in &stats.by_action {
        println!("  {action:<14} {count}");
    }
    println!("{}", "by entity type".bold());
    for (entity_type, count) in &stats.by_entity_type {
        println!("  {entity_type:<14} {count}");
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(action: AuditAction, before: Option<Snapshot>, after: Option<Snapshot>) -> AuditRecord {
        AuditRecord {
            id: 7,
            actor_id: Some("u1".to_string()),
            action,
            entity_type: "blog.post".to_string(),
            entity_id: "p1".to_string(),
            before_values: before,
            after_values: after,
            client_address: None,
            client_agent: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 2), "...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_change_summary_update() {
        let before = Snapshot::new().with("title", "A").with("status", "draft");
        let after = Snapshot::new().with("title", "B").with("status", "draft");
        let summary = change_summary(&record(AuditAction::Updated, Some(before), Some(after)));
        assert_eq!(summary.as_deref(), Some("title: A -> B"));
    }

    #[test]
    fn test_change_summary_other_actions() {
        let snap = Snapshot::new().with("title", "A").with("status", "draft");
        assert_eq!(
            change_summary(&record(AuditAction::Created, None, Some(snap.clone()))).as_deref(),
            Some("2 attributes")
        );
        assert_eq!(
            change_summary(&record(AuditAction::Deleted, Some(snap), None)).as_deref(),
            Some("2 attributes")
        );
        assert!(change_summary(&record(AuditAction::Restored, None, None)).is_none());
    }

    #[test]
    fn test_format_record() {
        let mut rec = record(AuditAction::Restored, None, None);
        assert_eq!(
            format_record(&rec),
            "#7 2024-03-01T12:00:00.000000Z restored blog.post:p1 by u1"
        );

        rec.actor_id = None;
        assert!(format_record(&rec).ends_with("by system"));
    }
}

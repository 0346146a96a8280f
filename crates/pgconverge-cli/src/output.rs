//! Human-readable reports for each command.

use std::fmt::Write;

use owo_colors::OwoColorize;
use pgconverge::{QueryOutcome, RowOutcome, TableOutcome};

/// Final status word, the way configuration management tools print it.
fn status(changed: bool, check_only: bool, color: bool) -> String {
    let word = if changed { "changed" } else { "ok" };
    let word = match (color, changed) {
        (false, _) => word.to_string(),
        (true, true) => word.yellow().bold().to_string(),
        (true, false) => word.green().bold().to_string(),
    };
    if check_only {
        format!("{} (check mode)", word)
    } else {
        word
    }
}

/// Color a diff line by its leading marker.
fn paint_line(line: &str, color: bool) -> String {
    if !color {
        return line.to_string();
    }
    match line.trim_start().chars().next() {
        Some('+') => line.green().to_string(),
        Some('-') => line.red().to_string(),
        Some('~') => line.yellow().to_string(),
        _ => line.to_string(),
    }
}

pub fn table(outcome: &TableOutcome, check_only: bool, color: bool) -> String {
    let mut out = String::new();
    for line in outcome.diff.to_string().lines() {
        let _ = writeln!(out, "{}", paint_line(line, color));
    }
    if !outcome.actions_applied.is_empty() {
        let _ = writeln!(out, "applied:");
        for action in &outcome.actions_applied {
            let _ = writeln!(out, "  {}", paint_line(action, color));
        }
    }
    let _ = writeln!(out, "{}", status(outcome.changed, check_only, color));
    out
}

pub fn row(outcome: &RowOutcome, check_only: bool, color: bool) -> String {
    let mut out = String::new();
    let query = if color {
        outcome.executed_query.dimmed().to_string()
    } else {
        outcome.executed_query.clone()
    };
    let _ = writeln!(out, "query: {}", query);
    let _ = writeln!(out, "matched: {}", outcome.matched);
    if let Some(command) = &outcome.executed_command {
        let _ = writeln!(out, "command: {}", command);
    }
    let _ = writeln!(out, "{}", status(outcome.changed, check_only, color));
    out
}

pub fn query(outcome: &QueryOutcome, color: bool) -> String {
    let mut out = String::new();
    let query = if color {
        outcome.executed_query.dimmed().to_string()
    } else {
        outcome.executed_query.clone()
    };
    let _ = writeln!(out, "query: {}", query);
    for (i, row) in outcome.rows.iter().enumerate() {
        let _ = writeln!(out, "row {}:", i + 1);
        for (column, value) in row {
            let _ = writeln!(out, "  {} = {}", column, value);
        }
    }
    let verb = if outcome.rows.is_empty() { "affected" } else { "returned" };
    let suffix = if outcome.committed { "" } else { ", rolled back" };
    let _ = writeln!(out, "{} row(s) {}{}", outcome.row_count, verb, suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgconverge::{DesiredColumn, DesiredTable, SchemaDiff, Value};

    #[test]
    fn test_table_report() {
        let desired = DesiredTable::new("app_config")
            .column(DesiredColumn::new("key", "text").not_null())
            .primary_key(["key"]);
        let outcome = TableOutcome {
            changed: true,
            diff: SchemaDiff::compute(&desired, None),
            actions_applied: vec!["+ table".into(), "+ key: text".into()],
        };
        insta::assert_snapshot!(table(&outcome, false, false), @r"
        public.app_config:
          + table
          + key
          + PRIMARY KEY (key)
        applied:
          + table
          + key: text
        changed
        ");
    }

    #[test]
    fn test_row_report_in_check_mode() {
        let outcome = RowOutcome {
            changed: true,
            executed_query: "SELECT COUNT(*) FROM \"public\".\"t\" WHERE \"k\" = 'v'".into(),
            executed_command: None,
            matched: 0,
        };
        insta::assert_snapshot!(row(&outcome, true, false), @r#"
        query: SELECT COUNT(*) FROM "public"."t" WHERE "k" = 'v'
        matched: 0
        changed (check mode)
        "#);
    }

    #[test]
    fn test_query_report() {
        let outcome = QueryOutcome {
            executed_query: "SELECT 1 AS n, NULL AS z".into(),
            rows: vec![vec![
                ("n".to_string(), Value::I32(1)),
                ("z".to_string(), Value::Null),
            ]],
            row_count: 1,
            committed: false,
        };
        insta::assert_snapshot!(query(&outcome, false), @r"
        query: SELECT 1 AS n, NULL AS z
        row 1:
          n = 1
          z = NULL
        1 row(s) returned, rolled back
        ");
    }

    #[test]
    fn test_paint_keeps_text() {
        assert_eq!(paint_line("  + key", false), "  + key");
        assert!(paint_line("  - key", true).contains("- key"));
    }
}

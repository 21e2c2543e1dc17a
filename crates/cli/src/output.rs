//! Pass report rendering: a table for terminals, JSON for scripts.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

use ldapsync_core::accounts::target_attrs;
use ldapsync_core::directory::{Modification, WriteRecord};
use ldapsync_core::report::{PassReport, PassSummary};

use crate::style;

/// Stands in for password values in printed writes.
const REDACTED: &str = "<redacted>";

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a PassReport,
    summary: PassSummary,
    /// Writes a dry run recorded instead of sending, passwords redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_writes: Option<Vec<WriteRecord>>,
}

/// Print the outcome of a pass. `planned` is set for dry runs.
pub fn print_report(report: &PassReport, planned: Option<&[WriteRecord]>, json: bool) -> Result<()> {
    if json {
        println!("{}", render_json(report, planned)?);
    } else {
        print_table(report, planned);
    }
    Ok(())
}

fn render_json(report: &PassReport, planned: Option<&[WriteRecord]>) -> Result<String> {
    let output = JsonReport {
        report,
        summary: report.summary(),
        planned_writes: planned.map(|writes| writes.iter().map(redact).collect()),
    };
    serde_json::to_string_pretty(&output).context("failed to serialize pass report")
}

/// Copy of `write` with every password value replaced.
fn redact(write: &WriteRecord) -> WriteRecord {
    let mut write = write.clone();
    match &mut write {
        WriteRecord::Add { attributes, .. } => {
            for (name, values) in attributes.iter_mut() {
                if is_password(name) {
                    redact_values(values);
                }
            }
        }
        WriteRecord::Modify { modifications, .. } => {
            for modification in modifications.iter_mut() {
                match modification {
                    Modification::Add { attr, values } | Modification::Replace { attr, values }
                        if is_password(attr) =>
                    {
                        redact_values(values)
                    }
                    _ => {}
                }
            }
        }
    }
    write
}

fn is_password(attr: &str) -> bool {
    attr.eq_ignore_ascii_case(target_attrs::PASSWORD)
}

fn redact_values(values: &mut [String]) {
    for value in values {
        *value = REDACTED.into();
    }
}

fn print_table(report: &PassReport, planned: Option<&[WriteRecord]>) {
    let title = if planned.is_some() {
        "Reconciliation Pass (dry run)"
    } else {
        "Reconciliation Pass"
    };
    println!();
    println!("{}", style::header(title));
    println!();

    if report.accounts.is_empty() {
        println!("No source accounts processed.");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Account", "Status", "Detail"]);

        for row in &report.accounts {
            table.add_row(vec![
                Cell::new(&row.account),
                style::status_cell(&row.outcome),
                Cell::new(row.outcome.detail()),
            ]);
        }
        println!("{table}");
    }

    let summary = report.summary();
    println!();
    println!("  Source accounts : {}", report.source_accounts);
    println!("  Target accounts : {}", report.target_accounts);
    println!(
        "  Created {}  Updated {}  Unchanged {}  Skipped {}  Failed {}",
        summary.created, summary.updated, summary.unchanged, summary.skipped, summary.failed
    );
    if let Some(planned) = planned {
        println!(
            "  {}",
            style::dim(&format!("{} write(s) recorded, none sent", planned.len()))
        );
    }
    println!();

    if report.cancelled {
        println!("{}", style::warn("Pass stopped early on shutdown request"));
    }
    if summary.failed > 0 {
        println!(
            "{}",
            style::error(&format!("{} account(s) failed, see the log for details", summary.failed))
        );
    } else if !report.cancelled {
        println!("{}", style::success("Pass completed"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapsync_core::report::{AccountOutcome, SkipReason};

    fn sample_report() -> PassReport {
        let mut report = PassReport::start();
        report.source_accounts = 2;
        report.target_accounts = 1;
        report.push(
            "alice",
            AccountOutcome::Created {
                dn: "uid=alice,ou=people,dc=example,dc=com".into(),
                uid_number: 10,
            },
        );
        report.push("carol", AccountOutcome::Skipped(SkipReason::Excluded));
        report.finish();
        report
    }

    #[test]
    fn test_json_includes_accounts_and_summary() {
        let json = render_json(&sample_report(), None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["source_accounts"], 2);
        assert_eq!(value["summary"]["created"], 1);
        assert_eq!(value["summary"]["skipped"], 1);
        assert_eq!(value["accounts"][0]["account"], "alice");
        assert_eq!(value["accounts"][0]["outcome"]["status"], "created");
        assert_eq!(value["accounts"][1]["outcome"]["detail"], "excluded");
        assert!(value.get("planned_writes").is_none());
    }

    #[test]
    fn test_json_lists_planned_writes_for_dry_run() {
        let planned = vec![WriteRecord::Add {
            dn: "uid=alice,ou=people,dc=example,dc=com".into(),
            attributes: Default::default(),
        }];
        let json = render_json(&sample_report(), Some(&planned)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["planned_writes"][0]["kind"], "add");
        assert_eq!(
            value["planned_writes"][0]["dn"],
            "uid=alice,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_planned_writes_hide_password_values() {
        let hash = "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=";
        let mut attributes = ldapsync_core::directory::AttributeMap::new();
        attributes.insert("uid".into(), vec!["alice".into()]);
        attributes.insert("userPassword".into(), vec![hash.into()]);
        let planned = vec![
            WriteRecord::Add {
                dn: "uid=alice,ou=people,dc=example,dc=com".into(),
                attributes,
            },
            WriteRecord::Modify {
                dn: "uid=bob,ou=people,dc=example,dc=com".into(),
                modifications: vec![
                    Modification::Replace {
                        attr: "userPassword".into(),
                        values: vec![hash.into()],
                    },
                    Modification::Replace {
                        attr: "sambaPwdLastSet".into(),
                        values: vec!["1003".into()],
                    },
                ],
            },
        ];

        let json = render_json(&sample_report(), Some(&planned)).unwrap();
        assert!(!json.contains(hash));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let add = &value["planned_writes"][0]["attributes"];
        assert_eq!(add["userPassword"][0], REDACTED);
        assert_eq!(add["uid"][0], "alice");
        let mods = &value["planned_writes"][1]["modifications"];
        assert_eq!(mods[0]["values"][0], REDACTED);
        assert_eq!(mods[1]["values"][0], "1003");
    }
}

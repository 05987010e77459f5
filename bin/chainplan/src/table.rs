//! Terminal tables for plans and ledgers.

use chainplan_deploy::{ContractSpec, Ledger, LedgerEntry, RunReport};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// The recorded contracts, with the outcome of `report` when given.
pub fn ledger_table(ledger: &Ledger, report: Option<&RunReport>) -> Table {
    let mut header = vec!["#", "Contract", "Mode", "Address", "Implementation", "Admin"];
    if report.is_some() {
        header.push("This run");
    }
    let mut table = new_table(header);

    for entry in ledger.entries() {
        let mut row = entry_row(entry);
        if let Some(report) = report {
            let outcome = if report.deployed.contains(&entry.name) {
                "deployed"
            } else if report.skipped.contains(&entry.name) {
                "skipped"
            } else {
                "-"
            };
            row.push(outcome.to_string());
        }
        table.add_row(row);
    }
    table
}

fn entry_row(entry: &LedgerEntry) -> Vec<String> {
    vec![
        entry.sequence.to_string(),
        entry.name.clone(),
        entry.mode.to_string(),
        entry.address.to_string(),
        optional(entry.implementation),
        optional(entry.admin),
    ]
}

/// The resolved order of a plan, with the status of each step in `ledger`.
pub fn plan_table(order: &[&ContractSpec], ledger: &Ledger) -> Table {
    let mut table = new_table(vec!["Step", "Contract", "Mode", "Depends on", "Status"]);

    for (step, spec) in order.iter().enumerate() {
        let status = match ledger.entry(&spec.name) {
            Some(entry) if entry.fingerprint != spec.fingerprint() => {
                format!("deployed at {} (plan entry changed)", entry.address)
            }
            Some(entry) => format!("deployed at {}", entry.address),
            None => "pending".to_string(),
        };
        let depends_on = spec.depends_on();

        table.add_row(vec![
            (step + 1).to_string(),
            spec.name.clone(),
            spec.mode.to_string(),
            if depends_on.is_empty() {
                "-".to_string()
            } else {
                depends_on.join(", ")
            },
            status,
        ]);
    }
    table
}

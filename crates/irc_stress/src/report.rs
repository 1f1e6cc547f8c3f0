use crate::runner::RunSummary;

/// Renders rows as a boxed two-column table.
pub fn render_table(rows: &[(&str, String)]) -> String {
    let left = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let right = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let border = format!("+{}+{}+\n", "-".repeat(left + 2), "-".repeat(right + 2));

    let mut table = border.clone();
    for (key, value) in rows {
        table.push_str(&format!("| {key:<left$} | {value:>right$} |\n"));
    }
    table.push_str(&border);
    table
}

pub fn summary_rows(summary: &RunSummary) -> Vec<(&'static str, String)> {
    vec![
        ("Total Clients", summary.total.to_string()),
        ("Successful Clients", summary.succeeded.to_string()),
        ("Unclean Disconnects", summary.unclean.to_string()),
        ("Failed Clients", summary.failed.to_string()),
    ]
}

pub fn print_summary(summary: &RunSummary) {
    println!("{}", summary.server);
    print!("{}", render_table(&summary_rows(summary)));
}

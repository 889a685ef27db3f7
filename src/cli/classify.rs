use comfy_table::{Cell, Table};

use crate::division::{classify_with_rule, extract_job_number, Rule};
use crate::error::Result;

pub fn run(jobs: &[String]) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Input", "Job", "Division", "Rule"]);
    for raw in jobs {
        let job = extract_job_number(raw);
        let (division, rule) = classify_with_rule(&job);
        let rule = match rule {
            Rule::Prefix(p) => format!("prefix {p}"),
            Rule::Contains(s) => format!("contains {s}"),
            Rule::Default => "default (no rule matched)".to_string(),
        };
        table.add_row(vec![
            Cell::new(raw),
            Cell::new(&job),
            Cell::new(division.code()),
            Cell::new(rule),
        ]);
    }
    println!("{table}");
    Ok(())
}

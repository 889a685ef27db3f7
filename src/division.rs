use std::sync::OnceLock;

use regex::Regex;

use crate::models::Division;

/// Cost code written for legacy jobs whose rows carry none.
pub const COST_CODE_NEEDED: &str = "CC NEEDED";

/// Which classification rule matched a job number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Prefix(&'static str),
    Contains(&'static str),
    /// Nothing matched; the job was assigned to DFW.
    Default,
}

// Order matters: "2024-H..." is DFW because the year prefix is checked first.
const PREFIX_RULES: &[(&str, Division)] = &[
    ("2024-", Division::Dfw),
    ("2023", Division::Dfw),
    ("D", Division::Dfw),
    ("H", Division::Hou),
    ("WTX", Division::Wt),
    ("WT-", Division::Wt),
    ("W", Division::Wt),
];

const CONTAINS_RULES: &[(&str, Division)] = &[("-H", Division::Hou)];

pub fn classify(job_number: &str) -> Division {
    classify_with_rule(job_number).0
}

/// Classification is total: every input maps to a division. Unmatched job
/// numbers fall back to DFW, which can misattribute revenue.
pub fn classify_with_rule(job_number: &str) -> (Division, Rule) {
    let job = job_number.trim().to_ascii_uppercase();
    for (prefix, division) in PREFIX_RULES {
        if job.starts_with(prefix) {
            return (*division, Rule::Prefix(prefix));
        }
    }
    for (needle, division) in CONTAINS_RULES {
        if job.contains(needle) {
            return (*division, Rule::Contains(needle));
        }
    }
    tracing::debug!(job = %job_number, "no division rule matched, defaulting to DFW");
    (Division::Dfw, Rule::Default)
}

fn job_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z]{0,3}-?\d{2,4}(?:-[A-Za-z]?\d+)*)").expect("valid job regex")
    })
}

/// Leading job token of a cell such as `"2023-045 Hwy 121 Widening"`.
/// Falls back to the trimmed cell when no token is recognized.
pub fn extract_job_number(raw: &str) -> String {
    match job_token_re().captures(raw) {
        Some(caps) => caps[1].to_ascii_uppercase(),
        None => raw.trim().to_string(),
    }
}

pub fn resolve_cost_code(raw: &str) -> String {
    let code = raw.trim();
    if code.is_empty() {
        COST_CODE_NEEDED.to_string()
    } else {
        code.to_string()
    }
}

use std::collections::HashMap;

use crate::models::{round2, BillingRecord, ChangeLogEntry, Division, DivisionTotal, RevisionEntry};

/// Default tolerance for amount comparisons, in dollars.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Unit differences below this are the same allocation.
const UNITS_EPSILON: f64 = 1e-9;

/// A source amount that disagreed with units × rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub equipment_id: String,
    pub job_number: String,
    pub source: String,
    pub source_amount: f64,
    pub calculated: f64,
}

impl Divergence {
    pub fn difference(&self) -> f64 {
        self.calculated - self.source_amount
    }
}

#[derive(Debug, Default)]
pub struct RevisionOutcome {
    pub changes: Vec<ChangeLogEntry>,
    /// Revisions that matched no billing record.
    pub unmatched: Vec<RevisionEntry>,
}

impl RevisionOutcome {
    pub fn delta(&self) -> f64 {
        self.changes.iter().map(|c| c.delta()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalCheck {
    pub expected: f64,
    pub actual: f64,
    pub difference: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    pub tolerance: f64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Reconciler {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Set `amount` from units × rate. A source amount further than the
    /// tolerance from the calculated value is reported and overridden; without
    /// a rate the source amount stands.
    pub fn reconcile_record(&self, record: &mut BillingRecord) -> Option<Divergence> {
        let Some(rate) = record.rate else {
            record.amount = round2(record.source_amount.unwrap_or(0.0));
            return None;
        };
        let calculated = round2(record.units * rate);
        record.amount = calculated;

        let original = record.source_amount?;
        if (calculated - original).abs() > self.tolerance {
            tracing::warn!(
                equipment = %record.equipment_id,
                job = %record.job_number,
                source = %record.source,
                original,
                calculated,
                "amount diverges from units x rate, using calculated"
            );
            return Some(Divergence {
                equipment_id: record.equipment_id.clone(),
                job_number: record.job_number.clone(),
                source: record.source.clone(),
                source_amount: original,
                calculated,
            });
        }
        None
    }

    pub fn reconcile_all(&self, records: &mut [BillingRecord]) -> Vec<Divergence> {
        records
            .iter_mut()
            .filter_map(|r| self.reconcile_record(r))
            .collect()
    }

    /// Overwrite units on every record matching a revision's equipment and
    /// job, recomputing the amount. Each record takes at most one revision.
    /// A revision that repeats the current units counts as matched but is
    /// left out of the change log.
    pub fn apply_revisions(
        &self,
        records: &mut [BillingRecord],
        revisions: &[RevisionEntry],
    ) -> RevisionOutcome {
        let mut by_key: HashMap<(&str, &str), usize> = HashMap::new();
        for (i, rev) in revisions.iter().enumerate() {
            by_key
                .entry((rev.equipment_id.as_str(), rev.job_number.as_str()))
                .or_insert(i);
        }

        let mut matched = vec![false; revisions.len()];
        let mut outcome = RevisionOutcome::default();
        for record in records.iter_mut() {
            let Some(&idx) = by_key.get(&record.key()) else {
                continue;
            };
            matched[idx] = true;
            let rev = &revisions[idx];
            if (rev.new_units - record.units).abs() < UNITS_EPSILON {
                continue;
            }
            let old_units = record.units;
            let old_amount = record.amount;

            record.units = rev.new_units;
            if let Some(rate) = record.rate {
                record.amount = round2(record.units * rate);
            } else if old_units != 0.0 {
                // Amount-only rows scale by the implied rate.
                record.amount = round2(old_amount / old_units * record.units);
            }

            outcome.changes.push(ChangeLogEntry {
                equipment_id: record.equipment_id.clone(),
                job_number: record.job_number.clone(),
                division: record.division,
                old_units,
                new_units: record.units,
                old_amount,
                new_amount: record.amount,
                source: rev.source.clone(),
            });
        }

        outcome.unmatched = revisions
            .iter()
            .zip(&matched)
            .filter(|(_, m)| !**m)
            .map(|(r, _)| r.clone())
            .collect();
        for rev in &outcome.unmatched {
            tracing::warn!(
                equipment = %rev.equipment_id,
                job = %rev.job_number,
                source = %rev.source,
                "revision matched no billing record"
            );
        }
        outcome
    }

    pub fn check_total(&self, expected: f64, actual: f64) -> TotalCheck {
        let difference = round2(actual - expected);
        TotalCheck {
            expected,
            actual,
            difference,
            passed: (actual - expected).abs() <= self.tolerance,
        }
    }
}

/// Totals per division in `Division::ALL` order; every division is present.
pub fn division_totals(records: &[BillingRecord]) -> Vec<DivisionTotal> {
    Division::ALL
        .iter()
        .map(|&division| {
            let (amount, count) = records
                .iter()
                .filter(|r| r.division == division)
                .fold((0.0, 0usize), |(sum, n), r| (sum + r.amount, n + 1));
            DivisionTotal {
                division,
                amount: round2(amount),
                records: count,
            }
        })
        .collect()
}

pub fn grand_total(records: &[BillingRecord]) -> f64 {
    round2(records.iter().map(|r| r.amount).sum())
}

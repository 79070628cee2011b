use crate::config::{Condition, Operation};
use crate::record::{Record, RecordBatch};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Applies every operation to the batch, in declared order
///
/// Order matters: deduplicate-then-sort is not the same pipeline as
/// sort-then-deduplicate, and no reordering happens here.
pub fn process(batch: RecordBatch, operations: &[Operation]) -> RecordBatch {
    let mut records = batch;

    for operation in operations {
        let before = records.len();
        records = apply(records, operation);
        debug!(
            ?operation,
            before,
            after = records.len(),
            "applied operation"
        );
    }

    records
}

fn apply(records: RecordBatch, operation: &Operation) -> RecordBatch {
    match operation {
        Operation::Filter {
            column,
            condition,
            value,
        } => apply_filter(records, column, *condition, value),
        Operation::Deduplicate { columns } => apply_deduplicate(records, columns),
        Operation::Sort { column, ascending } => apply_sort(records, column, *ascending),
    }
}

/// Keeps records whose column satisfies the condition
///
/// A record missing the column is excluded under every condition,
/// `not-contains` included: a filter only passes records it could
/// actually test.
fn apply_filter(
    records: RecordBatch,
    column: &str,
    condition: Condition,
    value: &str,
) -> RecordBatch {
    records
        .into_iter()
        .filter(|record| match record.text(column) {
            Some(actual) => matches_condition(&actual, condition, value),
            None => false,
        })
        .collect()
}

fn matches_condition(actual: &str, condition: Condition, value: &str) -> bool {
    match condition {
        Condition::Equals => actual == value,
        Condition::Contains => actual.contains(value),
        Condition::NotContains => !actual.contains(value),
        Condition::GreaterThan => compare_values(actual, value) == Ordering::Greater,
        Condition::LessThan => compare_values(actual, value) == Ordering::Less,
    }
}

/// Keeps the first-seen record per distinct key
///
/// The key is the tuple of the named columns' values, where an absent
/// column is its own marker distinct from an empty string. An empty
/// column list keys on every field of the record.
fn apply_deduplicate(records: RecordBatch, columns: &[String]) -> RecordBatch {
    let mut seen: HashSet<Vec<(String, Option<String>)>> = HashSet::new();

    records
        .into_iter()
        .filter(|record| seen.insert(dedup_key(record, columns)))
        .collect()
}

fn dedup_key(record: &Record, columns: &[String]) -> Vec<(String, Option<String>)> {
    if columns.is_empty() {
        record
            .iter()
            .map(|(name, value)| (name.clone(), Some(value.as_text())))
            .collect()
    } else {
        columns
            .iter()
            .map(|column| (column.clone(), record.text(column)))
            .collect()
    }
}

/// Stable sort by one column
///
/// Records missing the column sort after all present values in either
/// direction; `ascending` never promotes them.
fn apply_sort(mut records: RecordBatch, column: &str, ascending: bool) -> RecordBatch {
    records.sort_by(|a, b| match (a.text(column), b.text(column)) {
        (Some(left), Some(right)) => {
            let ordering = compare_values(&left, &right);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    records
}

/// Numeric comparison when both sides parse as numbers, lexicographic
/// otherwise
fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

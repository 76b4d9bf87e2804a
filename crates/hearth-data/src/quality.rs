//! Data-quality signals over a raw table.

use std::collections::{BTreeMap, HashSet};

use crate::table::{is_missing, Table};

/// Missing-cell count per column, omitting columns with none.
pub fn missing_value_counts(table: &Table) -> BTreeMap<String, usize> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let count = table.column_values(i).filter(|c| is_missing(c)).count();
            (count > 0).then(|| (name.clone(), count))
        })
        .collect()
}

/// Number of rows identical to an earlier row. Missing cells compare equal to
/// each other regardless of which NA token spelled them.
pub fn duplicate_row_count(table: &Table) -> usize {
    let mut seen: HashSet<Vec<Option<&str>>> = HashSet::with_capacity(table.row_count());
    let mut duplicates = 0;
    for row in table.rows() {
        let key: Vec<Option<&str>> = row
            .iter()
            .map(|c| if is_missing(c) { None } else { Some(c.as_str()) })
            .collect();
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    duplicates
}

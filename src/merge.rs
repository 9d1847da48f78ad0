use crate::table::{CapacityExceeded, StationTable};

/// Folds every entry of `source` into `target`.
pub fn merge_into(
    target: &mut StationTable,
    source: &StationTable,
) -> Result<(), CapacityExceeded> {
    for (key, stats) in source.iter() {
        // Keys taken from a table always fit a slot.
        target.locate(key)?.merge(stats);
    }
    Ok(())
}

/// Merges all tables into the first one. `None` when there are no tables.
pub fn merge_all(
    tables: impl IntoIterator<Item = StationTable>,
) -> Result<Option<StationTable>, CapacityExceeded> {
    let mut tables = tables.into_iter();
    let Some(mut merged) = tables.next() else {
        return Ok(None);
    };
    for table in tables {
        merge_into(&mut merged, &table)?;
    }
    Ok(Some(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::parse::Scaled;
    use crate::table::StationStats;

    fn table(records: &[(&str, Scaled)]) -> StationTable {
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Grow);
        for &(key, value) in records {
            table.record(key.as_bytes(), value).unwrap();
        }
        table
    }

    fn snapshot(table: &StationTable) -> Vec<(Vec<u8>, StationStats)> {
        let mut entries: Vec<_> = table.iter().map(|(k, s)| (k.to_vec(), *s)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    #[test]
    fn combines_counts_sums_and_extrema() {
        let merged = merge_all([
            table(&[("A", 100), ("B", -55)]),
            table(&[("A", 200), ("C", 0)]),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            merged.get(b"A"),
            Some(&StationStats {
                count: 2,
                sum: 300,
                min: 100,
                max: 200
            })
        );
        assert_eq!(merged.get(b"B").unwrap().count, 1);
        assert_eq!(merged.get(b"C").unwrap().count, 1);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_order_does_not_matter() {
        let a: &[(&str, Scaled)] = &[("x", 10), ("y", -999), ("shared-prefix-1", 5)];
        let b: &[(&str, Scaled)] = &[("x", 999), ("z", 3), ("shared-prefix-2", 7)];
        let c: &[(&str, Scaled)] = &[("y", 999), ("x", -1), ("shared-prefix-1", -5)];

        let abc = merge_all([table(a), table(b), table(c)]).unwrap().unwrap();
        let cba = merge_all([table(c), table(b), table(a)]).unwrap().unwrap();
        let bac = merge_all([table(b), table(a), table(c)]).unwrap().unwrap();

        let mut ab = table(a);
        merge_into(&mut ab, &table(b)).unwrap();
        let mut ca = table(c);
        merge_into(&mut ca, &ab).unwrap();

        assert_eq!(snapshot(&abc), snapshot(&cba));
        assert_eq!(snapshot(&abc), snapshot(&bac));
        assert_eq!(snapshot(&abc), snapshot(&ca));
    }

    #[test]
    fn merging_into_full_table_fails_cleanly() {
        let mut target = StationTable::with_capacity(2, OverflowPolicy::Fail);
        target.record(b"a", 1).unwrap();
        target.record(b"b", 1).unwrap();
        let source = table(&[("c", 1)]);
        assert_eq!(
            merge_into(&mut target, &source),
            Err(CapacityExceeded { capacity: 2 })
        );
    }

    #[test]
    fn no_tables_merge_to_none() {
        assert!(merge_all(Vec::<StationTable>::new()).unwrap().is_none());
    }
}

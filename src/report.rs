use std::io::{self, Write};

use itertools::Itertools;

use crate::parse::Scaled;
use crate::table::{StationStats, StationTable};

/// One key's final figures, as handed to the output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationSummary<'a> {
    pub key: &'a [u8],
    pub stats: StationStats,
}

/// Entries of `table` holding at least one value, in ascending byte order
/// of their keys.
pub fn summaries(table: &StationTable) -> Vec<StationSummary<'_>> {
    table
        .iter()
        .filter(|(_, stats)| stats.count > 0)
        .map(|(key, stats)| StationSummary { key, stats: *stats })
        .sorted_unstable_by(|a, b| a.key.cmp(b.key))
        .collect()
}

/// Writes `{key=mean/max/min, ...}`, every entry followed by `, `.
pub fn write_report(writer: &mut impl Write, table: &StationTable) -> io::Result<()> {
    writer.write_all(b"{")?;
    for summary in summaries(table) {
        push_summary(writer, &summary)?;
        writer.write_all(b", ")?;
    }
    writer.write_all(b"}")?;
    Ok(())
}

/// [`write_report`] into a string; keys are decoded lossily.
pub fn render(table: &StationTable) -> String {
    let mut out = Vec::<u8>::with_capacity(table.len() * 32 + 2);
    write_report(&mut out, table).expect("writing to a Vec cannot fail");
    String::from_utf8_lossy(&out).into_owned()
}

fn push_summary(writer: &mut impl Write, summary: &StationSummary<'_>) -> io::Result<()> {
    writer.write_all(summary.key)?;
    writer.write_all(b"=")?;
    push_mean(writer, summary.stats.mean())?;
    writer.write_all(b"/")?;
    push_scaled(writer, summary.stats.max)?;
    writer.write_all(b"/")?;
    push_scaled(writer, summary.stats.min)?;
    Ok(())
}

fn push_mean(writer: &mut impl Write, mean: f64) -> io::Result<()> {
    let rendered = format!("{mean:.1}");
    if rendered == "-0.0" {
        writer.write_all(b"0.0")
    } else {
        writer.write_all(rendered.as_bytes())
    }
}

fn push_scaled(writer: &mut impl Write, value: Scaled) -> io::Result<()> {
    let value = i32::from(value);
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    write!(writer, "{sign}{}.{}", magnitude / 10, magnitude % 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;

    fn table(records: &[(&str, Scaled)]) -> StationTable {
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Grow);
        for &(key, value) in records {
            table.record(key.as_bytes(), value).unwrap();
        }
        table
    }

    #[test]
    fn renders_mean_max_min_in_key_order() {
        let table = table(&[("B", -55), ("A", 100), ("A", 200)]);
        assert_eq!(render(&table), "{A=15.0/20.0/10.0, B=-5.5/-5.5/-5.5, }");
    }

    #[test]
    fn empty_table_renders_braces() {
        assert_eq!(render(&table(&[])), "{}");
    }

    #[test]
    fn scaled_values_render_exactly() {
        for (value, expected) in [
            (0, "0.0"),
            (5, "0.5"),
            (-5, "-0.5"),
            (99, "9.9"),
            (100, "10.0"),
            (-999, "-99.9"),
            (999, "99.9"),
            (1234, "123.4"),
            (Scaled::MAX, "3276.7"),
            (Scaled::MIN, "-3276.8"),
        ] {
            let mut out = Vec::<u8>::new();
            push_scaled(&mut out, value).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), expected, "value: {value}");
        }
    }

    #[test]
    fn negative_zero_mean_is_normalised() {
        let table = table(&[("z", -1), ("z", 0), ("z", 0)]);
        assert_eq!(render(&table), "{z=0.0/0.0/-0.1, }");
    }

    #[test]
    fn entries_without_values_are_not_reported() {
        let mut table = table(&[("kept", 10)]);
        table.get_or_create(b"untouched").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(render(&table), "{kept=1.0/1.0/1.0, }");
    }

    #[test]
    fn summaries_sort_by_bytes() {
        let table = table(&[("b", 1), ("Z", 1), ("a", 1), ("aa", 1)]);
        let keys: Vec<_> = summaries(&table).iter().map(|s| s.key.to_vec()).collect();
        assert_eq!(keys, [b"Z".to_vec(), b"a".to_vec(), b"aa".to_vec(), b"b".to_vec()]);
    }
}

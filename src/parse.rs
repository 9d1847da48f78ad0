use crate::error::{GrammarViolation, ViolationKind};

/// Key/value separator.
pub const SEPARATOR: u8 = b';';

/// A one-fractional-digit decimal stored as ten times its value.
pub type Scaled = i16;

/// Splits `<key>;<value>` into the key and its scaled value.
///
/// The value is `-?d{1,2}.d`, so the separator can only sit 4, 5 or 6 bytes
/// before the end of the record; those are the only positions checked.
/// `offset` is the record's byte offset in the input and is only used to
/// describe a violation.
#[inline]
pub fn parse_record(record: &[u8], offset: u64) -> Result<(&[u8], Scaled), GrammarViolation> {
    let violation = |kind| GrammarViolation::new(offset, kind, record);

    let len = record.len();
    let sep = [4, 5, 6]
        .into_iter()
        .filter(|&back| back <= len)
        .map(|back| len - back)
        .find(|&at| record[at] == SEPARATOR)
        .ok_or_else(|| violation(ViolationKind::MissingSeparator))?;

    let (key, value) = (&record[..sep], &record[sep + 1..]);
    let value = parse_value(value).ok_or_else(|| violation(ViolationKind::BadDigit))?;
    if key.is_empty() {
        return Err(violation(ViolationKind::EmptyKey));
    }
    Ok((key, value))
}

/// Decodes `-?d{1,2}.d` without going through floating point.
#[inline]
pub fn parse_value(value: &[u8]) -> Option<Scaled> {
    let (is_negative, tens, ones, tenths) = match *value {
        [b'-', tens, ones, b'.', tenths] => (true, tens, ones, tenths),
        [b'-', ones, b'.', tenths] => (true, b'0', ones, tenths),
        [tens, ones, b'.', tenths] => (false, tens, ones, tenths),
        [ones, b'.', tenths] => (false, b'0', ones, tenths),
        _ => return None,
    };
    if !(tens.is_ascii_digit() && ones.is_ascii_digit() && tenths.is_ascii_digit()) {
        return None;
    }
    let digit = |b: u8| Scaled::from(b - b'0');
    let magnitude = digit(tens) * 100 + digit(ones) * 10 + digit(tenths);
    Some(if is_negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_value_shape() {
        for (input, exp_key, exp_value) in [
            ("city;12.3", b"city" as &[u8], 123),
            ("c;-1.0", b"c", -10),
            ("ci;-10.2", b"ci", -102),
            ("cit;9.9", b"cit", 99),
            ("A;10.0", b"A", 100),
            ("B;-5.5", b"B", -55),
            ("zero;-0.0", b"zero", 0),
            ("St. John's;0.1", b"St. John's", 1),
        ] {
            let (key, value) = match parse_record(input.as_bytes(), 0) {
                Ok(parsed) => parsed,
                Err(e) => panic!("unexpected error for `{input}`: {e}"),
            };
            assert_eq!(key, exp_key, "input: `{input}`");
            assert_eq!(value, exp_value, "input: `{input}`");
        }
    }

    #[test]
    fn extremes_are_exact() {
        assert_eq!(parse_record(b"lo;-99.9", 0).unwrap().1, -999);
        assert_eq!(parse_record(b"hi;99.9", 0).unwrap().1, 999);
    }

    #[test]
    fn rejects_malformed_records() {
        for (input, kind) in [
            ("", ViolationKind::MissingSeparator),
            ("nosep", ViolationKind::MissingSeparator),
            ("a;1", ViolationKind::MissingSeparator),
            ("a;123.4", ViolationKind::BadDigit),
            ("a;1.23", ViolationKind::BadDigit),
            ("a;123", ViolationKind::BadDigit),
            ("a;x.5", ViolationKind::BadDigit),
            ("a;+1.5", ViolationKind::BadDigit),
            ("a;--1.5", ViolationKind::BadDigit),
            ("a;1.5\r", ViolationKind::BadDigit),
            (";1.0", ViolationKind::EmptyKey),
            (";-12.5", ViolationKind::EmptyKey),
        ] {
            match parse_record(input.as_bytes(), 77) {
                Err(violation) => {
                    assert_eq!(violation.kind, kind, "input: `{input}`");
                    assert_eq!(violation.offset, 77);
                }
                Ok(parsed) => panic!("accepted `{input}` as {parsed:?}"),
            }
        }
    }

    #[test]
    fn value_parser_matches_float_rendering() {
        for tenths in -999_i16..=999 {
            let rendered = format!("{:.1}", f64::from(tenths) / 10.0);
            assert_eq!(parse_value(rendered.as_bytes()), Some(tenths), "{rendered}");
        }
    }
}

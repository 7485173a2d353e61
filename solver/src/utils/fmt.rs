//! Round-trippable formatting of floating point values.
//!
//! Everything logged or serialized as a double goes through
//! [`format_double`], which emits the shortest decimal representation that
//! parses back to the exact same value (the guarantee of the standard
//! `Display` implementation), so that logs can be re-read losslessly.

/// Formats a double so that `parse_double(format_double(x))` is exactly `x`.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value}")
    }
}

/// Parses a double formatted by [`format_double`].
pub fn parse_double(input: &str) -> Option<f64> {
    match input {
        "nan" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => input.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrips(x: f64) {
        let printed = format_double(x);
        let reparsed = parse_double(&printed).unwrap();
        assert_eq!(reparsed.to_bits(), x.to_bits(), "{x} printed as {printed}");
    }

    #[test]
    fn finite_values_roundtrip() {
        for x in [
            0.0,
            -0.0,
            1.0,
            -1.5,
            0.1,
            1.0 / 3.0,
            f64::MIN,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::EPSILON,
            2.2250738585072014e-308,
            9007199254740993.0,
        ] {
            roundtrips(x);
        }
    }

    #[test]
    fn special_values() {
        assert!(parse_double(&format_double(f64::NAN)).unwrap().is_nan());
        roundtrips(f64::INFINITY);
        roundtrips(f64::NEG_INFINITY);
    }

    #[test]
    fn shortest_representation() {
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(-2.5), "-2.5");
    }
}

use tracing::debug;

/// Parse tier-list rating text such as `T1.5`, `0` or `N/A`.
///
/// The leading tier marker `T` is dropped. Empty, `N/A`, non-numeric and
/// non-finite values all come back as `None`.
pub fn parse_rating(text: &str) -> Option<f64> {
    let upper = text.trim().to_uppercase();
    let value = upper.strip_prefix('T').unwrap_or(&upper);

    if value.is_empty() || value == "N/A" {
        return None;
    }

    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!(rating = text, "unparseable rating");
            None
        }
    }
}

/// Mean of the known ratings, rounded to two decimals (halves to even).
pub fn average(ratings: &[Option<f64>]) -> Option<f64> {
    let mut known: Vec<f64> = ratings.iter().flatten().copied().collect();
    if known.is_empty() {
        return None;
    }
    // Summing in sorted order makes the result independent of slot order.
    known.sort_by(f64::total_cmp);
    let mean = known.iter().sum::<f64>() / known.len() as f64;
    Some(round2(mean))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tier_marker() {
        assert_eq!(parse_rating("T0"), Some(0.0));
        assert_eq!(parse_rating("T1.5"), Some(1.5));
        assert_eq!(parse_rating(" t3 "), Some(3.0));
        assert_eq!(parse_rating("2.5"), Some(2.5));
    }

    #[test]
    fn tier_prefix_is_transparent() {
        for s in ["0", "1", "1.5", "4", "0.25", "10"] {
            let expected: f64 = s.parse().unwrap();
            assert_eq!(parse_rating(s), Some(expected));
            assert_eq!(parse_rating(&format!("T{s}")), Some(expected));
        }
    }

    #[test]
    fn sentinels_and_garbage_are_unknown() {
        assert_eq!(parse_rating("N/A"), None);
        assert_eq!(parse_rating("n/a"), None);
        assert_eq!(parse_rating(""), None);
        assert_eq!(parse_rating("   "), None);
        assert_eq!(parse_rating("T"), None);
        assert_eq!(parse_rating("garbage"), None);
        assert_eq!(parse_rating("TT1"), None);
    }

    #[test]
    fn non_finite_values_are_unknown() {
        assert_eq!(parse_rating("NaN"), None);
        assert_eq!(parse_rating("inf"), None);
    }

    #[test]
    fn average_skips_missing() {
        assert_eq!(average(&[Some(3.0), Some(4.0)]), Some(3.5));
        assert_eq!(average(&[Some(3.0), None, Some(4.0)]), Some(3.5));
        assert_eq!(average(&[None, Some(1.5)]), Some(1.5));
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        assert_eq!(average(&[Some(1.0), Some(1.0), Some(2.0)]), Some(1.33));
        assert_eq!(average(&[Some(0.0), Some(1.0), Some(1.0)]), Some(0.67));
    }

    #[test]
    fn average_rounds_halves_to_even() {
        assert_eq!(average(&[Some(0.0), Some(0.25)]), Some(0.12));
        assert_eq!(average(&[Some(0.25), Some(0.5)]), Some(0.38));
        assert_eq!(average(&[Some(1.0), Some(1.25)]), Some(1.12));
    }

    #[test]
    fn average_of_nothing_is_unknown() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[None, None, None]), None);
    }

    #[test]
    fn average_ignores_order() {
        let a = [Some(0.1), Some(0.2), Some(0.7), None];
        let b = [None, Some(0.7), Some(0.1), Some(0.2)];
        let c = [Some(0.2), None, Some(0.7), Some(0.1)];
        assert_eq!(average(&a), average(&b));
        assert_eq!(average(&b), average(&c));
    }
}

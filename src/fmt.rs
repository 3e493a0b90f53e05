/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((&cents, "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

/// Short dollar amount for summary tables: $1.20M, $46.0K, $950
pub fn compact_money(val: f64) -> String {
    let sign = if val < 0.0 { "-" } else { "" };
    let abs = val.abs();
    if abs >= 1_000_000.0 {
        format!("{sign}${:.2}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{sign}${:.1}K", abs / 1_000.0)
    } else {
        format!("{sign}${abs:.0}")
    }
}

pub fn ratio(val: f64) -> String {
    format!("{val:.2}")
}

pub fn percent(val: f64) -> String {
    format!("{:.0}%", val * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(41400.0), "$41,400.00");
    }

    #[test]
    fn test_compact_money() {
        assert_eq!(compact_money(1_200_000.0), "$1.20M");
        assert_eq!(compact_money(46_000.0), "$46.0K");
        assert_eq!(compact_money(-250_000.0), "-$250.0K");
        assert_eq!(compact_money(950.0), "$950");
        assert_eq!(compact_money(0.0), "$0");
    }

    #[test]
    fn test_ratio_and_percent() {
        assert_eq!(ratio(4.5333), "4.53");
        assert_eq!(percent(0.9), "90%");
        assert_eq!(percent(0.0), "0%");
    }
}

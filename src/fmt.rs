use rust_decimal::{Decimal, RoundingStrategy};

/// Format an amount the way the portal prints it: `$1.234,56`, with the
/// decimals dropped when they are zero (`$250.000`).
pub fn money(val: Decimal) -> String {
    let negative = val.is_sign_negative() && !val.is_zero();
    let rounded = val
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let cents = format!("{rounded:.2}");
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_dots = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_dots.push('.');
        }
        with_dots.push(c);
    }
    let with_dots: String = with_dots.chars().rev().collect();
    let body = if dec_part == "00" {
        with_dots
    } else {
        format!("{with_dots},{dec_part}")
    };

    if negative {
        format!("-${body}")
    } else {
        format!("${body}")
    }
}

pub fn percent(rate: f64) -> String {
    format!("{rate:.1}%")
}

use rust_decimal::{Decimal, RoundingStrategy};

/// Formats an amount with `.` thousands separators and a `,` decimal separator,
/// always with two decimal places: `1234.5` becomes `1.234,50`.
pub fn format_price(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    let raw = rounded.abs().to_string();
    let (integer, fraction) = raw.split_once('.').unwrap_or((raw.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped},{fraction}")
}

pub fn format_money(amount: Decimal) -> String {
    format!("R$ {}", format_price(amount))
}

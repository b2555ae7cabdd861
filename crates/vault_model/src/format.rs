//! Amount parsing and display formatting, integer-only

use alloy_primitives::U256;

use crate::math::*;
use crate::reconcile::share_price_raw;

const TEN: U256 = U256::from_limbs([10, 0, 0, 0]);

/// Accept an edit to the amount field: digits and at most one `.`, at most
/// 6 fractional digits. Returns the cleaned text, or `None` to reject.
pub fn sanitize_amount_input(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let mut parts = cleaned.split('.');
    let _whole = parts.next();
    let fraction = parts.next();
    if parts.next().is_some() {
        return None;
    }
    if fraction.map_or(false, |f| f.len() > USDC_DECIMALS as usize) {
        return None;
    }
    Some(cleaned)
}

/// Parse a decimal USDC string ("1,234.5", "$10") into raw units.
///
/// Unparsable input yields zero; extra fractional digits are truncated.
pub fn parse_usdc(input: &str) -> U256 {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ',' | '$') && !c.is_whitespace())
        .collect();

    let mut parts = cleaned.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next().unwrap_or("");
    if whole.is_empty() && fraction.is_empty() {
        return U256::ZERO;
    }

    let mut value = U256::ZERO;
    for c in whole.chars() {
        match push_digit(value, c) {
            Some(v) => value = v,
            None => return U256::ZERO,
        }
    }

    let mut digits = 0;
    for c in fraction.chars() {
        if digits == USDC_DECIMALS {
            if !c.is_ascii_digit() {
                return U256::ZERO;
            }
            continue;
        }
        match push_digit(value, c) {
            Some(v) => value = v,
            None => return U256::ZERO,
        }
        digits += 1;
    }
    for _ in digits..USDC_DECIMALS {
        value = mul_u256(value, TEN);
    }
    value
}

fn push_digit(acc: U256, c: char) -> Option<U256> {
    let d = c.to_digit(10)?;
    acc.checked_mul(TEN)?.checked_add(U256::from(d))
}

fn group_thousands(whole: U256) -> String {
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// "$1,234.56" (truncated to cents)
pub fn format_usdc(amount: U256) -> String {
    let whole = amount / ONE_USDC;
    let cents = low_u64(amount % ONE_USDC) / 10_000;
    format!("${}.{:02}", group_thousands(whole), cents)
}

/// Exact plain decimal for the amount field ("1234.5", "0.000001")
pub fn format_usdc_input(amount: U256) -> String {
    let whole = amount / ONE_USDC;
    let fraction = low_u64(amount % ONE_USDC);
    if fraction == 0 {
        return whole.to_string();
    }
    let padded = format!("{:06}", fraction);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

/// "$1.0199" (four decimals, truncated)
pub fn format_share_price(total_assets: U256, total_shares: U256) -> String {
    let price = share_price_raw(total_assets, total_shares);
    let whole = price / ONE_USDC;
    let frac = low_u64(price % ONE_USDC) / 100;
    format!("${}.{:04}", group_thousands(whole), frac)
}

/// Fee in basis points as "0.50%"
pub fn format_bps(bps: u16) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// Buffer ratio in basis points as a whole percent ("20%")
pub fn format_buffer_ratio(bps: u16) -> String {
    format!("{}%", (u32::from(bps) + 50) / 100)
}

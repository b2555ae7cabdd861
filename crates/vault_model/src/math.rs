//! Saturating 256-bit arithmetic - no unwrap, no panics, no lossy casts

use alloy_primitives::U256;

/// USDC decimals on every supported chain
pub const USDC_DECIMALS: u32 = 6;

/// Vault share token decimals
pub const SHARE_DECIMALS: u32 = 18;

/// 1 USDC in raw units
pub const ONE_USDC: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

/// 10^(SHARE_DECIMALS - USDC_DECIMALS), the vault's decimals offset
pub const DECIMALS_OFFSET_SCALE: U256 = U256::from_limbs([1_000_000_000_000, 0, 0, 0]);

/// 10^SHARE_DECIMALS
pub const ONE_SHARE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis points denominator
pub const BASIS_POINTS: u16 = 10_000;

/// Add with saturation at MAX
pub fn add_u256(a: U256, b: U256) -> U256 {
    a.saturating_add(b)
}

/// Subtract with saturation at 0
pub fn sub_u256(a: U256, b: U256) -> U256 {
    a.saturating_sub(b)
}

/// Multiply with saturation at MAX
pub fn mul_u256(a: U256, b: U256) -> U256 {
    a.saturating_mul(b)
}

/// Divide (returns 0 if divisor is 0)
pub fn div_u256(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        U256::ZERO
    } else {
        a / b
    }
}

/// a * b / c, saturating the product
pub fn mul_div(a: U256, b: U256, c: U256) -> U256 {
    div_u256(mul_u256(a, b), c)
}

/// Minimum of two U256
pub fn min_u256(a: U256, b: U256) -> U256 {
    if a < b { a } else { b }
}

/// Low 64 bits of a value already known to fit
pub fn low_u64(x: U256) -> u64 {
    x.as_limbs()[0]
}

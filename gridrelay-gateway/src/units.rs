//! Conversion de montants décimaux ("12.5") en unités de base entières.

use alloy::primitives::utils::{self, ParseUnits};
use alloy::primitives::U256;

/// Décimales du jeton d'énergie : 1 kWh = 1 crédit = 10^18 unités de base
pub const ENERGY_DECIMALS: u8 = 18;
pub const GWEI_DECIMALS: u8 = 9;

/// Convertit `"1.5"` avec `decimals = 9` en `1_500_000_000` (alloy `parse_units`).
///
/// Refuse les montants signés, vides, hexadécimaux, ou avec plus de fractions que `decimals` :
/// alloy tronquerait ces fractions, ici pas d'arrondi silencieux.
pub fn parse_units(amount: &str, decimals: u8) -> Option<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount == "." || !amount.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if let Some((_, frac)) = amount.split_once('.') {
        if frac.len() > decimals as usize {
            return None;
        }
    }
    utils::parse_units(amount, decimals).ok().map(ParseUnits::get_absolute)
}

/// kWh décimaux → unités de base du jeton
pub fn kwh_to_base_units(kwh: &str) -> Option<U256> {
    parse_units(kwh, ENERGY_DECIMALS)
}

/// gwei décimaux → wei, pour le plafond de fee
pub fn gwei_to_wei(gwei: &str) -> Option<u128> {
    parse_units(gwei, GWEI_DECIMALS).and_then(|v| u128::try_from(v).ok())
}

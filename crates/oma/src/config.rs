//! Environment knobs, each read once and cached for the process lifetime.

use std::sync::OnceLock;

use tracing::warn;

fn read_env(name: &str, default: u32, max: u32) -> u32 {
    match std::env::var(name) {
        Err(_) => default,
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(v) if v <= max => v,
            _ => {
                warn!("unexpected value {raw:?} for {name}, using {default}");
                default
            }
        },
    }
}

/// Minimum number of Streett pairs below which the dedicated
/// Streett-to-generalized-Büchi conversion is skipped (`OMA_STREETT_CONV_MIN`,
/// default 3; 0 disables the conversion entirely).
pub fn streett_conv_min() -> u32 {
    static MIN: OnceLock<u32> = OnceLock::new();
    *MIN.get_or_init(|| read_env("OMA_STREETT_CONV_MIN", 3, u32::MAX))
}

/// Variant selector for stutter-invariance handling (`OMA_STUTTER_CHECK`,
/// default 8, clamped to `[0, 9]`). The value 0 disables the
/// stutter-invariance optimisation in determinization.
pub fn stutter_check_algo() -> u32 {
    static ALGO: OnceLock<u32> = OnceLock::new();
    *ALGO.get_or_init(|| read_env("OMA_STUTTER_CHECK", 8, 9))
}

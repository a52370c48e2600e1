//! Amount Helpers
//!
//! Satoshi formatting and parsing for CLI input and log output. All math is
//! integer; BTC strings are split at the decimal point rather than going
//! through floating point.

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Satoshis as a BTC string (e.g. "0.00100000")
pub fn sats_to_btc_string(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// e.g. 100000 -> "100,000 sats (0.00100000 BTC)"
pub fn sats_to_display(sats: u64) -> String {
    format!("{} sats ({} BTC)", group_thousands(sats), sats_to_btc_string(sats))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Parse an amount in satoshis
///
/// Accepts plain integers with optional `,`/`_` separators, or a BTC amount
/// with a `btc` suffix (`0.0001btc`).
pub fn parse_amount(s: &str) -> Option<u64> {
    let cleaned: String = s
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    match cleaned.strip_suffix("btc") {
        Some(btc) => parse_btc_to_sats(btc.trim()),
        None => cleaned
            .strip_suffix("sats")
            .unwrap_or(cleaned.as_str())
            .trim()
            .parse()
            .ok(),
    }
}

fn parse_btc_to_sats(s: &str) -> Option<u64> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > 8 || (whole.is_empty() && frac.is_empty()) {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<8}", frac).parse().ok()?
    };

    whole.checked_mul(SATS_PER_BTC)?.checked_add(frac)
}

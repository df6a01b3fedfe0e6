//! Parsing of locale-formatted numbers found in brokerage exports.
//!
//! Exports write amounts like `"1,234"`, `"+56"` or `"-"` for "not available".
//! Placeholders and unparseable values resolve to zero so a single odd cell
//! never fails a whole document.

use tracing::debug;

fn normalize(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    Some(trimmed.replace([',', '+'], ""))
}

pub fn parse_int(s: &str) -> i64 {
    let Some(cleaned) = normalize(s) else {
        return 0;
    };
    match cleaned.parse::<i64>() {
        Ok(value) => value,
        Err(e) => {
            debug!(value = %s, error = %e, "Unparseable integer, using 0");
            0
        }
    }
}

pub fn parse_float(s: &str) -> f64 {
    let Some(cleaned) = normalize(s) else {
        return 0.0;
    };
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        Ok(_) => 0.0,
        Err(e) => {
            debug!(value = %s, error = %e, "Unparseable float, using 0");
            0.0
        }
    }
}

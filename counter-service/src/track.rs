//! Parsing of `/track` query parameters.

use crate::audit::AuditRecord;

pub const COUNT_PARAM: &str = "count";

/// Largest increment accepted from a single request (2^53 - 1). Beyond it a
/// decimal count no longer floors to an exact integer.
const MAX_INCREMENT: f64 = 9_007_199_254_740_991.0;

/// One inbound track request: every query parameter, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRequest {
    params: Vec<(String, String)>,
}

impl TrackRequest {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self { params }
    }

    /// The raw `count` value. A repeated `count` is ambiguous and yields `None`.
    pub fn raw_count(&self) -> Option<&str> {
        let mut counts = self
            .params
            .iter()
            .filter(|(key, _)| key == COUNT_PARAM)
            .map(|(_, value)| value.as_str());

        match (counts.next(), counts.next()) {
            (Some(value), None) => Some(value),
            _ => None,
        }
    }

    /// How much this request adds to the counter, if anything.
    pub fn increment(&self) -> Option<u64> {
        self.raw_count().and_then(parse_count)
    }

    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord::from_pairs(self.params.iter().cloned())
    }
}

/// Interprets a raw count.
///
/// Accepts finite decimal numbers strictly greater than zero, with fractions
/// floored, and unsigned `0x`, `0o` and `0b` integer literals. Anything else,
/// including values that floor to zero, means "do not increment".
pub fn parse_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value = match radix_literal(trimmed) {
        Some((radix, digits)) => {
            // from_str_radix would otherwise accept a sign after the prefix.
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return None;
            }
            u64::from_str_radix(digits, radix).ok()? as f64
        }
        None => trimmed.parse().ok()?,
    };
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let floored = value.floor();
    if floored < 1.0 || floored > MAX_INCREMENT {
        return None;
    }
    Some(floored as u64)
}

fn radix_literal(value: &str) -> Option<(u32, &str)> {
    let radix = match value.get(..2)? {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };
    Some((radix, value.get(2..)?))
}

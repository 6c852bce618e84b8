use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Maximum number of fractional digits an amount may carry.
pub const MAX_SCALE: u32 = 18;

/// A non-negative decimal quantity of some asset.
///
/// Stored as an integer number of units at a given scale (`units / 10^scale`),
/// so comparisons are exact and never pass through floating point.
/// `50000.00` and `50000` compare equal; their string forms keep the
/// precision they were written with.
#[derive(Debug, Clone, Copy)]
pub struct Amount {
    units: u128,
    scale: u32,
}

impl Amount {
    /// Parse a plain decimal string such as `"50000.00"` or `"10000"`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidAmount("empty amount".into()));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => {
                if f.is_empty() {
                    return Err(CoreError::InvalidAmount(format!(
                        "missing fractional digits: {input}"
                    )));
                }
                (w, f)
            }
            None => (s, ""),
        };

        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(frac) {
            return Err(CoreError::InvalidAmount(format!(
                "not a non-negative decimal: {input}"
            )));
        }

        let scale = frac.len() as u32;
        if scale > MAX_SCALE {
            return Err(CoreError::InvalidAmount(format!(
                "more than {MAX_SCALE} fractional digits: {input}"
            )));
        }

        let units = format!("{whole}{frac}")
            .parse::<u128>()
            .map_err(|_| CoreError::InvalidAmount(format!("amount out of range: {input}")))?;

        Ok(Self { units, scale })
    }

    /// Build an amount from raw units at the given scale.
    pub fn from_units(units: u128, scale: u32) -> Result<Self, CoreError> {
        if scale > MAX_SCALE {
            return Err(CoreError::InvalidAmount(format!(
                "scale {scale} exceeds {MAX_SCALE}"
            )));
        }
        Ok(Self { units, scale })
    }

    /// A whole-number amount.
    pub fn whole(value: u64) -> Self {
        Self {
            units: value as u128,
            scale: 0,
        }
    }

    pub fn units(&self) -> u128 {
        self.units
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Same value with trailing fractional zeros removed.
    pub fn normalized(&self) -> Self {
        let mut out = *self;
        while out.scale > 0 && out.units % 10 == 0 {
            out.units /= 10;
            out.scale -= 1;
        }
        out
    }

    /// Units expressed at a larger scale, or `None` on overflow.
    fn rescaled(&self, scale: u32) -> Option<u128> {
        let factor = 10u128.checked_pow(scale - self.scale)?;
        self.units.checked_mul(factor)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Amount {}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        // Only the side with the smaller scale is multiplied, so at most one
        // side can overflow, and that side is the larger value.
        match (self.rescaled(scale), other.rescaled(scale)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (None, _) => Ordering::Greater,
            (_, None) => Ordering::Less,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }
        let divisor = 10u128.pow(self.scale);
        write!(
            f,
            "{}.{:0width$}",
            self.units / divisor,
            self.units % divisor,
            width = self.scale as usize
        )
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::whole(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u64::try_from(v)
            .map(Amount::whole)
            .map_err(|_| E::custom(format!("negative amount: {v}")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom(format!("not a non-negative decimal: {v}")));
        }
        // Shortest round-trip representation, so 10000.5 stays "10000.5".
        Amount::parse(&v.to_string()).map_err(E::custom)
    }
}

//! Monetary value objects: currency codes, amounts in minor units, percentages.
//!
//! Amounts are stored in the currency's smallest unit (pesos for CLP, cents for
//! USD, ten-thousandths for CLF/UF) so commission math is exact integer
//! arithmetic with a single, explicit rounding step.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// ISO-4217 style three-letter currency code (always uppercase).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const CLP: Currency = Currency(*b"CLP");
    /// Unidad de Fomento.
    pub const CLF: Currency = Currency(*b"CLF");
    pub const USD: Currency = Currency(*b"USD");

    pub fn parse(code: &str) -> DomainResult<Self> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(DomainError::validation(format!(
                "currency must be a three-letter code, got {code:?}"
            )));
        }
        let mut out = [0u8; 3];
        for (dst, src) in out.iter_mut().zip(bytes) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    pub fn code(&self) -> &str {
        // Only ASCII letters are ever stored.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of decimal digits in the currency's minor unit.
    pub fn precision(&self) -> u32 {
        match &self.0 {
            b"CLP" | b"JPY" | b"KRW" | b"PYG" => 0,
            b"CLF" => 4,
            _ => 2,
        }
    }

    fn scale(&self) -> u64 {
        10u64.pow(self.precision())
    }
}

impl ValueObject for Currency {}

impl core::fmt::Debug for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}

/// A non-negative amount of money in the currency's minor unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: u64,
    currency: Currency,
}

impl Money {
    pub fn new(minor: u64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Build from whole units (e.g. `from_major(10, USD)` is 1000 cents).
    pub fn from_major(major: u64, currency: Currency) -> DomainResult<Self> {
        let minor = major
            .checked_mul(currency.scale())
            .ok_or_else(|| DomainError::validation("amount out of range"))?;
        Ok(Self::new(minor, currency))
    }

    /// Parse a plain decimal string such as `"1500.25"`.
    ///
    /// More fractional digits than the currency allows is a validation error,
    /// never a silent truncation.
    pub fn parse(text: &str, currency: Currency) -> DomainResult<Self> {
        let text = text.trim();
        let (whole, frac) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(frac) {
            return Err(DomainError::validation(format!("invalid amount {text:?}")));
        }

        let precision = currency.precision() as usize;
        if frac.len() > precision {
            return Err(DomainError::validation(format!(
                "{currency} amounts allow at most {precision} decimals"
            )));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| DomainError::validation("amount out of range"))?;
        let mut frac_minor: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse()
                .map_err(|_| DomainError::validation("amount out of range"))?
        };
        frac_minor *= 10u64.pow((precision - frac.len()) as u32);

        let minor = whole
            .checked_mul(currency.scale())
            .and_then(|m| m.checked_add(frac_minor))
            .ok_or_else(|| DomainError::validation("amount out of range"))?;
        Ok(Self::new(minor, currency))
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// `self * pct / 100`, rounded half-up to the currency's minor unit.
    pub fn percentage(&self, pct: Percentage) -> DomainResult<Money> {
        let scaled = u128::from(self.minor) * u128::from(pct.bps());
        let half = u128::from(Percentage::MAX_BPS / 2);
        let rounded = (scaled + half) / u128::from(Percentage::MAX_BPS);
        let minor = u64::try_from(rounded)
            .map_err(|_| DomainError::validation("commission amount out of range"))?;
        Ok(Money::new(minor, self.currency))
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let precision = self.currency.precision() as usize;
        if precision == 0 {
            return write!(f, "{} {}", self.minor, self.currency);
        }
        let scale = self.currency.scale();
        write!(
            f,
            "{}.{:0width$} {}",
            self.minor / scale,
            self.minor % scale,
            self.currency,
            width = precision
        )
    }
}

/// A percentage in `[0, 100]` with two decimals, stored as basis points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Percentage(u32);

impl Percentage {
    pub const MAX_BPS: u32 = 10_000;
    pub const ZERO: Percentage = Percentage(0);

    pub fn from_bps(bps: u32) -> DomainResult<Self> {
        if bps > Self::MAX_BPS {
            return Err(DomainError::validation(format!(
                "percentage must be within 0..=100, got {bps} basis points"
            )));
        }
        Ok(Self(bps))
    }

    pub fn from_percent(percent: u32) -> DomainResult<Self> {
        let bps = percent
            .checked_mul(100)
            .ok_or_else(|| DomainError::validation("percentage out of range"))?;
        Self::from_bps(bps)
    }

    /// Parse `"3"`, `"2.5"` or `"2.75"` (at most two decimals).
    pub fn parse(text: &str) -> DomainResult<Self> {
        let text = text.trim().trim_end_matches('%');
        let (whole, frac) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || frac.len() > 2 || !digits_only(whole) || !digits_only(frac) {
            return Err(DomainError::validation(format!("invalid percentage {text:?}")));
        }

        let whole: u32 = whole
            .parse()
            .map_err(|_| DomainError::validation("percentage out of range"))?;
        let frac: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().unwrap_or(0) * 10,
            _ => frac.parse::<u32>().unwrap_or(0),
        };
        let bps = whole
            .checked_mul(100)
            .and_then(|b| b.checked_add(frac))
            .ok_or_else(|| DomainError::validation("percentage out of range"))?;
        Self::from_bps(bps)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }
}

impl ValueObject for Percentage {}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        match frac {
            0 => write!(f, "{whole}%"),
            f10 if f10 % 10 == 0 => write!(f, "{whole}.{}%", f10 / 10),
            _ => write!(f, "{whole}.{frac:02}%"),
        }
    }
}

impl TryFrom<u32> for Percentage {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_bps(value)
    }
}

impl From<Percentage> for u32 {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

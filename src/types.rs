//! Shared value types: timestamps and money amounts
use std::fmt;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};

use crate::error::{AppraisalError, Result};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    /// Now, truncated to the millisecond resolution records are stored at.
    pub fn new() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(TimeStamp)
    }
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.as_millis())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        let millis = d.i64()?;

        TimeStamp::from_millis(millis).ok_or(minicbor::decode::Error::message(
            "failed to convert timestamp to utc",
        ))
    }
}

/// A money amount held as integer cents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }
    pub fn cents(&self) -> i64 {
        self.0
    }
    /// Parses caller supplied decimal text, rounding to whole cents.
    ///
    /// Rounding works on the exact binary value of the parsed number with
    /// ties to even, so `"0.125"` becomes `0.12` and `"2.675"` becomes `2.67`.
    /// `field` names the argument in the error when the text is not a finite
    /// decimal.
    pub fn parse(field: &'static str, text: &str) -> Result<Self> {
        let invalid = || AppraisalError::InvalidInput {
            field,
            value: text.to_string(),
        };
        let value: f64 = text.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        let rendered = format!("{value:.2}");
        let (whole, fraction) = rendered.split_once('.').ok_or_else(invalid)?;
        let negative = whole.starts_with('-');
        let cents = whole
            .trim_start_matches('-')
            .parse::<i64>()
            .ok()
            .and_then(|units| units.checked_mul(100))
            .and_then(|cents| cents.checked_add(fraction.parse::<i64>().ok()?))
            .ok_or_else(invalid)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

// always two decimals, the form used inside fingerprints
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl<C> minicbor::Encode<C> for Amount {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Amount {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        Ok(Amount(d.i64()?))
    }
}

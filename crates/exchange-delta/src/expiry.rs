//! Option symbol parsing and expiry-bucket resolution.
//!
//! Delta option symbols look like `C-BTC-60000-111025`: kind, underlying,
//! strike, and the expiry date as `DDMMYY`.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use std::str::FromStr;
use straddle_core::{ExpiryClass, OptionKind};

const TAG_FORMAT: &str = "%d%m%y";

/// Components of an option symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub kind: OptionKind,
    pub underlying: String,
    pub strike: Decimal,
    pub expiry_tag: String,
    pub expiry_date: NaiveDate,
}

/// Parses an option symbol. Returns `None` for anything that is not a
/// well-formed call/put symbol.
#[must_use]
pub fn parse_option_symbol(symbol: &str) -> Option<ParsedSymbol> {
    let mut parts = symbol.split('-');
    let kind = match parts.next()? {
        "C" => OptionKind::Call,
        "P" => OptionKind::Put,
        _ => return None,
    };
    let underlying = parts.next()?.to_string();
    let strike = Decimal::from_str(parts.next()?).ok()?;
    let expiry_tag = parts.next()?.to_string();
    if parts.next().is_some() || underlying.is_empty() {
        return None;
    }
    let expiry_date = NaiveDate::parse_from_str(&expiry_tag, TAG_FORMAT).ok()?;

    Some(ParsedSymbol {
        kind,
        underlying,
        strike,
        expiry_tag,
        expiry_date,
    })
}

/// Formats a date the way it appears in option symbols.
#[must_use]
pub fn expiry_tag(date: NaiveDate) -> String {
    date.format(TAG_FORMAT).to_string()
}

/// Returns true if `date` is the last Friday of its month.
#[must_use]
pub fn is_last_friday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Fri && (date + Duration::days(7)).month() != date.month()
}

/// Picks the listed expiry that a bucket refers to.
///
/// - daily: the nearest listed expiry
/// - weekly: the nearest listed Friday
/// - monthly: the nearest listed last-Friday-of-month
///
/// Expiries before `today` are ignored.
#[must_use]
pub fn resolve_expiry(
    listed: impl IntoIterator<Item = NaiveDate>,
    class: ExpiryClass,
    today: NaiveDate,
) -> Option<NaiveDate> {
    listed
        .into_iter()
        .filter(|date| *date >= today)
        .filter(|date| match class {
            ExpiryClass::Daily => true,
            ExpiryClass::Weekly => date.weekday() == Weekday::Fri,
            ExpiryClass::Monthly => is_last_friday(*date),
        })
        .min()
}

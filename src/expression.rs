//! Cron expression parsing.
//!
//! This module compiles cron text into a [`CronExpression`]: six `u64`
//! bitmasks, one per field, where bit *i* set means value *i* is permitted.
//! Both the classic 5-field form (seconds default to 0) and the 6-field form
//! with an explicit seconds field are accepted, as are the `@`-macros
//! (`@yearly`, `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`).
//!
//! Offset conventions: the day mask is shifted so bit 0 means day 1, and the
//! month mask so bit 0 means January. The weekday field accepts 0-7, with 7
//! folded into 0 (Sunday) during parsing.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::bits::{range_bits, value_bits};
use crate::errors::CronflowError;
use crate::Result;

const MONTH_NAMES: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const WEEKDAY_NAMES: [(&str, u32); 7] = [
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
];

/// A compiled cron expression: one permission bitmask per field.
///
/// Invariant: every mask of a successfully parsed expression is non-zero.
///
/// # Examples
///
/// ```
/// use cronflow::CronExpression;
///
/// let expr = CronExpression::parse("0 30 9 * * mon").unwrap();
/// assert!(CronExpression::parse("not cron").is_err());
/// # drop(expr);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    /// Seconds, bits 0-59.
    pub(crate) second: u64,
    /// Minutes, bits 0-59.
    pub(crate) minute: u64,
    /// Hours, bits 0-23.
    pub(crate) hour: u64,
    /// Day of month, bit 0 = day 1, bits 0-30.
    pub(crate) day: u64,
    /// Month, bit 0 = January, bits 0-11.
    pub(crate) month: u64,
    /// Day of week, bit 0 = Sunday, bits 0-6 after normalization.
    pub(crate) week: u64,
}

impl CronExpression {
    /// Compiles cron text into per-field bitmasks.
    ///
    /// Accepts a macro (`@hourly`, ...), a 5-field expression
    /// (minute hour day month weekday, seconds fixed to 0), or a 6-field
    /// expression (second minute hour day month weekday).
    ///
    /// # Errors
    ///
    /// Returns [`CronflowError::InvalidExpression`] for unknown macros, a
    /// wrong field count, malformed terms, zero steps, out-of-range values,
    /// or any field that ends up matching nothing.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        debug!("parsing cron expression {:?}", text);

        if text.starts_with('@') {
            return Self::parse_macro(text);
        }

        let mut fields: Vec<&str> = text.split_whitespace().collect();
        match fields.len() {
            5 => fields.insert(0, "0"),
            6 => {}
            n => {
                return Err(CronflowError::InvalidExpression(format!(
                    "expected 5 or 6 fields, got {} in {:?}",
                    n, text
                )))
            }
        }

        Ok(CronExpression {
            second: parse_field("second", fields[0], 60, 0, None)?,
            minute: parse_field("minute", fields[1], 60, 0, None)?,
            hour: parse_field("hour", fields[2], 24, 0, None)?,
            day: parse_field("day", fields[3], 31, -1, None)?,
            month: parse_field("month", fields[4], 12, -1, Some(&MONTH_NAMES))?,
            week: normalize_week(parse_field("weekday", fields[5], 8, 0, Some(&WEEKDAY_NAMES))?),
        })
    }

    fn parse_macro(text: &str) -> Result<Self> {
        let first = value_bits(&[0]);
        let any_day = range_bits(0, 30, 1);
        let any_month = range_bits(0, 11, 1);
        let any_week = range_bits(0, 6, 1);

        match text {
            "@yearly" | "@annually" => Ok(CronExpression {
                second: first,
                minute: first,
                hour: first,
                day: first,
                month: first,
                week: any_week,
            }),
            "@monthly" => Ok(CronExpression {
                second: first,
                minute: first,
                hour: first,
                day: first,
                month: any_month,
                week: any_week,
            }),
            // weekly cadence is approximated by daily-at-midnight; it does
            // not restrict the run to a single weekday
            "@weekly" | "@daily" | "@midnight" => Ok(CronExpression {
                second: first,
                minute: first,
                hour: first,
                day: any_day,
                month: any_month,
                week: any_week,
            }),
            "@hourly" => Ok(CronExpression {
                second: first,
                minute: first,
                hour: range_bits(0, 23, 1),
                day: any_day,
                month: any_month,
                week: any_week,
            }),
            "@reboot" => Err(CronflowError::InvalidExpression(
                "@reboot is not supported".to_string(),
            )),
            other => Err(CronflowError::InvalidExpression(format!(
                "unknown macro {:?}",
                other
            ))),
        }
    }
}

impl FromStr for CronExpression {
    type Err = CronflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    /// Renders the canonical 6-field text form: `*` for a full field,
    /// otherwise the comma-separated list of permitted values. Parsing the
    /// rendered form yields the same bitmasks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_field(f, self.second, 60, 0)?;
        f.write_str(" ")?;
        render_field(f, self.minute, 60, 0)?;
        f.write_str(" ")?;
        render_field(f, self.hour, 24, 0)?;
        f.write_str(" ")?;
        render_field(f, self.day, 31, 1)?;
        f.write_str(" ")?;
        render_field(f, self.month, 12, 1)?;
        f.write_str(" ")?;
        render_field(f, self.week, 7, 0)
    }
}

fn render_field(f: &mut fmt::Formatter<'_>, mask: u64, width: u32, base: u32) -> fmt::Result {
    if mask == range_bits(0, width - 1, 1) {
        return f.write_str("*");
    }
    let mut first = true;
    for bit in 0..width {
        if mask & (1 << bit) != 0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", bit + base)?;
            first = false;
        }
    }
    Ok(())
}

/// Weekday bit 7 is an alias for Sunday; fold it into bit 0 so the engine
/// and the canonical rendering only ever see bits 0-6.
fn normalize_week(mask: u64) -> u64 {
    if mask & (1 << 7) != 0 {
        (mask | 1) & !(1 << 7)
    } else {
        mask
    }
}

/// Compiles one field: a comma-separated list of terms, each `*`, a single
/// value, or an inclusive `a-b` range, optionally suffixed with `/step`.
fn parse_field(
    name: &str,
    field: &str,
    modulus: u32,
    offset: i32,
    names: Option<&[(&str, u32)]>,
) -> Result<u64> {
    let mut mask = 0u64;
    for term in field.split(',') {
        mask |= parse_term(name, term, modulus, offset, names)?;
    }
    if mask == 0 {
        // a zero mask would be indistinguishable from "matches nothing"
        return Err(CronflowError::InvalidExpression(format!(
            "bad {} field {:?}: matches no value",
            name, field
        )));
    }
    Ok(mask)
}

fn parse_term(
    name: &str,
    term: &str,
    modulus: u32,
    offset: i32,
    names: Option<&[(&str, u32)]>,
) -> Result<u64> {
    let bad = |what: &str| {
        CronflowError::InvalidExpression(format!("bad {} field: {} in {:?}", name, what, term))
    };

    let (range, step) = match term.split_once('/') {
        Some((range, step_text)) => {
            let step: u32 = step_text.parse().map_err(|_| bad("malformed step"))?;
            if step == 0 {
                return Err(bad("step of zero"));
            }
            (range, step)
        }
        None => (term, 1),
    };

    let (low, high) = if range == "*" {
        (0, modulus - 1)
    } else if let Some((a, b)) = range.split_once('-') {
        (
            parse_value(name, a, offset, names)?,
            parse_value(name, b, offset, names)?,
        )
    } else {
        let v = parse_value(name, range, offset, names)?;
        (v, v)
    };

    if low >= modulus || high >= modulus {
        return Err(bad("value out of range"));
    }

    // Walk from the low end, wrapping modulo the field size; every step-th
    // position is set. The stride does not reset when the walk wraps, so
    // "50-10/5" over seconds yields 50,55,0,5,10.
    let span = (high + modulus - low) % modulus;
    let mut mask = 0u64;
    for k in (0..=span).step_by(step as usize) {
        mask |= 1 << ((low + k) % modulus);
    }
    Ok(mask)
}

/// A single field value: digits, or a 3-letter lowercase name where the
/// field has a name table. The field offset is applied here, so day "1"
/// resolves to bit 0.
fn parse_value(
    name: &str,
    text: &str,
    offset: i32,
    names: Option<&[(&str, u32)]>,
) -> Result<u32> {
    let raw = if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse::<u32>().map_err(|_| {
            CronflowError::InvalidExpression(format!("bad {} field: value {:?}", name, text))
        })?
    } else if let Some(table) = names {
        table
            .iter()
            .find(|(n, _)| *n == text)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                CronflowError::InvalidExpression(format!("bad {} field: unknown name {:?}", name, text))
            })?
    } else {
        return Err(CronflowError::InvalidExpression(format!(
            "bad {} field: unexpected {:?}",
            name, text
        )));
    };

    let value = raw as i64 + offset as i64;
    if value < 0 {
        return Err(CronflowError::InvalidExpression(format!(
            "bad {} field: value {:?} out of range",
            name, text
        )));
    }
    Ok(value as u32)
}

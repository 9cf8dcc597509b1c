//! Canonical string form of application values
//!
//! Outbound values are rendered with [`to_canonical_string`]; inbound write
//! payloads are parsed back with [`parse_value`] against the tag last observed
//! for the target object.

use std::fmt::Write;

use crate::core::types::{Date, Time, UNSPECIFIED};
use crate::core::{ApplicationTag, ApplicationValue, Error, ObjectId, ObjectType, Result};

/// Renders a value in its canonical transport form
///
/// Reals and doubles are rendered with six decimals, so a magnitude below
/// 5e-7 comes out as zero and precision beyond the sixth decimal is lost.
pub fn to_canonical_string(value: &ApplicationValue) -> String {
    match value {
        ApplicationValue::Null => "null".to_string(),
        ApplicationValue::Boolean(value) => (if *value { "1" } else { "0" }).to_string(),
        ApplicationValue::Unsigned(value) => value.to_string(),
        ApplicationValue::Signed(value) => value.to_string(),
        ApplicationValue::Real(value) => format!("{:.6}", value),
        ApplicationValue::Double(value) => format!("{:.6}", value),
        ApplicationValue::OctetString(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for byte in bytes {
                let _ = write!(hex, "{:02x}", byte);
            }
            hex
        }
        ApplicationValue::CharacterString(text) => text.clone(),
        ApplicationValue::BitString(bits) => bits.iter().map(|&bit| if bit { '1' } else { '0' }).collect(),
        ApplicationValue::Enumerated(value) => value.to_string(),
        ApplicationValue::Date(date) => format_date(date),
        ApplicationValue::Time(time) => format_time(time),
        ApplicationValue::ObjectId(id) => id.to_string(),
    }
}

/// Parses a transport string into a value of the expected tag
pub fn parse_value(tag: ApplicationTag, input: &str) -> Result<ApplicationValue> {
    let fail = || Error::value_parse(tag, input);
    let trimmed = input.trim();

    let value = match tag {
        ApplicationTag::Null => {
            if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null") {
                return Err(fail());
            }
            ApplicationValue::Null
        }
        ApplicationTag::Boolean => ApplicationValue::Boolean(parse_boolean(trimmed).ok_or_else(fail)?),
        ApplicationTag::Unsigned => ApplicationValue::Unsigned(trimmed.parse().map_err(|_| fail())?),
        ApplicationTag::Signed => ApplicationValue::Signed(trimmed.parse().map_err(|_| fail())?),
        ApplicationTag::Real => ApplicationValue::Real(trimmed.parse().map_err(|_| fail())?),
        ApplicationTag::Double => ApplicationValue::Double(trimmed.parse().map_err(|_| fail())?),
        ApplicationTag::OctetString => ApplicationValue::OctetString(parse_hex(trimmed).ok_or_else(fail)?),
        ApplicationTag::CharacterString => ApplicationValue::CharacterString(input.to_string()),
        ApplicationTag::BitString => {
            let bits = trimmed
                .chars()
                .map(|c| match c {
                    '1' => Some(true),
                    '0' => Some(false),
                    _ => None,
                })
                .collect::<Option<Vec<bool>>>()
                .ok_or_else(fail)?;
            ApplicationValue::BitString(bits)
        }
        ApplicationTag::Enumerated => ApplicationValue::Enumerated(trimmed.parse().map_err(|_| fail())?),
        ApplicationTag::Date => ApplicationValue::Date(parse_date(trimmed).ok_or_else(fail)?),
        ApplicationTag::Time => ApplicationValue::Time(parse_time(trimmed).ok_or_else(fail)?),
        ApplicationTag::ObjectId => {
            let (object_type, instance) = trimmed.rsplit_once(':').ok_or_else(fail)?;
            let object_type = ObjectType::from_name(object_type).ok_or_else(fail)?;
            let instance = instance.parse().map_err(|_| fail())?;
            if instance > crate::core::types::MAX_INSTANCE {
                return Err(fail());
            }
            ApplicationValue::ObjectId(ObjectId::new(object_type, instance))
        }
    };
    Ok(value)
}

fn parse_boolean(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "active" | "on" => Some(true),
        "false" | "inactive" | "off" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n != 0),
    }
}

fn parse_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 || !input.is_ascii() {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok())
        .collect()
}

fn field(value: u8, width: usize) -> String {
    if value == UNSPECIFIED {
        "*".to_string()
    } else {
        format!("{:0width$}", value, width = width)
    }
}

fn parse_field(input: &str, max: u8) -> Option<u8> {
    if input == "*" {
        return Some(UNSPECIFIED);
    }
    input.parse::<u8>().ok().filter(|&v| v <= max)
}

fn format_date(date: &Date) -> String {
    let year = if date.year == UNSPECIFIED {
        "*".to_string()
    } else {
        (1900 + date.year as u16).to_string()
    };
    format!("{}-{}-{}", year, field(date.month, 2), field(date.day, 2))
}

fn parse_date(input: &str) -> Option<Date> {
    let mut parts = input.split('-');
    let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let year = if year == "*" {
        UNSPECIFIED
    } else {
        let full: u16 = year.parse().ok()?;
        u8::try_from(full.checked_sub(1900)?).ok().filter(|&y| y != UNSPECIFIED)?
    };
    Some(Date {
        year,
        month: parse_field(month, 14)?,
        day: parse_field(day, 34)?,
        weekday: UNSPECIFIED,
    })
}

fn format_time(time: &Time) -> String {
    format!(
        "{}:{}:{}.{}",
        field(time.hour, 2),
        field(time.minute, 2),
        field(time.second, 2),
        field(time.hundredths, 2)
    )
}

fn parse_time(input: &str) -> Option<Time> {
    let (clock, hundredths) = match input.split_once('.') {
        Some((clock, fraction)) => (clock, parse_field(fraction, 99)?),
        None => (input, 0),
    };
    let mut parts = clock.split(':');
    let hour = parse_field(parts.next()?, 23)?;
    let minute = parse_field(parts.next()?, 59)?;
    let second = match parts.next() {
        Some(second) => parse_field(second, 59)?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(Time {
        hour,
        minute,
        second,
        hundredths,
    })
}

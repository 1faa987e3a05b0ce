//! Input validation for every flow field
//!
//! Each parser either returns the typed value or a [`ValidationError`] whose
//! display text is the corrective hint sent back to the user.

use crate::model::{Gender, ProfileField, ProfileUpdate, Reading, TimeOfDay};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Inclusive numeric bound for a profile field or reading component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub field: &'static str,
    pub min: u16,
    pub max: u16,
    pub unit: &'static str,
}

pub const AGE: Bound = Bound {
    field: "Age",
    min: 1,
    max: 120,
    unit: "",
};

pub const HEIGHT: Bound = Bound {
    field: "Height",
    min: 50,
    max: 250,
    unit: " cm",
};

pub const WEIGHT: Bound = Bound {
    field: "Weight",
    min: 20,
    max: 300,
    unit: " kg",
};

pub const SYSTOLIC: Bound = Bound {
    field: "Systolic",
    min: 50,
    max: 300,
    unit: "",
};

pub const DIASTOLIC: Bound = Bound {
    field: "Diastolic",
    min: 30,
    max: 200,
    unit: "",
};

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} must be a number from {} to {}{}",
            self.field, self.min, self.max, self.unit
        )
    }
}

impl Bound {
    pub fn contains(&self, value: i64) -> bool {
        (i64::from(self.min)..=i64::from(self.max)).contains(&value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name cannot be empty. Try again!")]
    EmptyName,

    #[error("{0}. Try again!")]
    OutOfBounds(Bound),

    #[error("Please pick a gender from the options below!")]
    UnknownGender,

    #[error("Invalid format! Enter the reading like 120/80.")]
    ReadingFormat,

    #[error(
        "Values must be within: systolic {}-{}, diastolic {}-{}.",
        SYSTOLIC.min,
        SYSTOLIC.max,
        DIASTOLIC.min,
        DIASTOLIC.max
    )]
    ReadingRange,

    #[error("Invalid time format: {0}. Use HH:MM (for example, 09:00).")]
    TimeFormat(String),

    #[error("Invalid time: {0}. Hours: 0-23, minutes: 0-59.")]
    TimeRange(String),

    #[error("Choose a field from the options below!")]
    UnknownField,
}

static READING_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,3})/(\d{2,3})$").expect("Invalid reading regex"));

static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2})$").expect("Invalid time regex"));

pub fn parse_name(text: &str) -> Result<String, ValidationError> {
    let name = text.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

/// Parse an integer and check it against `bound`
pub fn parse_bounded(text: &str, bound: Bound) -> Result<u16, ValidationError> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|_| ValidationError::OutOfBounds(bound))?;
    if !bound.contains(value) {
        return Err(ValidationError::OutOfBounds(bound));
    }
    u16::try_from(value).map_err(|_| ValidationError::OutOfBounds(bound))
}

pub fn parse_age(text: &str) -> Result<u8, ValidationError> {
    let age = parse_bounded(text, AGE)?;
    u8::try_from(age).map_err(|_| ValidationError::OutOfBounds(AGE))
}

pub fn parse_height(text: &str) -> Result<u16, ValidationError> {
    parse_bounded(text, HEIGHT)
}

pub fn parse_weight(text: &str) -> Result<u16, ValidationError> {
    parse_bounded(text, WEIGHT)
}

pub fn parse_gender(text: &str) -> Result<Gender, ValidationError> {
    Gender::from_label(text.trim()).ok_or(ValidationError::UnknownGender)
}

/// Parse `SYS/DIA`, two or three digits each
pub fn parse_reading(text: &str) -> Result<Reading, ValidationError> {
    let caps = READING_PATTERN
        .captures(text.trim())
        .ok_or(ValidationError::ReadingFormat)?;

    let systolic: u16 = caps[1].parse().map_err(|_| ValidationError::ReadingFormat)?;
    let diastolic: u16 = caps[2].parse().map_err(|_| ValidationError::ReadingFormat)?;

    if !SYSTOLIC.contains(i64::from(systolic)) || !DIASTOLIC.contains(i64::from(diastolic)) {
        return Err(ValidationError::ReadingRange);
    }

    Ok(Reading::new(systolic, diastolic))
}

/// Parse one `HH:MM` token
pub fn parse_time_of_day(token: &str) -> Result<TimeOfDay, ValidationError> {
    let caps = TIME_PATTERN
        .captures(token)
        .ok_or_else(|| ValidationError::TimeFormat(token.to_string()))?;

    let hour: u8 = caps[1]
        .parse()
        .map_err(|_| ValidationError::TimeFormat(token.to_string()))?;
    let minute: u8 = caps[2]
        .parse()
        .map_err(|_| ValidationError::TimeFormat(token.to_string()))?;

    TimeOfDay::new(hour, minute).ok_or_else(|| ValidationError::TimeRange(token.to_string()))
}

/// Parse a comma separated list of times.
///
/// The first bad token rejects the whole submission. Duplicates collapse.
pub fn parse_reminder_times(text: &str) -> Result<Vec<TimeOfDay>, ValidationError> {
    let mut times = Vec::new();
    for token in text.split(',').map(str::trim) {
        let time = parse_time_of_day(token)?;
        if !times.contains(&time) {
            times.push(time);
        }
    }
    Ok(times)
}

/// Validate a new value for a single profile field
pub fn parse_update(field: ProfileField, text: &str) -> Result<ProfileUpdate, ValidationError> {
    match field {
        ProfileField::Name => parse_name(text).map(ProfileUpdate::Name),
        ProfileField::Age => parse_age(text).map(ProfileUpdate::Age),
        ProfileField::Gender => parse_gender(text).map(ProfileUpdate::Gender),
        ProfileField::Height => parse_height(text).map(ProfileUpdate::Height),
        ProfileField::Weight => parse_weight(text).map(ProfileUpdate::Weight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_name_trimmed() {
        assert_eq!(parse_name("  Anna ").unwrap(), "Anna");
        assert_eq!(parse_name("   "), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_age_bounds() {
        assert_eq!(parse_age("1").unwrap(), 1);
        assert_eq!(parse_age(" 120 ").unwrap(), 120);
        assert_eq!(parse_age("0"), Err(ValidationError::OutOfBounds(AGE)));
        assert_eq!(parse_age("121"), Err(ValidationError::OutOfBounds(AGE)));
        assert_eq!(parse_age("-5"), Err(ValidationError::OutOfBounds(AGE)));
        assert_eq!(parse_age("forty"), Err(ValidationError::OutOfBounds(AGE)));
    }

    #[test]
    fn test_bound_hint_restates_range() {
        let hint = parse_height("20").unwrap_err().to_string();
        assert!(hint.contains("50 to 250 cm"), "{}", hint);

        let hint = parse_weight("abc").unwrap_err().to_string();
        assert!(hint.contains("20 to 300 kg"), "{}", hint);
    }

    #[test]
    fn test_gender_options() {
        assert_eq!(parse_gender("Male").unwrap(), Gender::Male);
        assert_eq!(parse_gender("robot"), Err(ValidationError::UnknownGender));
    }

    #[test]
    fn test_reading_format() {
        assert_eq!(parse_reading("120/80").unwrap(), Reading::new(120, 80));
        assert_eq!(parse_reading(" 150/95 ").unwrap(), Reading::new(150, 95));
        assert_eq!(parse_reading("120-80"), Err(ValidationError::ReadingFormat));
        assert_eq!(parse_reading("1200/80"), Err(ValidationError::ReadingFormat));
        assert_eq!(parse_reading("120/8"), Err(ValidationError::ReadingFormat));
        assert_eq!(parse_reading("120 / 80"), Err(ValidationError::ReadingFormat));
    }

    #[test]
    fn test_reading_range() {
        assert_eq!(parse_reading("301/80"), Err(ValidationError::ReadingRange));
        assert_eq!(parse_reading("49/40"), Err(ValidationError::ReadingRange));
        assert_eq!(parse_reading("120/29"), Err(ValidationError::ReadingRange));
        assert_eq!(parse_reading("300/200").unwrap(), Reading::new(300, 200));
        assert!(ValidationError::ReadingRange
            .to_string()
            .contains("systolic 50-300, diastolic 30-200"));
    }

    #[test]
    fn test_reminder_times_list() {
        let times = parse_reminder_times("09:00, 15:30,21:45").unwrap();
        let rendered: Vec<String> = times.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["09:00", "15:30", "21:45"]);
    }

    #[test]
    fn test_reminder_times_dedup() {
        let times = parse_reminder_times("09:00, 09:00").unwrap();
        assert_eq!(times.len(), 1);
    }

    #[test]
    fn test_first_bad_token_aborts() {
        assert_eq!(
            parse_reminder_times("09:00, 9:30, 25:00"),
            Err(ValidationError::TimeFormat("9:30".to_string()))
        );
        assert_eq!(
            parse_reminder_times("09:00, 24:00"),
            Err(ValidationError::TimeRange("24:00".to_string()))
        );
        let hint = parse_reminder_times("07:61").unwrap_err().to_string();
        assert!(hint.contains("07:61"));
    }

    #[test]
    fn test_trailing_comma_rejected() {
        assert_eq!(
            parse_reminder_times("09:00,"),
            Err(ValidationError::TimeFormat(String::new()))
        );
    }

    #[test]
    fn test_parse_update_per_field() {
        assert_eq!(
            parse_update(ProfileField::Weight, "82").unwrap(),
            ProfileUpdate::Weight(82)
        );
        assert_eq!(
            parse_update(ProfileField::Gender, "Other").unwrap(),
            ProfileUpdate::Gender(Gender::Other)
        );
        assert!(parse_update(ProfileField::Age, "200").is_err());
    }

    proptest! {
        #[test]
        fn prop_time_round_trips(hour in 0u8..24, minute in 0u8..60) {
            let text = format!("{:02}:{:02}", hour, minute);
            let parsed = parse_time_of_day(&text).unwrap();
            prop_assert_eq!(parsed.to_string(), text);
        }

        #[test]
        fn prop_time_parser_never_panics(text in "\\PC{0,8}") {
            let _ = parse_time_of_day(&text);
        }

        #[test]
        fn prop_valid_readings_accepted(sys in 50u16..=300, dia in 30u16..=200) {
            let reading = parse_reading(&format!("{}/{}", sys, dia)).unwrap();
            prop_assert_eq!(reading, Reading::new(sys, dia));
        }
    }
}

//! Persisted data model: profiles, measurement history, reminder settings
//!
//! The three top-level maps of [`Snapshot`] serialize as the `users`,
//! `measurements` and `reminder_settings` collections of the state document.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Chat platform user identity
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    /// Button label shown in the gender picker
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label)
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub height_cm: u16,
    pub weight_kg: u16,
}

/// Profile fields editable one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Name,
    Age,
    Gender,
    Height,
    Weight,
}

impl ProfileField {
    pub const ALL: [ProfileField; 5] = [
        ProfileField::Name,
        ProfileField::Age,
        ProfileField::Gender,
        ProfileField::Height,
        ProfileField::Weight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Name => "Name",
            ProfileField::Age => "Age",
            ProfileField::Gender => "Gender",
            ProfileField::Height => "Height",
            ProfileField::Weight => "Weight",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == label)
    }
}

/// A validated new value for one profile field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    Name(String),
    Age(u8),
    Gender(Gender),
    Height(u16),
    Weight(u16),
}

impl ProfileUpdate {
    pub fn field(&self) -> ProfileField {
        match self {
            ProfileUpdate::Name(_) => ProfileField::Name,
            ProfileUpdate::Age(_) => ProfileField::Age,
            ProfileUpdate::Gender(_) => ProfileField::Gender,
            ProfileUpdate::Height(_) => ProfileField::Height,
            ProfileUpdate::Weight(_) => ProfileField::Weight,
        }
    }

    pub fn apply(&self, profile: &mut UserProfile) {
        match self {
            ProfileUpdate::Name(name) => profile.name = name.clone(),
            ProfileUpdate::Age(age) => profile.age = *age,
            ProfileUpdate::Gender(gender) => profile.gender = *gender,
            ProfileUpdate::Height(height) => profile.height_cm = *height,
            ProfileUpdate::Weight(weight) => profile.weight_kg = *weight,
        }
    }
}

impl fmt::Display for ProfileUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileUpdate::Name(name) => f.write_str(name),
            ProfileUpdate::Age(age) => write!(f, "{}", age),
            ProfileUpdate::Gender(gender) => write!(f, "{}", gender),
            ProfileUpdate::Height(height) => write!(f, "{} cm", height),
            ProfileUpdate::Weight(weight) => write!(f, "{} kg", weight),
        }
    }
}

/// One blood pressure reading, systolic over diastolic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub systolic: u16,
    pub diastolic: u16,
}

impl Reading {
    pub fn new(systolic: u16, diastolic: u16) -> Self {
        Self {
            systolic,
            diastolic,
        }
    }

    pub fn pulse_pressure(&self) -> i32 {
        i32::from(self.systolic) - i32::from(self.diastolic)
    }

    pub fn is_elevated(&self) -> bool {
        self.systolic > crate::config::WARN_SYSTOLIC_ABOVE
            || self.diastolic > crate::config::WARN_DIASTOLIC_ABOVE
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

/// A committed pair of readings. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub first: Reading,
    pub second: Reading,
}

impl MeasurementEntry {
    /// `dd.mm.YYYY HH:MM` in the entry's own offset
    pub fn display_date(&self) -> String {
        self.timestamp.format("%d.%m.%Y %H:%M").to_string()
    }

    pub fn local_date(&self, tz: &FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(tz).date_naive()
    }
}

/// Minute-resolution time of day, always rendered as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(Self { hour, minute })
    }

    pub fn from_time(time: &NaiveTime) -> Self {
        // NaiveTime guarantees hour < 24 and minute < 60
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = crate::validate::ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        crate::validate::parse_time_of_day(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Reminder schedule. Absent until the user first sets times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub times: BTreeSet<TimeOfDay>,
    #[serde(default)]
    pub active: bool,
}

impl ReminderConfig {
    pub fn scheduled(times: impl IntoIterator<Item = TimeOfDay>) -> Self {
        Self {
            times: times.into_iter().collect(),
            active: true,
        }
    }

    pub fn fires_at(&self, time: TimeOfDay) -> bool {
        self.active && self.times.contains(&time)
    }

    pub fn times_label(&self) -> String {
        self.times
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One advisory dialogue exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Full persisted state. Mutations always produce a new whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserProfile>,
    #[serde(default)]
    pub measurements: BTreeMap<UserId, Vec<MeasurementEntry>>,
    #[serde(default)]
    pub reminder_settings: BTreeMap<UserId, ReminderConfig>,
}

impl Snapshot {
    pub fn profile(&self, user_id: UserId) -> Option<&UserProfile> {
        self.users.get(&user_id)
    }

    pub fn is_registered(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn history(&self, user_id: UserId) -> &[MeasurementEntry] {
        self.measurements
            .get(&user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reminders(&self, user_id: UserId) -> Option<&ReminderConfig> {
        self.reminder_settings.get(&user_id)
    }

    /// Whether the user has an entry dated `date` in timezone `tz`
    pub fn measured_on(&self, user_id: UserId, date: NaiveDate, tz: &FixedOffset) -> bool {
        self.history(user_id)
            .iter()
            .any(|entry| entry.local_date(tz) == date)
    }

    pub fn entry_count(&self) -> usize {
        self.measurements.values().map(Vec::len).sum()
    }

    pub fn active_reminder_count(&self) -> usize {
        self.reminder_settings.values().filter(|r| r.active).count()
    }
}

//! Prompt assembly for the advisory service
//!
//! Two prompts exist: the analysis prompt sent after each committed
//! measurement, and the dialogue prompt sent for every advisory question.

use crate::config::{PROMPT_CHAT_TURNS, PROMPT_HISTORY_ENTRIES};
use crate::model::{ChatTurn, MeasurementEntry, UserProfile};
use std::fmt;

const NO_HISTORY: &str = "No measurements yet.";
const NO_DIALOGUE: &str = "No previous conversation.";
const NOT_A_DIAGNOSIS: &str = "❗️ Important: I don't make diagnoses. If anything worries you, \
                               see a doctor for an in-person consultation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    NoData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
            Trend::NoData => "no data",
        })
    }
}

/// Summary of the entries recorded before the current one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStats {
    pub mean_systolic: Option<f64>,
    pub mean_diastolic: Option<f64>,
    pub trend: Trend,
}

impl HistoryStats {
    /// Stats over the first readings of up to the last ten `prior` entries.
    ///
    /// The trend compares the two most recent systolic values and needs at
    /// least two entries.
    pub fn from_prior(prior: &[MeasurementEntry]) -> Self {
        let window = last(prior, PROMPT_HISTORY_ENTRIES);
        if window.is_empty() {
            return Self {
                mean_systolic: None,
                mean_diastolic: None,
                trend: Trend::NoData,
            };
        }

        let count = window.len() as f64;
        let mean_systolic = window
            .iter()
            .map(|e| f64::from(e.first.systolic))
            .sum::<f64>()
            / count;
        let mean_diastolic = window
            .iter()
            .map(|e| f64::from(e.first.diastolic))
            .sum::<f64>()
            / count;

        let trend = match window {
            [.., previous, latest] => match latest.first.systolic.cmp(&previous.first.systolic) {
                std::cmp::Ordering::Greater => Trend::Rising,
                std::cmp::Ordering::Less => Trend::Falling,
                std::cmp::Ordering::Equal => Trend::Stable,
            },
            _ => Trend::NoData,
        };

        Self {
            mean_systolic: Some(mean_systolic),
            mean_diastolic: Some(mean_diastolic),
            trend,
        }
    }
}

fn last<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn format_mean(mean: Option<f64>) -> String {
    mean.map(|m| format!("{:.1}", m))
        .unwrap_or_else(|| "no data".to_string())
}

fn history_lines(entries: &[MeasurementEntry]) -> String {
    let window = last(entries, PROMPT_HISTORY_ENTRIES);
    if window.is_empty() {
        return NO_HISTORY.to_string();
    }
    window
        .iter()
        .map(|e| {
            format!(
                "{} - first: {}, second: {}",
                e.display_date(),
                e.first,
                e.second
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt sent right after `current` was committed. `prior` excludes it.
pub fn build_analysis_prompt(
    profile: &UserProfile,
    current: &MeasurementEntry,
    prior: &[MeasurementEntry],
) -> String {
    let stats = HistoryStats::from_prior(prior);

    format!(
        "I am your personal cardiologist. Let's go over your blood pressure readings, {name}.\n\n\
         Your data: age {age}, gender {gender}, height {height} cm, weight {weight} kg.\n\
         Current measurements:\n\
         First reading: {first} (pulse pressure: {first_pp} mmHg)\n\
         Second reading: {second} (pulse pressure: {second_pp} mmHg)\n\n\
         Averages over your history:\n\
         Mean systolic: {mean_sys}\n\
         Mean diastolic: {mean_dia}\n\
         Pressure trend: {trend}\n\n\
         Measurement history:\n{history}\n\n\
         Let's analyse your readings:\n\
         - Check for signs of hypertension (above 140/90) or hypotension (below 90/60).\n\
         - Assess pulse pressure (normal is 30-50 mmHg) and the difference between the two readings.\n\
         - Look at how your readings change over time.\n\
         After the analysis I will suggest lifestyle or diet changes that may help.\n\n\
         {NOT_A_DIAGNOSIS}",
        name = profile.name,
        age = profile.age,
        gender = profile.gender,
        height = profile.height_cm,
        weight = profile.weight_kg,
        first = current.first,
        first_pp = current.first.pulse_pressure(),
        second = current.second,
        second_pp = current.second.pulse_pressure(),
        mean_sys = format_mean(stats.mean_systolic),
        mean_dia = format_mean(stats.mean_diastolic),
        trend = stats.trend,
        history = history_lines(prior),
    )
}

/// Prompt for one advisory question. `turns` are prior exchanges, oldest first.
pub fn build_dialogue_prompt(
    profile: &UserProfile,
    history: &[MeasurementEntry],
    turns: &[ChatTurn],
    question: &str,
) -> String {
    let dialogue = last(turns, PROMPT_CHAT_TURNS)
        .iter()
        .map(|t| format!("Patient: {}\nMe: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n");

    let dialogue = if dialogue.is_empty() {
        NO_DIALOGUE.to_string()
    } else {
        dialogue
    };

    format!(
        "I am your personal cardiologist, {name}. My job is to help you keep track of your blood \
         pressure and answer your questions about the heart and blood vessels.\n\n\
         Your data:\nName: {name}, age: {age}, gender: {gender}, height: {height} cm, weight: {weight} kg.\n\n\
         Your blood pressure history:\n{history}\n\n\
         Our previous conversation:\n{dialogue}\n\n\
         Your question: {question}\n\n\
         I will answer as professionally and clearly as I can, taking your data and our \
         conversation into account. {NOT_A_DIAGNOSIS}",
        name = profile.name,
        age = profile.age,
        gender = profile.gender,
        height = profile.height_cm,
        weight = profile.weight_kg,
        history = history_lines(history),
    )
}

//! Per-user conversation state machine
//!
//! [`transition`] is pure: given the user's current flow state, what the
//! engine knows about the user, and one inbound text, it returns the next
//! state and the list of [`Effect`]s to run. It performs no I/O, so every
//! flow can be tested without a transport, a store, or an advisory service.
//!
//! Menu commands win over flow input in every state. Commands that start a
//! flow replace whatever session the user had; commands that do not (history,
//! export, disabling reminders) leave the current session untouched.

use crate::model::{Gender, ProfileField, ProfileUpdate, Reading, TimeOfDay, UserId, UserProfile};
use crate::transport::{Keyboard, OutboundMessage};
use crate::validate::{self, ValidationError};

pub const EDIT_RESET_HISTORY: &str = "Reset measurement history";
pub const EDIT_CANCEL: &str = "Cancel";

const HIGH_PRESSURE_WARNING: &str =
    "⚠️ Warning: your pressure is above normal (140/90). Consider seeing a doctor.";

/// Inputs recognised in any state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Measure,
    SetReminders,
    DisableReminders,
    ShowHistory,
    Export,
    EditProfile,
    StartAdvisory,
    EndAdvisory,
}

impl Command {
    /// Main menu buttons, in display order
    pub const MENU: [Command; 7] = [
        Command::Measure,
        Command::SetReminders,
        Command::DisableReminders,
        Command::ShowHistory,
        Command::Export,
        Command::EditProfile,
        Command::StartAdvisory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Command::Start => "/start",
            Command::Measure => "Measure pressure",
            Command::SetReminders => "Set reminders",
            Command::DisableReminders => "Disable reminders",
            Command::ShowHistory => "Show history",
            Command::Export => "Export data",
            Command::EditProfile => "Edit profile",
            Command::StartAdvisory => "Talk to the AI",
            Command::EndAdvisory => "End AI dialogue",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "/start" || text.starts_with("/start ") {
            return Some(Command::Start);
        }
        Self::MENU
            .into_iter()
            .chain([Command::EndAdvisory])
            .find(|c| c.label() == text)
    }

    /// Whether the command opens a new flow (and so abandons the old one)
    pub fn starts_flow(self) -> bool {
        matches!(
            self,
            Command::Start
                | Command::Measure
                | Command::SetReminders
                | Command::EditProfile
                | Command::StartAdvisory
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStep {
    Name,
    Age {
        name: String,
    },
    Gender {
        name: String,
        age: u8,
    },
    Height {
        name: String,
        age: u8,
        gender: Gender,
    },
    Weight {
        name: String,
        age: u8,
        gender: Gender,
        height_cm: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementStep {
    First,
    Second { first: Reading },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStep {
    ChooseField,
    NewValue { field: ProfileField },
}

/// The active flow of one user, with the fields collected so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Registration(RegistrationStep),
    Measurement(MeasurementStep),
    EditProfile(EditStep),
    Reminders,
    Advisory,
}

impl FlowState {
    pub fn tag(&self) -> &'static str {
        match self {
            FlowState::Registration(RegistrationStep::Name) => "registration.name",
            FlowState::Registration(RegistrationStep::Age { .. }) => "registration.age",
            FlowState::Registration(RegistrationStep::Gender { .. }) => "registration.gender",
            FlowState::Registration(RegistrationStep::Height { .. }) => "registration.height",
            FlowState::Registration(RegistrationStep::Weight { .. }) => "registration.weight",
            FlowState::Measurement(MeasurementStep::First) => "measurement.first",
            FlowState::Measurement(MeasurementStep::Second { .. }) => "measurement.second",
            FlowState::EditProfile(EditStep::ChooseField) => "edit.choose_field",
            FlowState::EditProfile(EditStep::NewValue { .. }) => "edit.new_value",
            FlowState::Reminders => "reminders.times",
            FlowState::Advisory => "advisory.active",
        }
    }
}

/// Work for the engine to carry out after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Reply(OutboundMessage),
    CreateProfile(UserProfile),
    RecordMeasurement { first: Reading, second: Reading },
    /// Ask the advisory service about the entry just recorded
    AnalyzeLatest,
    UpdateProfile(ProfileUpdate),
    ClearHistory,
    SetReminders(Vec<TimeOfDay>),
    DisableReminders,
    ShowHistory,
    ExportHistory,
    AskAdvisor { question: String },
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// `None` means the user is idle and holds no session
    pub next: Option<FlowState>,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn idle() -> Self {
        Self {
            next: None,
            effects: vec![],
        }
    }

    pub fn to(state: FlowState) -> Self {
        Self {
            next: Some(state),
            effects: vec![],
        }
    }

    fn keep(state: Option<&FlowState>) -> Self {
        Self {
            next: state.cloned(),
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn reply(self, text: impl Into<String>, keyboard: Keyboard) -> Self {
        self.with_effect(Effect::Reply(OutboundMessage::new(text, keyboard)))
    }

    /// Re-prompt with the validation hint and stay in `state`
    fn reject(state: FlowState, err: ValidationError) -> Self {
        Self::to(state).reply(err.to_string(), Keyboard::Keep)
    }

    pub fn replies(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Reply(msg) => Some(msg),
            _ => None,
        })
    }
}

/// What the transition function may know about the user
#[derive(Debug, Clone, Copy)]
pub struct UserContext<'a> {
    pub user_id: UserId,
    pub profile: Option<&'a UserProfile>,
}

/// Pure transition function
pub fn transition(state: Option<&FlowState>, ctx: &UserContext<'_>, text: &str) -> Transition {
    if let Some(command) = Command::parse(text) {
        return on_command(state, ctx, command);
    }

    match state {
        None => on_idle_text(ctx),
        Some(FlowState::Registration(step)) => on_registration(step, ctx, text),
        Some(FlowState::Measurement(step)) => on_measurement(step, text),
        Some(FlowState::EditProfile(step)) => on_edit(step, text),
        Some(FlowState::Reminders) => on_reminder_times(text),
        Some(FlowState::Advisory) => on_advisory_question(text),
    }
}

fn on_command(state: Option<&FlowState>, ctx: &UserContext<'_>, command: Command) -> Transition {
    match (command, ctx.profile) {
        (Command::Start, None) => Transition::to(FlowState::Registration(RegistrationStep::Name))
            .reply("Hi! What is your name?", Keyboard::Remove),
        (Command::Start, Some(profile)) => Transition::idle().reply(
            format!("Hi, {}! What shall we do? ❤️", profile.name),
            Keyboard::MainMenu,
        ),
        (Command::EndAdvisory, Some(_)) => Transition::idle().reply(
            "Dialogue finished. If new questions come up, I'm always here! What's next? ❤️",
            Keyboard::MainMenu,
        ),
        (_, None) => {
            Transition::keep(state).reply("Please register first! Send /start.", Keyboard::Keep)
        }
        (Command::Measure, Some(_)) => Transition::to(FlowState::Measurement(
            MeasurementStep::First,
        ))
        .reply(
            "Measure your pressure and send the result as SYSTOLIC/DIASTOLIC (for example, 120/80).",
            Keyboard::Remove,
        ),
        (Command::SetReminders, Some(_)) => Transition::to(FlowState::Reminders).reply(
            "Send the reminder time as HH:MM (for example, 09:00). \
             For several reminders separate them with commas (for example, 09:00, 15:00).",
            Keyboard::Remove,
        ),
        (Command::DisableReminders, Some(_)) => Transition::keep(state)
            .with_effect(Effect::DisableReminders)
            .reply(
                "⛔ Reminders disabled! Set them again whenever you need.",
                Keyboard::MainMenu,
            ),
        (Command::ShowHistory, Some(_)) => Transition::keep(state).with_effect(Effect::ShowHistory),
        (Command::Export, Some(_)) => Transition::keep(state).with_effect(Effect::ExportHistory),
        (Command::EditProfile, Some(_)) => {
            Transition::to(FlowState::EditProfile(EditStep::ChooseField))
                .reply("What would you like to change?", Keyboard::EditFieldPicker)
        }
        (Command::StartAdvisory, Some(profile)) => Transition::to(FlowState::Advisory).reply(
            format!(
                "Hello, {}! I'm your personal cardiologist. Ask your questions and I'll answer \
                 using your data and pressure history. When you're done, press '{}'.",
                profile.name,
                Command::EndAdvisory.label()
            ),
            Keyboard::EndDialogue,
        ),
    }
}

fn on_idle_text(ctx: &UserContext<'_>) -> Transition {
    match ctx.profile {
        Some(_) => Transition::idle().reply("Pick an action from the menu ❤️", Keyboard::MainMenu),
        None => Transition::idle().reply("Send /start to get started.", Keyboard::Keep),
    }
}

fn on_registration(step: &RegistrationStep, ctx: &UserContext<'_>, text: &str) -> Transition {
    let current = || FlowState::Registration(step.clone());

    match step {
        RegistrationStep::Name => match validate::parse_name(text) {
            Ok(name) => Transition::to(FlowState::Registration(RegistrationStep::Age { name }))
                .reply("How old are you?", Keyboard::Keep),
            Err(e) => Transition::reject(current(), e),
        },
        RegistrationStep::Age { name } => match validate::parse_age(text) {
            Ok(age) => Transition::to(FlowState::Registration(RegistrationStep::Gender {
                name: name.clone(),
                age,
            }))
            .reply("Select your gender:", Keyboard::GenderPicker),
            Err(e) => Transition::reject(current(), e),
        },
        RegistrationStep::Gender { name, age } => match validate::parse_gender(text) {
            Ok(gender) => Transition::to(FlowState::Registration(RegistrationStep::Height {
                name: name.clone(),
                age: *age,
                gender,
            }))
            .reply("What is your height (in cm)?", Keyboard::Remove),
            Err(e) => Transition::reject(current(), e),
        },
        RegistrationStep::Height { name, age, gender } => match validate::parse_height(text) {
            Ok(height_cm) => Transition::to(FlowState::Registration(RegistrationStep::Weight {
                name: name.clone(),
                age: *age,
                gender: *gender,
                height_cm,
            }))
            .reply("What is your weight (in kg)?", Keyboard::Keep),
            Err(e) => Transition::reject(current(), e),
        },
        RegistrationStep::Weight {
            name,
            age,
            gender,
            height_cm,
        } => match validate::parse_weight(text) {
            Ok(weight_kg) => {
                let profile = UserProfile {
                    id: ctx.user_id,
                    name: name.clone(),
                    age: *age,
                    gender: *gender,
                    height_cm: *height_cm,
                    weight_kg,
                };
                let summary = format!(
                    "Done, {}! Your data: age {}, gender {}, height {} cm, weight {} kg. \
                     What shall we do? ❤️",
                    profile.name, profile.age, profile.gender, profile.height_cm, profile.weight_kg
                );
                Transition::idle()
                    .with_effect(Effect::CreateProfile(profile))
                    .reply(summary, Keyboard::MainMenu)
            }
            Err(e) => Transition::reject(current(), e),
        },
    }
}

fn on_measurement(step: &MeasurementStep, text: &str) -> Transition {
    let current = FlowState::Measurement(step.clone());
    let reading = match validate::parse_reading(text) {
        Ok(reading) => reading,
        Err(e) => return Transition::reject(current, e),
    };

    let mut result = match step {
        MeasurementStep::First => {
            Transition::to(FlowState::Measurement(MeasurementStep::Second { first: reading }))
        }
        MeasurementStep::Second { .. } => Transition::idle(),
    };
    if reading.is_elevated() {
        result = result.reply(HIGH_PRESSURE_WARNING, Keyboard::Keep);
    }

    match step {
        MeasurementStep::First => result.reply(
            "Good. Measure again in 2-3 minutes and send the result.",
            Keyboard::Keep,
        ),
        MeasurementStep::Second { first } => result
            .with_effect(Effect::RecordMeasurement {
                first: *first,
                second: reading,
            })
            .reply(
                format!(
                    "Recorded! First: {}, second: {}. What's next? ❤️",
                    first, reading
                ),
                Keyboard::MainMenu,
            )
            .with_effect(Effect::AnalyzeLatest),
    }
}

fn on_edit(step: &EditStep, text: &str) -> Transition {
    match step {
        EditStep::ChooseField => {
            let choice = text.trim();
            if choice == EDIT_CANCEL {
                return Transition::idle().reply("Editing cancelled.", Keyboard::MainMenu);
            }
            if choice == EDIT_RESET_HISTORY {
                return Transition::idle()
                    .with_effect(Effect::ClearHistory)
                    .reply("Measurement history cleared.", Keyboard::MainMenu);
            }
            match ProfileField::from_label(choice) {
                Some(ProfileField::Gender) => Transition::to(FlowState::EditProfile(
                    EditStep::NewValue {
                        field: ProfileField::Gender,
                    },
                ))
                .reply("Select the new gender:", Keyboard::GenderPicker),
                Some(field) => {
                    Transition::to(FlowState::EditProfile(EditStep::NewValue { field })).reply(
                        format!("Enter a new value for {}:", field.label()),
                        Keyboard::Remove,
                    )
                }
                None => Transition::reject(
                    FlowState::EditProfile(EditStep::ChooseField),
                    ValidationError::UnknownField,
                ),
            }
        }
        EditStep::NewValue { field } => match validate::parse_update(*field, text) {
            Ok(update) => {
                let confirmation = format!("{} updated: {}.", field.label(), update);
                Transition::idle()
                    .with_effect(Effect::UpdateProfile(update))
                    .reply(confirmation, Keyboard::MainMenu)
            }
            Err(e) => Transition::reject(FlowState::EditProfile(step.clone()), e),
        },
    }
}

fn on_reminder_times(text: &str) -> Transition {
    match validate::parse_reminder_times(text) {
        Ok(times) => {
            let listed = times
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Transition::idle()
                .with_effect(Effect::SetReminders(times))
                .reply(format!("Reminders set for: {}", listed), Keyboard::MainMenu)
        }
        Err(e) => Transition::reject(FlowState::Reminders, e),
    }
}

fn on_advisory_question(text: &str) -> Transition {
    let question = text.trim();
    if question.is_empty() {
        return Transition::to(FlowState::Advisory).reply(
            format!(
                "Type your question, or press '{}'.",
                Command::EndAdvisory.label()
            ),
            Keyboard::EndDialogue,
        );
    }
    Transition::to(FlowState::Advisory).with_effect(Effect::AskAdvisor {
        question: question.to_string(),
    })
}

use serde_json::Value;
use thiserror::Error;

use crate::types::{coerce_number, Intent, OperatingMode, WireCommand};

pub const INTENT_MODE: &str = "mode";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntentError {
    #[error("Unknown command type: {intent_type}")]
    UnknownIntent { intent_type: String },
    #[error("Command '{intent_type}' is not allowed in {mode} mode")]
    DeniedByMode {
        intent_type: String,
        mode: OperatingMode,
    },
    #[error("Invalid value for '{intent_type}': {reason}")]
    InvalidValue { intent_type: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireRule {
    /// `MODE:<AUTO|MANUAL>`
    Mode,
    /// Fixed command, the intent value is ignored.
    Literal(&'static str),
    /// `<prefix>:<on|off>` chosen by the value's truthiness.
    Switch {
        prefix: &'static str,
        on: &'static str,
        off: &'static str,
    },
    Float(&'static str),
    Int(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub intent_type: &'static str,
    pub rule: WireRule,
}

const fn switch(prefix: &'static str) -> WireRule {
    WireRule::Switch {
        prefix,
        on: "ON",
        off: "OFF",
    }
}

const fn entry(intent_type: &'static str, rule: WireRule) -> CommandSpec {
    CommandSpec { intent_type, rule }
}

pub const COMMAND_TABLE: &[CommandSpec] = &[
    entry(INTENT_MODE, WireRule::Mode),
    entry("temperature", WireRule::Float("SET_TEMP")),
    entry("humidity", WireRule::Int("SET_HUM")),
    entry("ventilation", switch("VENT")),
    entry("heating", switch("HEAT")),
    entry("humidity_system", switch("HUM_SYS")),
    entry("flip", switch("FLIP")),
    entry("start_flip_session", WireRule::Literal("START_FLIP_SESSION")),
    entry("stop_flip_session", WireRule::Literal("STOP_FLIP_SESSION")),
    entry("flip_interval_hours", WireRule::Float("SET_FLIP_INTERVAL_H")),
    entry("flip_duration_minutes", WireRule::Float("SET_FLIP_DURATION_M")),
    entry("trigger_vent_now", WireRule::Literal("TRIGGER_VENT_NOW")),
    entry(
        "water_valve",
        WireRule::Switch {
            prefix: "WATER_VALVE",
            on: "OPEN",
            off: "CLOSE",
        },
    ),
    entry("day", WireRule::Int("SET_DAY")),
    entry("egg_count", WireRule::Int("SET_EGGS")),
    entry("reset", WireRule::Literal("RESET")),
    entry("emergency_stop", WireRule::Literal("EMERGENCY_STOP")),
    entry("silence_alarm", WireRule::Literal("SILENCE_ALARM")),
    entry("buzzer_test", switch("BUZZER")),
];

pub fn lookup(intent_type: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.intent_type == intent_type)
}

pub fn translate(intent: &Intent) -> Result<WireCommand, IntentError> {
    let spec = lookup(&intent.intent_type).ok_or_else(|| IntentError::UnknownIntent {
        intent_type: intent.intent_type.clone(),
    })?;
    spec.render(&intent.value).map(WireCommand::new)
}

/// The mode carried by a `mode` intent, if its value names one.
pub fn requested_mode(value: &Value) -> Option<OperatingMode> {
    value.as_str()?.parse().ok()
}

impl CommandSpec {
    pub fn render(&self, value: &Value) -> Result<String, IntentError> {
        match self.rule {
            WireRule::Mode => {
                let mode = requested_mode(value)
                    .ok_or_else(|| self.invalid("expected AUTO or MANUAL"))?;
                Ok(format!("MODE:{mode}"))
            }
            WireRule::Literal(command) => Ok(command.to_string()),
            WireRule::Switch { prefix, on, off } => {
                let state = if is_truthy(value) { on } else { off };
                Ok(format!("{prefix}:{state}"))
            }
            WireRule::Float(prefix) => {
                let number =
                    coerce_number(value).ok_or_else(|| self.invalid("expected a number"))?;
                Ok(format!("{prefix}:{number}"))
            }
            WireRule::Int(prefix) => {
                let number =
                    coerce_number(value).ok_or_else(|| self.invalid("expected a number"))?;
                Ok(format!("{prefix}:{}", number.round() as i64))
            }
        }
    }

    fn invalid(&self, reason: &str) -> IntentError {
        IntentError::InvalidValue {
            intent_type: self.intent_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

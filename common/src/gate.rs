use crate::{
    commands::{requested_mode, IntentError, INTENT_MODE},
    types::{Intent, OperatingMode},
};

/// Intent types that reach the device in every mode.
pub const ALWAYS_ALLOWED: &[&str] = &[INTENT_MODE, "emergency_stop", "reset"];

#[derive(Debug, Clone, Default)]
pub struct ModeGate {
    mode: OperatingMode,
}

impl ModeGate {
    pub fn new(mode: OperatingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn authorize(&self, intent_type: &str) -> bool {
        ALWAYS_ALLOWED.contains(&intent_type) || self.mode == OperatingMode::Manual
    }

    /// Runs the gate for one intent. A valid `mode` intent switches the mode as
    /// a side effect; the returned flag reports whether it actually changed.
    pub fn admit(&mut self, intent: &Intent) -> Result<bool, IntentError> {
        if !self.authorize(&intent.intent_type) {
            return Err(IntentError::DeniedByMode {
                intent_type: intent.intent_type.clone(),
                mode: self.mode,
            });
        }

        if intent.intent_type != INTENT_MODE {
            return Ok(false);
        }

        let mode = requested_mode(&intent.value).ok_or_else(|| IntentError::InvalidValue {
            intent_type: intent.intent_type.clone(),
            reason: "expected AUTO or MANUAL".to_string(),
        })?;
        let changed = self.mode != mode;
        self.mode = mode;
        Ok(changed)
    }
}

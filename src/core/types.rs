use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::{AutomationError, AutomationResult};

/// Flat key/value payload carried by a trigger.
pub type Payload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    #[serde(default)]
    pub description: String,
    pub owner_id: String,
    #[serde(default)]
    pub setup_done: bool,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_payload: Option<Payload>,
}

/// What a listener or action does when it runs. Stored as data and
/// interpreted by a single dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerSpec {
    Instruction {
        instruction: String,
        #[serde(default)]
        tool_names: Vec<String>,
    },
    Template {
        template: String,
    },
}

impl TriggerSpec {
    /// Builds a spec from the loose request shape, where exactly one of
    /// `instruction` / `template` must be present.
    pub fn from_parts(
        instruction: Option<String>,
        template: Option<String>,
        tool_names: Option<Vec<String>>,
    ) -> AutomationResult<Self> {
        let instruction = instruction.filter(|s| !s.trim().is_empty());
        let template = template.filter(|s| !s.trim().is_empty());
        match (instruction, template) {
            (Some(instruction), None) => Ok(TriggerSpec::Instruction {
                instruction,
                tool_names: tool_names.unwrap_or_default(),
            }),
            (None, Some(template)) => Ok(TriggerSpec::Template { template }),
            (Some(_), Some(_)) => Err(AutomationError::Validation(
                "Provide either instruction or template, not both".to_string(),
            )),
            (None, None) => Err(AutomationError::Validation(
                "Either instruction or template is required".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSpec::Instruction { .. } => "instruction",
            TriggerSpec::Template { .. } => "template",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOptions {
    #[serde(default)]
    pub auto_stop_after_single_event: bool,
    #[serde(default)]
    pub auto_stop_after_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub id: String,
    pub event_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub description: String,
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub options: ListenerOptions,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_in_seconds: Option<u64>,
}

/// Largest accepted delay or expiry offset, about a century.
pub const MAX_OFFSET_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// `start + seconds`, or `None` past [`MAX_OFFSET_SECONDS`] or the calendar.
fn offset_from(start: DateTime<Utc>, seconds: u64) -> Option<DateTime<Utc>> {
    if seconds > MAX_OFFSET_SECONDS {
        return None;
    }
    let delta = Duration::try_seconds(i64::try_from(seconds).ok()?)?;
    start.checked_add_signed(delta)
}

impl Listener {
    /// `None` also covers an out-of-range stored offset: such a listener
    /// never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in_seconds
            .and_then(|secs| offset_from(self.created_at, secs))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Schedule {
    Delay { seconds: u64 },
    Cron { expression: String },
}

impl Schedule {
    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Cron { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: String,
    #[serde(default)]
    pub description: String,
    pub owner_id: String,
    pub schedule: Schedule,
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub notify: bool,
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// Time left before a delay action fires, measured from `created_at`.
    /// Zero when the delay has already elapsed; `None` for cron actions and
    /// for delays beyond [`MAX_OFFSET_SECONDS`].
    pub fn remaining_delay(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        match &self.schedule {
            Schedule::Delay { seconds } => {
                let due = offset_from(self.created_at, *seconds)?;
                Some((due - now).to_std().unwrap_or(std::time::Duration::ZERO))
            }
            Schedule::Cron { .. } => None,
        }
    }
}

/// Ids are used in URL paths, so keep them to ASCII letters, digits and
/// `-_.`.
pub fn validate_identifier(kind: &str, id: &str) -> AutomationResult<()> {
    if id.is_empty() {
        return Err(AutomationError::Validation(format!("{} id is required", kind)));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(AutomationError::Validation(format!(
            "{} id must contain only alphanumeric characters, dots, hyphens, and underscores",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_spec_requires_exactly_one_of_instruction_or_template() {
        assert!(matches!(
            TriggerSpec::from_parts(Some("summarise".into()), None, None),
            Ok(TriggerSpec::Instruction { .. })
        ));
        assert!(matches!(
            TriggerSpec::from_parts(None, Some("Hi {{name}}".into()), None),
            Ok(TriggerSpec::Template { .. })
        ));
        assert!(matches!(
            TriggerSpec::from_parts(Some("a".into()), Some("b".into()), None),
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            TriggerSpec::from_parts(None, None, None),
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            TriggerSpec::from_parts(Some("   ".into()), None, None),
            Err(AutomationError::Validation(_))
        ));
    }

    #[test]
    fn schedule_uses_tagged_wire_shape() {
        let delay: Schedule = serde_json::from_str(r#"{"type":"delay","seconds":300}"#).unwrap();
        assert_eq!(delay, Schedule::Delay { seconds: 300 });
        let cron: Schedule =
            serde_json::from_str(r#"{"type":"cron","expression":"0 9 * * *"}"#).unwrap();
        assert!(cron.is_recurring());
    }

    #[test]
    fn listener_expiry_is_relative_to_creation() {
        let created_at = Utc::now();
        let listener = Listener {
            id: "l1".into(),
            event_id: "door".into(),
            owner_id: "o1".into(),
            description: String::new(),
            trigger: TriggerSpec::Template { template: "x".into() },
            notify: false,
            options: ListenerOptions {
                auto_stop_after_single_event: false,
                auto_stop_after_delay_seconds: Some(60),
            },
            created_at,
            expires_in_seconds: Some(60),
        };
        assert!(!listener.is_expired_at(created_at + Duration::seconds(59)));
        assert!(listener.is_expired_at(created_at + Duration::seconds(61)));
    }

    #[test]
    fn remaining_delay_saturates_at_zero() {
        let now = Utc::now();
        let action = Action {
            action_id: "a1".into(),
            description: String::new(),
            owner_id: "o1".into(),
            schedule: Schedule::Delay { seconds: 300 },
            trigger: TriggerSpec::Template { template: "x".into() },
            notify: false,
            created_at: now - Duration::seconds(400),
        };
        assert_eq!(action.remaining_delay(now), Some(std::time::Duration::ZERO));

        let fresh = Action {
            created_at: now - Duration::seconds(100),
            ..action
        };
        let remaining = fresh.remaining_delay(now).unwrap();
        assert_eq!(remaining.as_secs(), 200);
    }

    #[test]
    fn identifier_validation_rejects_path_characters() {
        assert!(validate_identifier("Event", "front-door_1").is_ok());
        assert!(validate_identifier("Event", "").is_err());
        assert!(validate_identifier("Event", "a/b").is_err());
        assert!(validate_identifier("Event", "café").is_err());
        assert!(validate_identifier("Event", "门").is_err());
    }

    #[test]
    fn oversized_offsets_never_overflow() {
        let created_at = Utc::now();
        let listener = Listener {
            id: "l1".into(),
            event_id: "door".into(),
            owner_id: "o1".into(),
            description: String::new(),
            trigger: TriggerSpec::Template { template: "x".into() },
            notify: false,
            options: ListenerOptions::default(),
            created_at,
            expires_in_seconds: Some(10_000_000_000_000),
        };
        assert_eq!(listener.expires_at(), None);
        assert!(!listener.is_expired_at(created_at + Duration::days(365)));

        let action = Action {
            action_id: "a1".into(),
            description: String::new(),
            owner_id: "o1".into(),
            schedule: Schedule::Delay { seconds: u64::MAX },
            trigger: TriggerSpec::Template { template: "x".into() },
            notify: false,
            created_at,
        };
        assert_eq!(action.remaining_delay(created_at), None);

        let at_limit = Action {
            schedule: Schedule::Delay {
                seconds: MAX_OFFSET_SECONDS,
            },
            ..action
        };
        assert!(at_limit.remaining_delay(created_at).is_some());
    }
}

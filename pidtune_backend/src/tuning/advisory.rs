//! Conversation with the advisory model that proposes the next gain set.
//!
//! The transcript is replayed in full on every call so the model can see its
//! earlier suggestions and their outcomes. Any failure (transport, timeout,
//! unparseable reply) keeps the current gains.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::metrics::PerformanceMetrics;
use super::session::TuningSession;
use super::{Aggressiveness, GainSet, TuningMode};
use crate::llm_client::{AdvisoryService, Message, ROLE_SYSTEM};

const FIRST_OBJECT_PATTERN: &str = r"(?s)\{.*?\}";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in reply")]
    NoJsonObject,
    #[error("reply JSON is malformed: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("reply JSON is missing key '{0}'")]
    MissingKey(&'static str),
    #[error("reply JSON key '{0}' is not a number")]
    NotANumber(&'static str),
}

/// Ordered role-tagged message log. Only grows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_system(&self) -> bool {
        self.messages.iter().any(|m| m.role == ROLE_SYSTEM)
    }

    /// Adds the system instruction unless one is already present.
    /// Returns whether it was added.
    pub fn ensure_system(&mut self, instruction: &str) -> bool {
        if self.has_system() {
            return false;
        }
        self.messages.push(Message::system(instruction));
        true
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn count_role(&self, role: &str) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn system_instruction() -> String {
    let tier = |a: Aggressiveness, what: &str| {
        let (lo, hi) = a.change_range();
        format!("- '{}': {} ({}-{}% per step)", a, what, lo, hi)
    };

    format!(
        "You are a control engineer who tunes PID controllers. Over several rounds you refine \
the gains Kp (proportional gain), Ti (integral time) and Td (derivative time) of a \
controller in a unity feedback loop.\n\n\
Each round you receive the rise time, overshoot and settling time of the closed-loop step \
response together with the gains that produced it. Propose new gains for the requested \
tuning mode:\n\
- '{}': shorten rise and settling time while keeping the loop stable.\n\
- '{}': cut overshoot as far as possible while keeping response times acceptable.\n\
- '{}': improve all three metrics together, trading speed against damping.\n\n\
The user also sets how far you may move the gains:\n\
{}\n{}\n{}\n\n\
Never propose gains that would destabilize the loop.\n\
Answer with a JSON object: {{\"Kp\": value, \"Ti\": value, \"Td\": value}}",
        TuningMode::Speedup,
        TuningMode::ReduceOvershoot,
        TuningMode::Balanced,
        tier(Aggressiveness::Aggressive, "large changes"),
        tier(Aggressiveness::Moderate, "medium changes"),
        tier(Aggressiveness::Fine, "small changes"),
    )
}

pub fn build_user_message(
    metrics: &PerformanceMetrics,
    gains: &GainSet,
    mode: TuningMode,
    aggressiveness: Aggressiveness,
) -> String {
    format!(
        "Current closed-loop performance:\n\
- Rise time: {:.2} sec\n\
- Overshoot: {:.2} %\n\
- Settling time: {:.2} sec\n\n\
Current PID gains:\n\
- Kp = {}\n\
- Ti = {}\n\
- Td = {}\n\n\
Tuning mode: '{}'.\n\
Tuning aggressiveness: '{}'.\n\
Suggest new values for Kp, Ti and Td that improve performance. \
Respond with a JSON object with the keys Kp, Ti and Td.",
        metrics.rise_time,
        metrics.overshoot,
        metrics.settling_time,
        gains.kp,
        gains.ti,
        gains.td,
        mode,
        aggressiveness,
    )
}

/// Extracts a gain set from free-form model output: the first `{...}` span
/// (shortest match, across lines) must be a JSON object with numeric `Kp`,
/// `Ti` and `Td`.
pub fn parse_gain_reply(reply: &str) -> Result<GainSet, ParseError> {
    let object = first_brace_span(reply).ok_or(ParseError::NoJsonObject)?;
    tracing::debug!("Extracted JSON: {}", object);

    let value: serde_json::Value = serde_json::from_str(object)?;
    let number = |key: &'static str| -> Result<f64, ParseError> {
        value
            .get(key)
            .ok_or(ParseError::MissingKey(key))?
            .as_f64()
            .ok_or(ParseError::NotANumber(key))
    };

    Ok(GainSet {
        kp: number("Kp")?,
        ti: number("Ti")?,
        td: number("Td")?,
    })
}

fn first_brace_span(text: &str) -> Option<&str> {
    let re = regex_lite::Regex::new(FIRST_OBJECT_PATTERN).ok()?;
    re.find(text).map(|m| m.as_str())
}

/// Asks the advisory service for the next gain set and applies it to the
/// session. On any failure the session keeps its current gains.
///
/// Returns the gains in effect after the call.
pub async fn request_new_gains(
    session: &mut TuningSession,
    service: &dyn AdvisoryService,
    timeout: Duration,
) -> GainSet {
    let Some(latest) = session.history.latest().map(|entry| entry.metrics) else {
        tracing::warn!("No measured iteration yet; keeping current gains");
        return session.gains;
    };

    if session.transcript.ensure_system(&system_instruction()) {
        tracing::debug!("Added system instruction to transcript");
    }
    session.transcript.push(Message::user(build_user_message(
        &latest,
        &session.gains,
        session.mode,
        session.aggressiveness,
    )));
    session.advisory_calls += 1;

    let reply = match tokio::time::timeout(timeout, service.complete(session.transcript.messages()))
        .await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            session.advisory_fallbacks += 1;
            tracing::warn!("Error querying advisory model: {:#}; keeping current gains", e);
            return session.gains;
        }
        Err(_) => {
            session.advisory_fallbacks += 1;
            tracing::warn!(
                "Advisory model did not answer within {:?}; keeping current gains",
                timeout
            );
            return session.gains;
        }
    };

    tracing::debug!("Raw advisory reply:\n{}", reply);
    session.transcript.push(Message::assistant(reply.trim()));

    match parse_gain_reply(&reply) {
        Ok(gains) => {
            tracing::debug!("Advisory model proposed {}", gains);
            session.gains = gains;
        }
        Err(e) => {
            session.advisory_fallbacks += 1;
            tracing::warn!("Unusable advisory reply ({}); keeping current gains", e);
        }
    }

    session.gains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> PerformanceMetrics {
        PerformanceMetrics {
            rise_time: 2.0,
            overshoot: 12.3456,
            settling_time: 8.006,
            rise_time_pct: 0.0,
            overshoot_pct: 0.0,
            settling_time_pct: 0.0,
            early_stop: false,
        }
    }

    #[test]
    fn parses_plain_object() {
        let g = parse_gain_reply(r#"{"Kp": 1.2, "Ti": 3, "Td": 0.05}"#).unwrap();
        assert_eq!(g, GainSet::new(1.2, 3.0, 0.05));
    }

    #[test]
    fn parses_object_embedded_in_prose() {
        let reply = "Increase the gain a little.\n```json\n{\n  \"Kp\": 1.3,\n  \"Ti\": 0.9,\n  \"Td\": 0.1\n}\n```\nThis should speed things up.";
        assert_eq!(parse_gain_reply(reply).unwrap(), GainSet::new(1.3, 0.9, 0.1));
    }

    #[test]
    fn takes_the_first_object() {
        let reply = r#"{"Kp": 1, "Ti": 2, "Td": 3} or maybe {"Kp": 4, "Ti": 5, "Td": 6}"#;
        assert_eq!(parse_gain_reply(reply).unwrap(), GainSet::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn first_object_in_the_raw_reply_wins() {
        let tagged = "<think>{\"Kp\": 2, \"Ti\": 1, \"Td\": 0}</think>";
        assert_eq!(parse_gain_reply(tagged).unwrap(), GainSet::new(2.0, 1.0, 0.0));

        let two = "first {\"Kp\": 9, \"Ti\": 1, \"Td\": 0} then {\"Kp\": 1, \"Ti\": 1, \"Td\": 0}";
        assert_eq!(parse_gain_reply(two).unwrap(), GainSet::new(9.0, 1.0, 0.0));
    }

    #[test]
    fn first_span_is_used_even_when_it_is_not_json() {
        let reply = "maybe {Kp} should go up: {\"Kp\": 2, \"Ti\": 1, \"Td\": 0}";
        assert!(matches!(
            parse_gain_reply(reply),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn reply_without_braces_is_rejected() {
        assert!(matches!(
            parse_gain_reply("Kp should be 2.0"),
            Err(ParseError::NoJsonObject)
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse_gain_reply("{Kp: 2.0, Ti: 1.0, Td: 0.0}"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(matches!(
            parse_gain_reply(r#"{"Kp": 2.0, "Ti": 1.0}"#),
            Err(ParseError::MissingKey("Td"))
        ));
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        assert!(matches!(
            parse_gain_reply(r#"{"Kp": "2.0", "Ti": 1.0, "Td": 0.0}"#),
            Err(ParseError::NotANumber("Kp"))
        ));
    }

    #[test]
    fn nested_object_is_cut_at_first_closing_brace() {
        // The shortest span stops at the inner brace, which is not valid JSON.
        let reply = r#"{"gains": {"Kp": 1, "Ti": 1, "Td": 0}}"#;
        assert!(matches!(
            parse_gain_reply(reply),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn user_message_rounds_metrics_and_names_settings() {
        let msg = build_user_message(
            &metrics(),
            &GainSet::new(1.5, 2.0, 0.25),
            TuningMode::ReduceOvershoot,
            Aggressiveness::Fine,
        );
        assert!(msg.contains("Rise time: 2.00 sec"));
        assert!(msg.contains("Overshoot: 12.35 %"));
        assert!(msg.contains("Settling time: 8.01 sec"));
        assert!(msg.contains("Kp = 1.5"));
        assert!(msg.contains("Td = 0.25"));
        assert!(msg.contains("'reduce_overshoot'"));
        assert!(msg.contains("'fine'"));
        assert!(msg.contains("JSON"));
    }

    #[test]
    fn user_message_tolerates_nan() {
        let mut m = metrics();
        m.rise_time = f64::NAN;
        let msg = build_user_message(
            &m,
            &GainSet::default(),
            TuningMode::Speedup,
            Aggressiveness::Moderate,
        );
        assert!(msg.contains("Rise time: NaN sec"));
    }

    #[test]
    fn system_instruction_lists_modes_and_ranges() {
        let text = system_instruction();
        for needle in [
            "'speedup'",
            "'reduce_overshoot'",
            "'balanced'",
            "40-50%",
            "10-30%",
            "1-5%",
            r#"{"Kp": value, "Ti": value, "Td": value}"#,
        ] {
            assert!(text.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn system_message_is_inserted_once() {
        let mut t = Transcript::new();
        assert!(t.ensure_system("a"));
        assert!(!t.ensure_system("b"));
        t.push(Message::user("u"));
        assert!(!t.ensure_system("c"));
        assert_eq!(t.count_role(ROLE_SYSTEM), 1);
        assert_eq!(t.messages()[0].content, "a");
    }
}

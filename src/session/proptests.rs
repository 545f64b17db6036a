//! Property-based tests for session transitions
//!
//! Random event sequences are driven through `transition`, checking:
//! - History never exceeds its capacity
//! - Events tagged with another turn are always rejected
//! - Halting effects come before anything else a transition asks for
//! - A gateway call is never issued while one is already in flight
//! - Every accepted event publishes the committed state exactly once

use super::*;
use crate::config::VoiceConfig;
use crate::gateway::GatewayError;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Event shape, resolved against the live turn when applied
#[derive(Debug, Clone)]
struct EventSpec {
    kind: u8,
    stale: bool,
    text: String,
}

const EVENT_KINDS: u8 = 14;

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Tạo công thức phở bò".to_string()),
        Just("Món chay cho bữa tối".to_string()),
        "[a-z ]{1,12}",
    ]
}

fn arb_event_spec() -> impl Strategy<Value = EventSpec> {
    (0..EVENT_KINDS, prop::bool::weighted(0.15), arb_text())
        .prop_map(|(kind, stale, text)| EventSpec { kind, stale, text })
}

fn arb_event_sequence() -> impl Strategy<Value = Vec<EventSpec>> {
    prop::collection::vec(arb_event_spec(), 1..60)
}

impl EventSpec {
    fn resolve(&self, current_turn: u64) -> Event {
        let turn = if self.stale {
            current_turn + 1
        } else {
            current_turn
        };
        let text = self.text.clone();
        match self.kind {
            0 => Event::StartListening,
            1 => Event::SubmitText { text },
            2 => Event::Cancel,
            3 => Event::Close {
                clear_history: self.stale,
            },
            4 => Event::TranscriptInterim { turn, text },
            5 => Event::TranscriptFinalized { turn, text },
            6 => Event::RecognitionError { turn, message: text },
            7 => Event::RecognitionEnded { turn },
            8 => Event::ResponseReceived {
                turn,
                text: (!text.is_empty()).then_some(text),
                received_at: Utc::now(),
                duration_ms: 10,
            },
            9 => Event::GatewayFailed {
                turn,
                error: GatewayError::Throttled,
            },
            10 => Event::SynthesisComplete { turn },
            11 => Event::SynthesisFailed { turn, message: text },
            12 => Event::ErrorSurfaced { turn },
            _ => Event::TranscriptFinalized {
                turn,
                text: "Cách làm bánh mì".into(),
            },
        }
    }
}

fn ctx(capacity: usize) -> SessionContext {
    SessionContext::new(
        "prop-session",
        VoiceConfig {
            history_capacity: capacity,
            ..VoiceConfig::default()
        },
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_history_is_bounded(specs in arb_event_sequence(), capacity in 1usize..5) {
        let context = ctx(capacity);
        let mut session = Session::new(capacity);
        for spec in &specs {
            if let Ok(result) = transition(&session, &context, spec.resolve(session.turn)) {
                session = result.new_session;
            }
            prop_assert!(session.history.len() <= capacity);
        }
    }

    #[test]
    fn prop_stale_events_are_rejected(specs in arb_event_sequence()) {
        let context = ctx(10);
        let mut session = Session::new(10);
        for spec in &specs {
            let event = spec.resolve(session.turn);
            let tagged = event.turn();
            match transition(&session, &context, event) {
                Ok(result) => {
                    prop_assert!(tagged.is_none() || tagged == Some(session.turn));
                    session = result.new_session;
                }
                Err(TransitionError::StaleEvent { current, got }) => {
                    prop_assert_eq!(current, session.turn);
                    prop_assert_ne!(got, current);
                }
                Err(_) => {}
            }
        }
    }

    #[test]
    fn prop_halting_effects_come_first(specs in arb_event_sequence()) {
        let context = ctx(10);
        let mut session = Session::new(10);
        for spec in &specs {
            if let Ok(result) = transition(&session, &context, spec.resolve(session.turn)) {
                let first_other = result.effects.iter().position(|e| !e.is_halting());
                if let Some(first_other) = first_other {
                    prop_assert!(
                        result.effects[first_other..].iter().all(|e| !e.is_halting()),
                        "halting effect after {:?}", result.effects
                    );
                }
                session = result.new_session;
            }
        }
    }

    #[test]
    fn prop_single_gateway_call_in_flight(specs in arb_event_sequence()) {
        let context = ctx(10);
        let mut session = Session::new(10);
        for spec in &specs {
            if let Ok(result) = transition(&session, &context, spec.resolve(session.turn)) {
                let calls = result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::CallGateway { .. }))
                    .count();
                prop_assert!(calls <= 1);
                if calls == 1 {
                    let was_processing = matches!(session.state, SessionState::Processing { .. });
                    prop_assert!(!was_processing);
                    let now_processing =
                        matches!(result.new_session.state, SessionState::Processing { .. });
                    prop_assert!(now_processing);
                }
                session = result.new_session;
            }
        }
    }

    #[test]
    fn prop_accepted_events_publish_once(specs in arb_event_sequence()) {
        let context = ctx(10);
        let mut session = Session::new(10);
        for spec in &specs {
            if let Ok(result) = transition(&session, &context, spec.resolve(session.turn)) {
                let publishes = result
                    .effects
                    .iter()
                    .filter(|e| **e == Effect::PublishState)
                    .count();
                prop_assert_eq!(publishes, 1);
                prop_assert!(result.new_session.turn >= session.turn);
                session = result.new_session;
            }
        }
    }

    #[test]
    fn prop_entering_listening_starts_recognition(specs in arb_event_sequence()) {
        let context = ctx(10);
        let mut session = Session::new(10);
        for spec in &specs {
            if let Ok(result) = transition(&session, &context, spec.resolve(session.turn)) {
                let entered = session.state != SessionState::Listening
                    && result.new_session.state == SessionState::Listening;
                if entered {
                    let starts = result
                        .effects
                        .iter()
                        .any(|e| matches!(e, Effect::StartRecognition { .. }));
                    prop_assert!(starts);
                }
                session = result.new_session;
            }
        }
    }
}

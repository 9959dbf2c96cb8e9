//! Synthetic page-view style events.

use std::time::SystemTime;

use rand::Rng;
use serde::Serialize;

const PATHS: [&str; 5] = ["/", "/products", "/cart", "/checkout", "/profile"];
const USER_AGENTS: [&str; 3] = ["Chrome/91.0", "Firefox/89.0", "Safari/14.0"];

/// One unit of load, shaped like the ingest endpoint's request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticEvent {
    pub session_id: String,
    pub event_type: String,
    /// JSON object serialized to a string (`path`, `userAgent`, `timestamp`, `randomValue`).
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct EventFactory {
    event_type: String,
    session_pool: u64,
}

impl EventFactory {
    /// `session_pool` is clamped to at least one session.
    pub fn new(event_type: impl Into<String>, session_pool: u64) -> Self {
        Self {
            event_type: event_type.into(),
            session_pool: session_pool.max(1),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn session_pool(&self) -> u64 {
        self.session_pool
    }

    pub fn generate(&self, session_seed: u64) -> SyntheticEvent {
        self.generate_with(&mut rand::thread_rng(), session_seed)
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R, session_seed: u64) -> SyntheticEvent {
        let path = PATHS[rng.gen_range(0..PATHS.len())];
        let user_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];
        let random_value: f64 = rng.r#gen();

        let payload = serde_json::json!({
            "path": path,
            "userAgent": user_agent,
            "timestamp": humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
            "randomValue": random_value,
        });

        SyntheticEvent {
            session_id: format!("session-{session_seed}"),
            event_type: self.event_type.clone(),
            payload: payload.to_string(),
        }
    }

    /// Generates an event for a session drawn uniformly from the pool.
    pub fn next_event(&self) -> SyntheticEvent {
        self.next_event_with(&mut rand::thread_rng())
    }

    pub fn next_event_with<R: Rng + ?Sized>(&self, rng: &mut R) -> SyntheticEvent {
        let seed = rng.gen_range(0..self.session_pool);
        self.generate_with(rng, seed)
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new(crate::runner::DEFAULT_EVENT_TYPE, 1000)
    }
}

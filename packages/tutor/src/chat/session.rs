//! Process-wide session state.
//!
//! A single logical primary is assumed; state lives in one in-process map
//! keyed by session id.

use std::collections::HashMap;
use std::sync::RwLock;

/// Pronoun register used when addressing the user (Vietnamese has
/// several; the default is the neutral teacher/student pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PronounStyle {
    /// bạn / mình (neutral)
    Neutral,
    /// em / thầy (student addressing teacher)
    Formal,
}

/// Per-session counters and style.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub total_responses: u32,
    pub is_first_message: bool,
    pub pronoun_style: PronounStyle,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            total_responses: 0,
            is_first_message: true,
            pronoun_style: PronounStyle::Neutral,
        }
    }
}

/// Registry of session states.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a session (default for unseen sessions).
    pub fn state(&self, session_id: &str) -> SessionState {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Record a delivered response.
    pub fn record_response(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        let state = sessions.entry(session_id.to_string()).or_default();
        state.total_responses += 1;
        state.is_first_message = false;
    }

    pub fn set_pronoun_style(&self, session_id: &str, style: PronounStyle) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.entry(session_id.to_string()).or_default().pronoun_style = style;
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let registry = SessionRegistry::new();

        let fresh = registry.state("s1");
        assert!(fresh.is_first_message);
        assert_eq!(fresh.total_responses, 0);

        registry.record_response("s1");
        registry.record_response("s1");

        let state = registry.state("s1");
        assert!(!state.is_first_message);
        assert_eq!(state.total_responses, 2);

        registry.clear_session("s1");
        assert!(registry.state("s1").is_first_message);
    }
}

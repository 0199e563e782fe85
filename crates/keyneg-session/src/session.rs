//! Per-policy negotiation session state.

use std::time::Instant;

use keyneg_crypto::derive_key;
use keyneg_types::{KEY_SIZE, NONCE_SIZE};

/// Lifecycle states of a session.
///
/// Transitions only move forward: WaitR2 → WaitConfirm → Done on the
/// initiator, WaitConfirm → Done on the responder. Failed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initiator waiting for the responder's nonce.
    WaitR2,
    /// Responder (or confirming initiator) waiting for the exchange to close.
    WaitConfirm,
    /// Shared key established.
    Done,
    /// Abandoned.
    Failed,
}

/// Per-policy negotiation state, owned by the session table.
#[derive(Debug, Clone)]
pub struct Session {
    /// Policy id, the session identifier. Never zero.
    pub policy_id: u32,
    /// Current protocol state.
    pub state: SessionState,
    /// Initiator's nonce. On the responder side this is the received RANDOM1
    /// payload.
    pub random1: [u8; NONCE_SIZE],
    /// Responder's nonce, once known.
    pub random2: Option<[u8; NONCE_SIZE]>,
    /// Derived shared key. Populated exactly once, after both nonces are
    /// known.
    pub key: Option<[u8; KEY_SIZE]>,
    /// Creation instant; drives latency measurement and the timeout sweep.
    pub started: Instant,
}

impl Session {
    /// New initiator-side session, waiting for RANDOM2.
    pub fn initiator(policy_id: u32, random1: [u8; NONCE_SIZE]) -> Self {
        Self {
            policy_id,
            state: SessionState::WaitR2,
            random1,
            random2: None,
            key: None,
            started: Instant::now(),
        }
    }

    /// New responder-side session. Both nonces are known at creation, so the
    /// key is derived immediately and the session waits for CONFIRM.
    pub fn responder(policy_id: u32, random1: [u8; NONCE_SIZE], random2: [u8; NONCE_SIZE]) -> Self {
        let key = derive_key(&random1, &random2);
        Self {
            policy_id,
            state: SessionState::WaitConfirm,
            random1,
            random2: Some(random2),
            key: Some(key),
            started: Instant::now(),
        }
    }

    /// Store the responder's nonce and derive the key (initiator side).
    pub fn complete_with(&mut self, random2: [u8; NONCE_SIZE]) {
        self.key = Some(derive_key(&self.random1, &random2));
        self.random2 = Some(random2);
    }

    /// Milliseconds since the session was created.
    pub fn age_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responder_session_has_key_at_creation() {
        let r1 = [1u8; 32];
        let r2 = [2u8; 32];
        let session = Session::responder(77, r1, r2);
        assert_eq!(session.state, SessionState::WaitConfirm);
        assert_eq!(session.key, Some(derive_key(&r1, &r2)));
    }

    #[test]
    fn test_initiator_session_derives_key_once_completed() {
        let r1 = [3u8; 32];
        let mut session = Session::initiator(78, r1);
        assert_eq!(session.state, SessionState::WaitR2);
        assert!(session.key.is_none());
        assert!(session.random2.is_none());

        let r2 = [4u8; 32];
        session.complete_with(r2);
        assert_eq!(session.random2, Some(r2));
        assert_eq!(session.key, Some(derive_key(&r1, &r2)));
    }
}

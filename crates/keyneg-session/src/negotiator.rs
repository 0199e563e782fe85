//! The negotiation engine.
//!
//! A symmetric three-message exchange keyed by policy id: the initiator
//! sends its nonce (RANDOM1), the responder answers with its own (RANDOM2)
//! and derives the key, the initiator confirms (CONFIRM) and derives the
//! same key. An endpoint is either initiator or responder for a given id,
//! never both; the initiator wins the id and spurious RANDOM1 frames are
//! dropped.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use keyneg_crypto::generate_nonce;
use keyneg_types::{NegotiateError, NegotiateResult};
use keyneg_wire::{NegotiationPacket, PacketType};

use crate::session::{Session, SessionState};
use crate::table::SessionTable;
use crate::{MetricsSink, PacketSender};

/// Drives the protocol state machine for every in-flight session.
///
/// All entry points are `&self`; the shard locks in the table serialize
/// observations per policy id. The engine never blocks on I/O while holding
/// a shard lock: session data is snapshotted under the lock, the lock is
/// released, then the sender runs.
pub struct Negotiator {
    table: SessionTable,
    sender: Arc<dyn PacketSender>,
    metrics: Arc<dyn MetricsSink>,
}

impl Negotiator {
    /// Create an engine that emits packets through `sender` and reports
    /// outcomes to `metrics`.
    pub fn new(sender: Arc<dyn PacketSender>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            table: SessionTable::new(),
            sender,
            metrics,
        }
    }

    /// Start a negotiation as initiator: create the session in WaitR2 and
    /// send RANDOM1 to the peer synchronously.
    pub fn start_negotiation(&self, policy_id: u32, peer: SocketAddrV4) -> NegotiateResult<()> {
        if policy_id == 0 {
            tracing::debug!("ignoring start with reserved policy id 0");
            return Err(NegotiateError::InvalidParam);
        }

        let random1 = generate_nonce()?;
        if !self.table.insert_if_absent(Session::initiator(policy_id, random1)) {
            tracing::debug!(policy_id, "session already exists");
            return Err(NegotiateError::AlreadyExists);
        }

        tracing::debug!(policy_id, peer = %peer, "starting negotiation");
        let packet = NegotiationPacket::new(PacketType::Random1, policy_id, &random1);
        if let Err(e) = self.sender.send_packet(&packet, peer) {
            tracing::warn!(policy_id, error = %e, "failed to send RANDOM1");
        }
        Ok(())
    }

    /// Handle one inbound packet, dispatching on its type.
    pub fn handle_packet(&self, packet: &NegotiationPacket, src: SocketAddrV4) -> NegotiateResult<()> {
        let policy_id = packet.policy_id();
        if policy_id == 0 {
            tracing::debug!("dropping packet with reserved policy id 0");
            return Err(NegotiateError::InvalidParam);
        }

        match packet.header.packet_type {
            PacketType::Random1 => self.handle_random1(packet, policy_id, src),
            PacketType::Random2 => self.handle_random2(packet, policy_id, src),
            PacketType::Confirm => self.handle_confirm(packet, policy_id),
        }
    }

    /// Read-only snapshot of a session.
    pub fn session(&self, policy_id: u32) -> Option<Session> {
        self.table.get(policy_id)
    }

    /// Number of in-flight sessions.
    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    /// Remove sessions older than their policy's timeout.
    ///
    /// Unfinished sessions are reported to the metrics sink as failures;
    /// completed ones were already counted and are only reclaimed. Returns
    /// the number of sessions removed.
    pub fn sweep_expired(&self, timeout_for: impl Fn(u32) -> Duration) -> usize {
        let mut abandoned: Vec<(u32, u32)> = Vec::new();
        let removed = self.table.sweep(|session| {
            if session.started.elapsed() < timeout_for(session.policy_id) {
                return false;
            }
            if session.state != SessionState::Done {
                abandoned.push((session.policy_id, session.age_ms()));
            }
            true
        });

        for &(policy_id, age_ms) in &abandoned {
            self.metrics.record_negotiation(age_ms, false);
            tracing::debug!(policy_id, age_ms, "session timed out");
        }
        removed.len()
    }

    /// Become responder: adopt the initiator's nonce, answer with our own and
    /// derive the key. A frame for an id we already track is a duplicate or
    /// cross-wired initiator and is dropped without touching the session.
    fn handle_random1(
        &self,
        packet: &NegotiationPacket,
        policy_id: u32,
        src: SocketAddrV4,
    ) -> NegotiateResult<()> {
        if self.table.get(policy_id).is_some() {
            tracing::trace!(policy_id, "ignoring RANDOM1 for existing session");
            return Ok(());
        }

        let Some(random1) = packet.payload_nonce() else {
            tracing::debug!(policy_id, "RANDOM1 payload too short");
            return Err(NegotiateError::InvalidParam);
        };

        let random2 = generate_nonce()?;
        if !self
            .table
            .insert_if_absent(Session::responder(policy_id, random1, random2))
        {
            // Lost a race with another frame for the same id; first one wins.
            tracing::trace!(policy_id, "ignoring RANDOM1 for existing session");
            return Ok(());
        }

        tracing::debug!(policy_id, peer = %src, "responding to RANDOM1");
        let response = NegotiationPacket::new(PacketType::Random2, policy_id, &random2);
        if let Err(e) = self.sender.send_packet(&response, src) {
            tracing::warn!(policy_id, error = %e, "failed to send RANDOM2");
        }
        Ok(())
    }

    /// Initiator side: adopt the responder's nonce, derive the key, confirm,
    /// and finish. CONFIRM is sent before the Done transition; a failed send
    /// still advances the state and the peer retries or times out.
    fn handle_random2(
        &self,
        packet: &NegotiationPacket,
        policy_id: u32,
        src: SocketAddrV4,
    ) -> NegotiateResult<()> {
        let Some(random2) = packet.payload_nonce() else {
            tracing::debug!(policy_id, "RANDOM2 payload too short");
            return Err(NegotiateError::InvalidParam);
        };

        let started = self.table.update(policy_id, |session| {
            if session.state != SessionState::WaitR2 {
                return None;
            }
            session.complete_with(random2);
            session.state = SessionState::WaitConfirm;
            Some(session.started)
        });

        let started = match started {
            Some(Some(started)) => started,
            Some(None) => {
                tracing::debug!(policy_id, "RANDOM2 in unexpected state");
                return Err(NegotiateError::InvalidParam);
            }
            None => {
                tracing::debug!(policy_id, "RANDOM2 for unknown session");
                return Err(NegotiateError::InvalidParam);
            }
        };

        let confirm = NegotiationPacket::new(PacketType::Confirm, policy_id, &[]);
        if let Err(e) = self.sender.send_packet(&confirm, src) {
            tracing::warn!(policy_id, error = %e, "failed to send CONFIRM");
        }

        self.table
            .update(policy_id, |session| session.state = SessionState::Done);
        let duration_ms = started.elapsed().as_millis() as u32;
        self.metrics.record_negotiation(duration_ms, true);
        tracing::debug!(policy_id, duration_ms, "negotiation complete (initiator)");
        Ok(())
    }

    /// Responder side: the exchange is closed.
    fn handle_confirm(&self, packet: &NegotiationPacket, policy_id: u32) -> NegotiateResult<()> {
        if !packet.payload.is_empty() {
            tracing::debug!(policy_id, "CONFIRM carries unexpected payload");
            return Err(NegotiateError::InvalidParam);
        }

        let started = self.table.update(policy_id, |session| {
            if session.state != SessionState::WaitConfirm {
                return None;
            }
            session.state = SessionState::Done;
            Some(session.started)
        });

        match started {
            Some(Some(started)) => {
                let duration_ms = started.elapsed().as_millis() as u32;
                self.metrics.record_negotiation(duration_ms, true);
                tracing::debug!(policy_id, duration_ms, "negotiation complete (responder)");
                Ok(())
            }
            Some(None) => {
                // An initiator still in WaitR2 relies on the peer not sending
                // CONFIRM first; this is a protocol violation.
                tracing::warn!(policy_id, "CONFIRM in unexpected state");
                Err(NegotiateError::InvalidParam)
            }
            None => {
                tracing::debug!(policy_id, "CONFIRM for unknown session");
                Err(NegotiateError::InvalidParam)
            }
        }
    }
}

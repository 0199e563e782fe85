//! Daemon supervisor: component wiring, hot loops and shutdown.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use keyneg_session::{MetricsSink, Negotiator, PacketSender};
use keyneg_types::{NegotiateError, PolicyConfig};

use crate::config::Config;
use crate::control::ControlServer;
use crate::registry::PolicyRegistry;
use crate::stats::StatsSink;
use crate::transport::UdpTransport;

/// Cadence of the timeout sweep.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Cadence of the stats emitter.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Receive wait per loop iteration; bounds shutdown latency.
const RECV_WAIT: Duration = Duration::from_millis(100);

/// Process-wide shutdown flag, flipped by the signal handler. The one piece
/// of global state in the daemon.
static RUNNING: AtomicBool = AtomicBool::new(true);

/// Errors that stop the daemon from starting.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to bind UDP port {port}: {source}")]
    UdpBind { port: u16, source: io::Error },
    #[error("failed to bind control socket {path}: {source}")]
    ControlBind { path: PathBuf, source: io::Error },
}

/// One JSON command from the control socket.
#[derive(Deserialize)]
struct ControlCommand {
    action: String,
    #[serde(default)]
    policy: Option<PolicyConfig>,
}

/// Owns every component and runs the daemon until shutdown.
pub struct Core {
    transport: Arc<UdpTransport>,
    control: ControlServer,
    registry: Arc<PolicyRegistry>,
    stats: Arc<StatsSink>,
    negotiator: Arc<Negotiator>,
    udp_addr: SocketAddr,
    default_timeout: Duration,
}

impl Core {
    /// Bind the sockets and wire the components together. A failure here is
    /// a startup failure and exits the process non-zero.
    pub fn new(config: &Config) -> Result<Self, CoreError> {
        let port = config.network.udp_port;
        let transport = Arc::new(UdpTransport::bind(port).map_err(|source| {
            CoreError::UdpBind { port, source }
        })?);
        let udp_addr = transport.local_addr().map_err(|source| {
            CoreError::UdpBind { port, source }
        })?;

        let control = ControlServer::bind(&config.network.unix_socket_path).map_err(|source| {
            CoreError::ControlBind {
                path: config.network.unix_socket_path.clone(),
                source,
            }
        })?;

        let registry = Arc::new(PolicyRegistry::new());
        let stats = Arc::new(StatsSink::new());
        let negotiator = Arc::new(Negotiator::new(
            Arc::clone(&transport) as Arc<dyn PacketSender>,
            Arc::clone(&stats) as Arc<dyn MetricsSink>,
        ));

        Ok(Self {
            transport,
            control,
            registry,
            stats,
            negotiator,
            udp_addr,
            default_timeout: Duration::from_millis(config.negotiation.timeout_ms as u64),
        })
    }

    /// Run the daemon until SIGINT or SIGTERM.
    ///
    /// The control loop is pinned to core 0 and the receive loop to core 1;
    /// the stats emitter and the timeout sweep run unpinned. All threads are
    /// joined before this returns.
    pub fn run(&self) {
        install_signal_handlers();
        lock_memory();

        tracing::info!(
            udp = %self.udp_addr,
            control = %self.control.path().display(),
            "daemon started"
        );

        thread::scope(|scope| {
            scope.spawn(|| {
                pin_to_core(0);
                self.control.run(&RUNNING, |command| {
                    handle_control_command(command, &self.registry, &self.negotiator)
                });
            });

            scope.spawn(|| {
                pin_to_core(1);
                receive_loop(&self.transport, &self.negotiator);
            });

            scope.spawn(|| {
                while RUNNING.load(Ordering::Relaxed) {
                    thread::sleep(STATS_INTERVAL);
                    self.stats.emit();
                }
            });

            scope.spawn(|| {
                while RUNNING.load(Ordering::Relaxed) {
                    thread::sleep(SWEEP_INTERVAL);
                    self.negotiator.sweep_expired(|policy_id| {
                        self.registry
                            .get(policy_id)
                            .map(|policy| Duration::from_millis(policy.timeout_ms as u64))
                            .unwrap_or(self.default_timeout)
                    });
                }
            });
        });

        tracing::info!("daemon stopped");
    }
}

/// Pull datagrams off the wire and hand them to the engine. Malformed frames
/// and protocol violations are dropped; the loop never exits on them.
fn receive_loop(transport: &UdpTransport, negotiator: &Negotiator) {
    while RUNNING.load(Ordering::Relaxed) {
        match transport.recv_packet(RECV_WAIT) {
            Ok((packet, src)) => {
                if let Err(e) = negotiator.handle_packet(&packet, src) {
                    tracing::debug!(
                        policy_id = packet.policy_id(),
                        peer = %src,
                        error = %e,
                        "dropped packet"
                    );
                }
            }
            Err(NegotiateError::Timeout) => {}
            Err(e) => {
                tracing::debug!(error = %e, "receive error");
            }
        }
    }
}

/// Parse and apply one control command.
///
/// `add` inserts the policy and immediately starts the negotiation; unknown
/// actions are logged and ignored; parse errors are logged. The connection
/// was already closed by the listener either way.
pub fn handle_control_command(command: &str, registry: &PolicyRegistry, negotiator: &Negotiator) {
    tracing::debug!(command, "control command received");
    let parsed: ControlCommand = match serde_json::from_str(command) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse control command");
            return;
        }
    };

    match parsed.action.as_str() {
        "add" => {
            let Some(policy) = parsed.policy else {
                tracing::error!("add command without a policy");
                return;
            };
            if policy.policy_id == 0 {
                tracing::error!("rejecting policy with reserved id 0");
                return;
            }

            let policy_id = policy.policy_id;
            let peer = policy.peer_addr();
            if !registry.add(policy) {
                tracing::warn!(policy_id, "policy rejected, duplicate id or registry full");
                return;
            }
            tracing::info!(policy_id, peer = %peer, "policy added");

            if let Err(e) = negotiator.start_negotiation(policy_id, peer) {
                tracing::warn!(policy_id, error = %e, "failed to start negotiation");
            }
        }
        other => {
            tracing::warn!(action = other, "unknown control action ignored");
        }
    }
}

extern "C" fn handle_signal(_signum: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

/// Pin the calling thread to one CPU core. Failure is logged, not fatal.
fn pin_to_core(core: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            tracing::warn!(core, "failed to pin thread to core");
        }
    }
}

/// Lock current and future pages to keep paging jitter out of the hot path.
fn lock_memory() {
    if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
        tracing::warn!("mlockall failed, continuing without locked memory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyneg_session::SessionState;
    use keyneg_wire::NegotiationPacket;
    use parking_lot::Mutex;
    use std::net::SocketAddrV4;

    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(NegotiationPacket, SocketAddrV4)>>,
    }

    impl PacketSender for CapturingSender {
        fn send_packet(
            &self,
            packet: &NegotiationPacket,
            peer: SocketAddrV4,
        ) -> Result<(), NegotiateError> {
            self.sent.lock().push((packet.clone(), peer));
            Ok(())
        }
    }

    fn command_fixture() -> (Arc<CapturingSender>, Arc<PolicyRegistry>, Negotiator) {
        let sender = Arc::new(CapturingSender::default());
        let registry = Arc::new(PolicyRegistry::new());
        let negotiator = Negotiator::new(
            Arc::clone(&sender) as Arc<dyn PacketSender>,
            Arc::new(StatsSink::new()) as Arc<dyn MetricsSink>,
        );
        (sender, registry, negotiator)
    }

    #[test]
    fn test_add_command_registers_and_starts() {
        let (sender, registry, negotiator) = command_fixture();
        handle_control_command(
            r#"{"action": "add",
                "policy": {"policy_id": 77, "remote_ip": "127.0.0.1",
                           "remote_port": 7700, "timeout_ms": 500, "retry_times": 3}}"#,
            &registry,
            &negotiator,
        );

        assert!(registry.contains(77));
        assert_eq!(
            negotiator.session(77).unwrap().state,
            SessionState::WaitR2
        );
        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "127.0.0.1:7700".parse().unwrap());
    }

    #[test]
    fn test_duplicate_add_rejected_by_registry() {
        let (sender, registry, negotiator) = command_fixture();
        let command = r#"{"action": "add",
            "policy": {"policy_id": 5, "remote_ip": "127.0.0.1", "remote_port": 7700}}"#;
        handle_control_command(command, &registry, &negotiator);
        handle_control_command(command, &registry, &negotiator);

        assert_eq!(registry.len(), 1);
        assert_eq!(sender.sent.lock().len(), 1);
    }

    #[test]
    fn test_zero_policy_id_rejected() {
        let (sender, registry, negotiator) = command_fixture();
        handle_control_command(
            r#"{"action": "add",
                "policy": {"policy_id": 0, "remote_ip": "127.0.0.1", "remote_port": 7700}}"#,
            &registry,
            &negotiator,
        );
        assert!(registry.is_empty());
        assert!(sender.sent.lock().is_empty());
    }

    #[test]
    fn test_unknown_action_and_bad_json_ignored() {
        let (sender, registry, negotiator) = command_fixture();
        handle_control_command(r#"{"action": "refresh"}"#, &registry, &negotiator);
        handle_control_command("not json at all", &registry, &negotiator);
        assert!(registry.is_empty());
        assert!(sender.sent.lock().is_empty());
        assert_eq!(negotiator.session_count(), 0);
    }
}

use crate::config::Conf;
use crate::engine::MesosHandler;
use crate::errors::LocatorErr;
use crate::reload;
use crate::shared::net::{DnsHandler, DnsRead, DnsWrite};
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// States of the Resolver lifecycle (§4.9):
/// `Booting -> WaitingForLeader -> Serving <-> Degraded -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Booting,
    WaitingForLeader,
    Serving,
    Degraded,
    Terminated,
}

/// Top-level coordinator tying the Reload Loop, the Record Store and the DNS
/// Engine together, and tracking the process lifecycle state machine. Wraps
/// a [`MesosHandler`] and forwards DNS requests to it unchanged; `Resolver`
/// itself owns everything the handler doesn't need at request time (the
/// leader hint, the periodic reload driver, the lifecycle state).
pub struct Resolver {
    conf: Arc<Conf>,
    store: Arc<Store>,
    leader_hint: Arc<RwLock<String>>,
    state: RwLock<ResolverState>,
    handler: MesosHandler,
}

impl Resolver {
    pub fn new(conf: Arc<Conf>, store: Arc<Store>) -> Self {
        let handler = MesosHandler::new(Arc::clone(&conf), Arc::clone(&store));
        Resolver {
            conf,
            store,
            leader_hint: Arc::new(RwLock::new(String::new())),
            state: RwLock::new(ResolverState::Booting),
            handler,
        }
    }

    pub fn state(&self) -> ResolverState {
        *self.state.read().unwrap()
    }

    fn set_state(&self, state: ResolverState) {
        *self.state.write().unwrap() = state;
    }

    /// Marks the transition out of `Booting` once the DNS listeners are
    /// bound and about to accept connections.
    pub fn listeners_bound(&self) {
        self.set_state(ResolverState::WaitingForLeader);
    }

    /// Runs the first Reload synchronously, blocking `WaitingForLeader`
    /// (§10.4). On success the Resolver starts `Serving`; on failure it
    /// stays `WaitingForLeader` and the caller may retry or exit fatally.
    pub fn bootstrap(&self) -> Result<(), LocatorErr> {
        reload::reload_once(&self.leader_hint, &self.conf.masters, &self.conf, &self.store)?;
        self.set_state(ResolverState::Serving);
        Ok(())
    }

    /// Spawns the periodic Reload driver, updating the lifecycle state on
    /// each cycle's outcome (`Serving <-> Degraded`) rather than discarding
    /// the result, since the state machine needs it unlike the bare loop in
    /// [`reload::spawn_periodic`].
    pub fn spawn_periodic_reloads(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
        let period = self.conf.refresh_period();
        let resolver = self;
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                reload::sleep_or_wake(period, &shutdown);
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                match reload::reload_once(&resolver.leader_hint, &resolver.conf.masters, &resolver.conf, &resolver.store) {
                    Ok(()) => resolver.set_state(ResolverState::Serving),
                    Err(_) if resolver.state() == ResolverState::Serving => resolver.set_state(ResolverState::Degraded),
                    Err(_) => {}
                }
            }
        })
    }

    /// Terminal transition, any state -> `Terminated` (§4.9), reached on a
    /// fatal listener error (the blocking `start_servers` call returning).
    pub fn terminate(&self) {
        self.set_state(ResolverState::Terminated);
    }
}

impl DnsHandler for Resolver {
    fn handle_request<R: DnsRead, W: DnsWrite>(&self, req: R, resp: W) {
        self.handler.handle_request(req, resp);
    }
}

/// A leader descriptor as delivered by the coordination-service collaborator
/// (§6): either a hostname or a packed big-endian IPv4 address, plus a port.
/// An absent descriptor means "no leader".
pub enum LeaderHost {
    Name(String),
    PackedIpv4(u32),
}

impl LeaderHost {
    fn to_host_string(&self) -> String {
        match self {
            LeaderHost::Name(name) => name.clone(),
            LeaderHost::PackedIpv4(packed) => std::net::Ipv4Addr::from(packed.to_be_bytes()).to_string(),
        }
    }
}

pub struct LeaderDescriptor {
    pub id: String,
    pub host: LeaderHost,
    pub port: u16,
}

impl Resolver {
    /// The callback seam a coordination-service collaborator invokes on
    /// leader changes (§6). Formats the descriptor as `"id@host:port"` and
    /// writes it to the leader slot under an exclusive lock; `None` clears
    /// it, meaning "no leader".
    pub fn apply_leader_update(&self, descriptor: Option<LeaderDescriptor>) {
        let formatted = match descriptor {
            None => String::new(),
            Some(d) => format!("{}@{}:{}", d.id, d.host.to_host_string(), d.port),
        };
        *self.leader_hint.write().unwrap() = formatted;
    }
}

/// No-op stand-in for a real coordination-service client (Zookeeper, etcd,
/// Consul, …), which is a separate collaborator out of scope here (§1, §6).
/// `start` never invokes [`Resolver::apply_leader_update`]; the Resolver
/// relies solely on its fallback `masters` list.
pub struct NoOpCoordinationService;

impl NoOpCoordinationService {
    pub fn start(&self, _resolver: Arc<Resolver>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TcpServerConf, UdpServerConf};
    use crate::shared::log::LogLevel;

    fn sample_conf() -> Conf {
        Conf {
            log_level: LogLevel::Info,
            domain: "mesos".to_string(),
            listener: "127.0.0.1".to_string(),
            port: 53,
            http_port: 8123,
            resolvers: vec!["8.8.8.8".to_string()],
            external_on: false,
            recurse_on: false,
            timeout: 1,
            ttl: 60,
            soa_mname: "ns1.mesos".to_string(),
            soa_rname: "root.ns1.mesos".to_string(),
            soa_refresh: 60,
            soa_retry: 600,
            soa_expire: 86400,
            masters: vec!["garbage".to_string()],
            zk: String::new(),
            refresh_seconds: 60,
            udp_server: UdpServerConf {
                address: "0.0.0.0".to_string(),
                port: 53,
                write_timeout: 5,
                threads: 4,
            },
            tcp_server: TcpServerConf {
                address: "0.0.0.0".to_string(),
                port: 53,
                read_timeout: 5,
                write_timeout: 5,
                threads: 4,
            },
        }
    }

    #[test]
    fn test_starts_booting_then_waiting_for_leader() {
        let resolver = Resolver::new(Arc::new(sample_conf()), Arc::new(Store::new()));
        assert_eq!(resolver.state(), ResolverState::Booting);
        resolver.listeners_bound();
        assert_eq!(resolver.state(), ResolverState::WaitingForLeader);
    }

    #[test]
    fn test_bootstrap_failure_keeps_waiting_for_leader() {
        let resolver = Resolver::new(Arc::new(sample_conf()), Arc::new(Store::new()));
        resolver.listeners_bound();
        assert!(resolver.bootstrap().is_err());
        assert_eq!(resolver.state(), ResolverState::WaitingForLeader);
    }

    #[test]
    fn test_terminate_from_any_state() {
        let resolver = Resolver::new(Arc::new(sample_conf()), Arc::new(Store::new()));
        resolver.terminate();
        assert_eq!(resolver.state(), ResolverState::Terminated);
    }

    #[test]
    fn test_apply_leader_update_formats_descriptor() {
        let resolver = Resolver::new(Arc::new(sample_conf()), Arc::new(Store::new()));
        resolver.apply_leader_update(Some(LeaderDescriptor {
            id: "5".to_string(),
            host: LeaderHost::PackedIpv4(u32::from_be_bytes([10, 0, 0, 1])),
            port: 7,
        }));
        assert_eq!(*resolver.leader_hint.read().unwrap(), "5@10.0.0.1:7");

        resolver.apply_leader_update(None);
        assert_eq!(*resolver.leader_hint.read().unwrap(), "");
    }
}

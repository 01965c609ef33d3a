use crate::config::Conf;
use crate::errors::LocatorErr;
use crate::store::Store;
use crate::{generator, leader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Runs one Reload cycle (§4.4): locate the leader using the current
/// coordination-service hint, fetch a snapshot, regenerate the record set,
/// and publish it. Leaves the Store untouched on failure.
pub fn reload_once(leader_hint: &RwLock<String>, masters: &[String], conf: &Conf, store: &Store) -> Result<(), LocatorErr> {
    let hint = leader_hint.read().unwrap().clone();

    match leader::locate(&hint, masters) {
        Ok(snapshot) => {
            let records = generator::generate(&snapshot, conf);
            store.publish(records, unix_serial());
            Ok(())
        }
        Err(err) => {
            log::error!("reload failed: {}", err);
            Err(err)
        }
    }
}

fn unix_serial() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Spawns the periodic Reload driver (§4.4: "externally driven, periodic
/// timer at `config.RefreshSeconds`"). Runs until `shutdown` is set, then
/// returns. One reload is attempted immediately, matching §4.9's
/// `WaitingForLeader` transition on the first successful run.
pub fn spawn_periodic(
    leader_hint: Arc<RwLock<String>>,
    conf: Arc<Conf>,
    store: Arc<Store>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let period = conf.refresh_period();
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            let _ = reload_once(&leader_hint, &conf.masters, &conf, &store);
            sleep_or_wake(period, &shutdown);
        }
    })
}

pub(crate) fn sleep_or_wake(period: Duration, shutdown: &AtomicBool) {
    let step = Duration::from_millis(200);
    let mut waited = Duration::ZERO;
    while waited < period {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep(step.min(period - waited));
        waited += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Conf, TcpServerConf, UdpServerConf};
    use crate::shared::log::LogLevel;

    fn sample_conf(masters: Vec<String>) -> Conf {
        Conf {
            log_level: LogLevel::Info,
            domain: "mesos".to_string(),
            listener: "127.0.0.1".to_string(),
            port: 53,
            http_port: 8123,
            resolvers: vec!["8.8.8.8".to_string()],
            external_on: false,
            recurse_on: false,
            timeout: 5,
            ttl: 60,
            soa_mname: "ns1.mesos".to_string(),
            soa_rname: "root.ns1.mesos".to_string(),
            soa_refresh: 60,
            soa_retry: 600,
            soa_expire: 86400,
            masters,
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
    fn test_reload_once_fails_with_no_usable_master() {
        let leader_hint = RwLock::new(String::new());
        let masters = vec!["garbage".to_string()];
        let store = Store::new();
        let conf = sample_conf(masters.clone());

        let err = reload_once(&leader_hint, &masters, &conf, &store).unwrap_err();
        assert!(matches!(err, LocatorErr::NoMaster));
        assert!(store.snapshot().a.is_empty());
    }

    /// P6: a failed reload preserves the prior record set bit-for-bit, not
    /// just "non-empty" — published contents from a prior successful cycle
    /// must come back unchanged, not merely untouched-and-empty.
    #[test]
    fn test_reload_once_failure_preserves_prior_contents_bit_for_bit() {
        let store = Store::new();
        let mut prior = generator::RecordSet::default();
        prior.a.insert("task.marathon.mesos.".to_string(), vec!["1.2.3.4".to_string()]);
        prior.srv.insert(
            "_task._tcp.marathon.mesos.".to_string(),
            vec!["task-s0.marathon.mesos.:80".to_string()],
        );
        store.publish(prior.clone(), 42);

        let leader_hint = RwLock::new(String::new());
        let masters = vec!["garbage".to_string()];
        let conf = sample_conf(masters.clone());

        let err = reload_once(&leader_hint, &masters, &conf, &store).unwrap_err();
        assert!(matches!(err, LocatorErr::NoMaster));

        let after = store.snapshot();
        assert_eq!(after.a, prior.a);
        assert_eq!(after.srv, prior.srv);
        assert_eq!(after.members, prior.members);
        assert_eq!(store.serial(), 42);
    }
}

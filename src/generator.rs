use crate::config::Conf;
use crate::leader;
use crate::snapshot::{Snapshot, Task};
use std::collections::HashMap;
use std::net::IpAddr;

/// Pure output of the Record Generator (§3, §4.3): an immutable triple of
/// lookup tables keyed by fully qualified domain name. Produced fresh on
/// every reload and published into the Record Store by reference — never
/// mutated after construction.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    pub a: HashMap<String, Vec<String>>,
    pub srv: HashMap<String, Vec<String>>,
    pub members: HashMap<String, String>,
}

impl RecordSet {
    /// Insert an A value, deduplicating against any address already present
    /// for this name (§4.5).
    fn insert_a(&mut self, name: &str, addr: &str) {
        let values = self.a.entry(name.to_string()).or_default();
        if !values.iter().any(|existing| existing == addr) {
            values.push(addr.to_string());
        }
    }

    /// Append an SRV target unconditionally; duplicates are legitimate
    /// (§4.5).
    fn insert_srv(&mut self, name: &str, target: &str) {
        self.srv.entry(name.to_string()).or_default().push(target.to_string());
    }
}

/// Runs the Record Generator over a freshly fetched [`Snapshot`] (§4.3).
pub fn generate(snapshot: &Snapshot, conf: &Conf) -> RecordSet {
    let mut rs = RecordSet::default();

    for member in &snapshot.slaves {
        rs.members.insert(member.id.clone(), member.hostname.clone());
    }

    insert_master_records(&mut rs, &conf.domain, &snapshot.leader, &conf.masters);
    insert_listener_record(&mut rs, &conf.listener, &conf.soa_mname);

    for framework in &snapshot.frameworks {
        let fname = sanitize(&framework.name);
        let tail = format!("{}.{}.", fname, conf.domain);
        for task in &framework.tasks {
            if !task.is_running() {
                continue;
            }
            let hostname = match rs.members.get(&task.slave_id) {
                Some(h) => h.clone(),
                None => continue,
            };
            insert_task_records(&mut rs, &tail, task, &hostname);
        }
    }

    rs
}

/// Emits the leader's synthetic records plus the `master.`/`masterN.`
/// fallback sequence (§4.3).
///
/// The distilled prose describes the fallback index as restarting at 0 over
/// "non-skipped" entries, but the worked scenarios (§8 S1-S3) only match a
/// different rule: the fallback list, with the leader's own `host:port`
/// appended when absent, indexed by plain position. That is what is
/// implemented here; see DESIGN.md.
fn insert_master_records(rs: &mut RecordSet, domain: &str, leader_hint: &str, masters: &[String]) {
    let master_fqdn = format!("master.{}.", domain);

    match leader::parse_leader(leader_hint) {
        Some((lhost, lport)) => {
            let leader_fqdn = format!("leader.{}.", domain);
            rs.insert_a(&leader_fqdn, &lhost);
            rs.insert_a(&master_fqdn, &lhost);
            rs.insert_srv(&format!("_leader._tcp.{}.", domain), &format!("{}:{}", leader_fqdn, lport));
            rs.insert_srv(&format!("_leader._udp.{}.", domain), &format!("{}:{}", leader_fqdn, lport));

            let leader_host_port = format!("{}:{}", lhost, lport);
            let mut entries = masters.to_vec();
            if !entries.iter().any(|entry| entry == &leader_host_port) {
                entries.push(leader_host_port);
            }
            insert_indexed_masters(rs, domain, &master_fqdn, &entries);
        }
        None => {
            if !leader_hint.is_empty() {
                log::warn!("leader hint '{}' does not parse as id@host:port", leader_hint);
            }
            insert_indexed_masters(rs, domain, &master_fqdn, masters);
        }
    }
}

fn insert_indexed_masters(rs: &mut RecordSet, domain: &str, master_fqdn: &str, entries: &[String]) {
    for (i, entry) in entries.iter().enumerate() {
        match leader::parse_host_port(entry) {
            Some((host, _port)) => {
                rs.insert_a(master_fqdn, &host);
                rs.insert_a(&format!("master{}.{}.", i, domain), &host);
            }
            None => log::warn!("malformed fallback master entry: '{}'", entry),
        }
    }
}

/// A record for the nameserver itself, under `soa_mname` (§4.3).
fn insert_listener_record(rs: &mut RecordSet, listener: &str, mname: &str) {
    let name = format!("{}.", mname.trim_end_matches('.'));
    match listener {
        "0.0.0.0" => match if_addrs::get_if_addrs() {
            Ok(ifaces) => {
                for iface in ifaces {
                    if iface.is_loopback() {
                        continue;
                    }
                    if let IpAddr::V4(ip) = iface.ip() {
                        rs.insert_a(&name, &ip.to_string());
                    }
                }
            }
            Err(err) => log::error!("enumerating local interfaces: {}", err),
        },
        "127.0.0.1" => rs.insert_a(&name, "127.0.0.1"),
        other => rs.insert_a(&name, other),
    }
}

fn insert_task_records(rs: &mut RecordSet, tail: &str, task: &Task, hostname: &str) {
    let tname = sanitize(&task.name);
    let sid = task
        .slave_id
        .rsplit('-')
        .next()
        .unwrap_or(&task.slave_id)
        .to_lowercase();

    let plain = format!("{}.{}", tname, tail);
    let with_sid = format!("{}-{}.{}", tname, sid, tail);
    rs.insert_a(&plain, hostname);
    rs.insert_a(&with_sid, hostname);

    for port in parse_ports(&task.resources.ports) {
        rs.insert_srv(&format!("_{}._tcp.{}", tname, tail), &format!("{}:{}", with_sid, port));
        rs.insert_srv(&format!("_{}._udp.{}", tname, tail), &format!("{}:{}", with_sid, port));
    }
}

/// Lowercase, strip underscores, then drop every remaining character outside
/// `[A-Za-z0-9._-]` (§4.3). Idempotent (P4): the output already satisfies the
/// predicate applied a second time.
pub fn sanitize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|&c| c != '_')
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect()
}

/// Parses the port-range fragment of a `resources.ports` string, e.g.
/// `"*[80-80,443-443]"` (§4.3). Malformed ranges collapse to nothing for that
/// entry rather than failing the whole field.
pub fn parse_ports(raw: &str) -> Vec<u32> {
    let start = match raw.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match raw[start..].find(']') {
        Some(i) => start + i,
        None => return Vec::new(),
    };

    let mut ports = Vec::new();
    for piece in raw[start + 1..end].split(',') {
        let mut bounds = piece.trim().splitn(2, '-');
        let lo = bounds.next().and_then(|s| s.trim().parse::<u32>().ok());
        let hi = bounds.next().and_then(|s| s.trim().parse::<u32>().ok());
        if let (Some(lo), Some(hi)) = (lo, hi) {
            if lo <= hi {
                ports.extend(lo..=hi);
            }
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Framework, Member, Resources};

    fn conf_with(domain: &str, masters: Vec<&str>) -> Conf {
        use crate::config::{TcpServerConf, UdpServerConf};
        use crate::shared::log::LogLevel;

        Conf {
            log_level: LogLevel::Info,
            domain: domain.to_string(),
            listener: "127.0.0.1".to_string(),
            port: 53,
            http_port: 8123,
            resolvers: vec!["8.8.8.8".to_string()],
            external_on: false,
            recurse_on: false,
            timeout: 5,
            ttl: 60,
            soa_mname: format!("ns1.{}", domain),
            soa_rname: format!("root.ns1.{}", domain),
            soa_refresh: 60,
            soa_retry: 600,
            soa_expire: 86400,
            masters: masters.into_iter().map(String::from).collect(),
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

    fn snapshot_with_leader(leader: &str) -> Snapshot {
        Snapshot {
            leader: leader.to_string(),
            frameworks: Vec::new(),
            slaves: Vec::new(),
        }
    }

    #[test]
    fn test_s1_master_not_in_fallback() {
        let conf = conf_with("foo.com", vec!["8:9"]);
        let rs = generate(&snapshot_with_leader("5@6:7"), &conf);

        assert_eq!(rs.a["leader.foo.com."], vec!["6"]);
        assert_eq!(rs.a["master.foo.com."], vec!["6", "8"]);
        assert_eq!(rs.a["master1.foo.com."], vec!["6"]);
        assert_eq!(rs.a["master0.foo.com."], vec!["8"]);
        assert_eq!(rs.srv["_leader._tcp.foo.com."], vec!["leader.foo.com.:7"]);
        assert_eq!(rs.srv["_leader._udp.foo.com."], vec!["leader.foo.com.:7"]);
    }

    #[test]
    fn test_s2_leader_in_fallback_at_end() {
        let conf = conf_with("foo.com", vec!["8:9", "6:7"]);
        let rs = generate(&snapshot_with_leader("5@6:7"), &conf);

        assert_eq!(rs.a["master.foo.com."], vec!["6", "8"]);
        assert_eq!(rs.a["master0.foo.com."], vec!["8"]);
        assert_eq!(rs.a["master1.foo.com."], vec!["6"]);
    }

    #[test]
    fn test_s3_leader_in_fallback_middle() {
        let conf = conf_with("foo.com", vec!["8:9", "6:7", "bob:0"]);
        let rs = generate(&snapshot_with_leader("5@6:7"), &conf);

        assert_eq!(rs.a["master.foo.com."], vec!["6", "8", "bob"]);
        assert_eq!(rs.a["master0.foo.com."], vec!["8"]);
        assert_eq!(rs.a["master1.foo.com."], vec!["6"]);
        assert_eq!(rs.a["master2.foo.com."], vec!["bob"]);
    }

    #[test]
    fn test_s4_dedup() {
        let mut rs = RecordSet::default();
        rs.insert_a("x.", "1.2.3.4");
        rs.insert_a("x.", "1.2.3.4");
        rs.insert_a("x.", "1.2.3.4");
        assert_eq!(rs.a["x."], vec!["1.2.3.4"]);

        rs.insert_a("x.", "5.6.7.8");
        assert_eq!(rs.a["x."], vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[test]
    fn test_s5_task_with_ports() {
        let conf = conf_with("mesos", vec![]);
        let snapshot = Snapshot {
            leader: String::new(),
            slaves: vec![Member {
                id: "20150101-S0".to_string(),
                hostname: "1.2.3.11".to_string(),
            }],
            frameworks: vec![Framework {
                name: "marathon".to_string(),
                tasks: vec![Task {
                    framework_id: "f1".to_string(),
                    id: "t1".to_string(),
                    name: "liquor-store".to_string(),
                    slave_id: "20150101-S0".to_string(),
                    state: "TASK_RUNNING".to_string(),
                    resources: Resources {
                        ports: "*[80-80,443-443]".to_string(),
                    },
                }],
            }],
        };

        let rs = generate(&snapshot, &conf);

        assert_eq!(rs.a["liquor-store.marathon.mesos."], vec!["1.2.3.11"]);
        assert_eq!(rs.a["liquor-store-s0.marathon.mesos."], vec!["1.2.3.11"]);
        assert_eq!(
            rs.srv["_liquor-store._tcp.marathon.mesos."],
            vec!["liquor-store-s0.marathon.mesos.:80", "liquor-store-s0.marathon.mesos.:443"]
        );
        assert_eq!(
            rs.srv["_liquor-store._udp.marathon.mesos."],
            vec!["liquor-store-s0.marathon.mesos.:80", "liquor-store-s0.marathon.mesos.:443"]
        );
    }

    #[test]
    fn test_p4_sanitize_idempotent() {
        let input = "My_Weird Framework!!";
        let once = sanitize(input);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_sanitize_strips_underscores_and_punctuation() {
        assert_eq!(sanitize("My_App.Name-1"), "myapp.name-1");
    }

    #[test]
    fn test_p5_port_range_round_trip() {
        assert_eq!(parse_ports("*[10-12,20-20]"), vec![10, 11, 12, 20]);
    }

    #[test]
    fn test_parse_ports_malformed_collapses_to_empty() {
        assert_eq!(parse_ports("no-brackets-here"), Vec::<u32>::new());
        assert_eq!(parse_ports("*[abc-def]"), Vec::<u32>::new());
        assert_eq!(parse_ports("*[10-5]"), Vec::<u32>::new());
    }

    #[test]
    fn test_p1_p2_invariants_hold_across_generated_set() {
        let conf = conf_with("mesos", vec!["8:9"]);
        let snapshot = Snapshot {
            leader: "5@6:7".to_string(),
            slaves: vec![
                Member { id: "20150101-S0".to_string(), hostname: "1.2.3.11".to_string() },
                Member { id: "20150101-S1".to_string(), hostname: "1.2.3.12".to_string() },
            ],
            frameworks: vec![Framework {
                name: "marathon".to_string(),
                tasks: vec![
                    Task {
                        framework_id: "f1".to_string(),
                        id: "t1".to_string(),
                        name: "liquor-store".to_string(),
                        slave_id: "20150101-S0".to_string(),
                        state: "TASK_RUNNING".to_string(),
                        resources: Resources { ports: "*[80-80,443-443]".to_string() },
                    },
                    Task {
                        framework_id: "f1".to_string(),
                        id: "t2".to_string(),
                        name: "cache".to_string(),
                        slave_id: "20150101-S1".to_string(),
                        state: "TASK_RUNNING".to_string(),
                        resources: Resources { ports: "*[6379-6380]".to_string() },
                    },
                ],
            }],
        };

        let rs = generate(&snapshot, &conf);

        // P1: every A value parses as IPv4 and appears at most once per name.
        for (name, addrs) in &rs.a {
            for addr in addrs {
                addr.parse::<std::net::Ipv4Addr>()
                    .unwrap_or_else(|_| panic!("'{}' under '{}' is not a valid IPv4 address", addr, name));
            }
            let mut seen = std::collections::HashSet::new();
            assert!(addrs.iter().all(|a| seen.insert(a)), "duplicate address under '{}'", name);
        }

        // P2: every SRV target matches `host.:port` with port <= 65535.
        for (name, targets) in &rs.srv {
            for target in targets {
                let (host, port) = target.rsplit_once(':').unwrap_or_else(|| panic!("'{}' under '{}' has no ':'", target, name));
                assert!(host.ends_with('.'), "SRV target host '{}' under '{}' is not a FQDN", host, name);
                assert!(host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-'), "SRV target host '{}' under '{}' has invalid characters", host, name);
                let port: u32 = port.parse().unwrap_or_else(|_| panic!("'{}' under '{}' has a non-numeric port", target, name));
                assert!(port <= 65535, "port {} under '{}' exceeds 65535", port, name);
            }
        }
    }

    #[test]
    fn test_p3_plain_and_sid_suffixed_a_records_co_occur() {
        let conf = conf_with("mesos", vec![]);
        let snapshot = Snapshot {
            leader: String::new(),
            slaves: vec![Member { id: "20150101-S0".to_string(), hostname: "1.2.3.11".to_string() }],
            frameworks: vec![Framework {
                name: "marathon".to_string(),
                tasks: vec![Task {
                    framework_id: "f1".to_string(),
                    id: "t1".to_string(),
                    name: "liquor-store".to_string(),
                    slave_id: "20150101-S0".to_string(),
                    state: "TASK_RUNNING".to_string(),
                    resources: Resources { ports: String::new() },
                }],
            }],
        };

        let rs = generate(&snapshot, &conf);
        assert!(rs.a.contains_key("liquor-store.marathon.mesos."));
        assert!(rs.a.contains_key("liquor-store-s0.marathon.mesos."));
    }

    #[test]
    fn test_task_skipped_when_not_running_or_unknown_member() {
        let conf = conf_with("mesos", vec![]);
        let snapshot = Snapshot {
            leader: String::new(),
            slaves: Vec::new(),
            frameworks: vec![Framework {
                name: "marathon".to_string(),
                tasks: vec![Task {
                    framework_id: "f1".to_string(),
                    id: "t1".to_string(),
                    name: "liquor-store".to_string(),
                    slave_id: "unknown-S9".to_string(),
                    state: "TASK_RUNNING".to_string(),
                    resources: Resources { ports: String::new() },
                }],
            }],
        };

        let rs = generate(&snapshot, &conf);
        assert!(rs.a.is_empty());
    }
}

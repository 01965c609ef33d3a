use crate::errors::LocatorErr;
use crate::snapshot::{self, Snapshot};

/// Parses a `"host:port"` pair. Decision (§9 Open Questions): reject and log
/// malformed input rather than silently slicing it the way the source's
/// `getProto` does — a malformed entry contributes no records and is not
/// fatal to the reload.
pub fn parse_host_port(pair: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = pair.split(':').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some((parts[0].to_string(), parts[1].to_string()))
}

/// Parses a leader descriptor of the shape `id@host:port`.
pub fn parse_leader(leader: &str) -> Option<(String, String)> {
    let (_, host_port) = leader.split_once('@')?;
    parse_host_port(host_port)
}

/// Locates the current cluster leader and returns its snapshot (§4.2).
///
/// 1. If the coordination-service hint is non-empty, fetch from it and
///    re-redirect at most once if the fetched snapshot names a different
///    leader host.
/// 2. Otherwise (or if the hint didn't pan out), try each fallback entry in
///    order, applying the same fetch-and-redirect.
/// 3. If nothing yields a non-empty leader, fail with [`LocatorErr::NoMaster`].
pub fn locate(leader_hint: &str, masters: &[String]) -> Result<Snapshot, LocatorErr> {
    if !leader_hint.is_empty() {
        match parse_leader(leader_hint) {
            Some((ip, port)) => {
                let snapshot = fetch_with_redirect(&ip, &port);
                if !snapshot.leader.is_empty() {
                    return Ok(snapshot);
                }
                log::warn!("coordination-service leader hint '{}' is not a leader", leader_hint);
            }
            None => log::warn!("malformed coordination-service leader hint: '{}'", leader_hint),
        }
    }

    for entry in masters {
        match parse_host_port(entry) {
            Some((ip, port)) => {
                let snapshot = fetch_with_redirect(&ip, &port);
                if !snapshot.leader.is_empty() {
                    return Ok(snapshot);
                }
                log::info!("fallback master '{}' is not a leader, trying next", entry);
            }
            None => log::warn!("malformed fallback master entry: '{}'", entry),
        }
    }

    log::error!("no master found among hint and {} fallback entries", masters.len());
    Err(LocatorErr::NoMaster)
}

/// Fetches a [`Snapshot`] from `ip:port`; if the snapshot names a leader at a
/// different host, re-redirects once using the *original* port (§4.2, §9:
/// "Guard against infinite loops by redirecting at most once per Locator
/// invocation").
fn fetch_with_redirect(ip: &str, port: &str) -> Snapshot {
    let snapshot = snapshot::fetch(ip, port);
    if snapshot.leader.is_empty() {
        return snapshot;
    }
    match parse_leader(&snapshot.leader) {
        Some((redirect_ip, _)) if redirect_ip != ip => {
            log::info!("re-redirecting from '{}' to leader at '{}'", ip, redirect_ip);
            snapshot::fetch(&redirect_ip, port)
        }
        _ => snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port_valid() {
        assert_eq!(parse_host_port("8:9"), Some(("8".to_string(), "9".to_string())));
    }

    #[test]
    fn test_parse_host_port_rejects_malformed() {
        assert_eq!(parse_host_port("no-colon"), None);
        assert_eq!(parse_host_port("too:many:colons"), None);
        assert_eq!(parse_host_port(":9"), None);
        assert_eq!(parse_host_port("8:"), None);
    }

    #[test]
    fn test_parse_leader_valid() {
        assert_eq!(parse_leader("5@6:7"), Some(("6".to_string(), "7".to_string())));
    }

    #[test]
    fn test_parse_leader_rejects_malformed() {
        assert_eq!(parse_leader("no-at-sign"), None);
        assert_eq!(parse_leader("5@bad-host-port"), None);
    }

    #[test]
    fn test_locate_fails_with_no_master_when_all_malformed() {
        let masters = vec!["garbage".to_string(), "also-garbage".to_string()];
        let err = locate("", &masters).unwrap_err();
        assert!(matches!(err, LocatorErr::NoMaster));
    }
}

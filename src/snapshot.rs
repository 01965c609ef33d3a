use serde::Deserialize;

/// Mesos task state indicating the task is actually running and therefore
/// eligible to be advertised in DNS (§4.3).
pub const TASK_RUNNING: &str = "TASK_RUNNING";

/// One-shot denormalized view of cluster state, decoded from a master's
/// `state.json` (§3, §4.1). Field names mirror the upstream schema exactly
/// so no `serde(rename)` is needed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default)]
    pub slaves: Vec<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Framework {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub framework_id: String,
    pub id: String,
    pub name: String,
    pub slave_id: String,
    pub state: String,
    pub resources: Resources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub ports: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub id: String,
    pub hostname: String,
}

impl Task {
    pub fn is_running(&self) -> bool {
        self.state == TASK_RUNNING
    }
}

/// Issue a single HTTP GET against `http://{ip}:{port}/master/state.json` and
/// decode the body as a [`Snapshot`] (§4.1). Any transport, I/O or decode
/// failure is logged and yields a zero-valued snapshot; the caller
/// distinguishes success by `leader != ""`.
pub fn fetch(ip: &str, port: &str) -> Snapshot {
    let url = format!("http://{}:{}/master/state.json", ip, port);
    let result = reqwest::blocking::Client::new()
        .get(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .send()
        .and_then(|resp| resp.json::<Snapshot>());

    match result {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!("Fetching snapshot from '{}': {}", url, err);
            Snapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_snapshot() {
        let body = r#"{
            "leader": "master@6:7",
            "frameworks": [
                {
                    "name": "marathon",
                    "tasks": [
                        {
                            "framework_id": "f1",
                            "id": "t1",
                            "name": "liquor-store",
                            "slave_id": "20150101-S0",
                            "state": "TASK_RUNNING",
                            "resources": { "ports": "*[80-80,443-443]" }
                        }
                    ]
                }
            ],
            "slaves": [
                { "id": "20150101-S0", "hostname": "1.2.3.11" }
            ]
        }"#;

        let snapshot: Snapshot = serde_json::from_str(body).unwrap();
        assert_eq!(snapshot.leader, "master@6:7");
        assert_eq!(snapshot.frameworks.len(), 1);
        assert_eq!(snapshot.frameworks[0].tasks[0].name, "liquor-store");
        assert!(snapshot.frameworks[0].tasks[0].is_running());
        assert_eq!(snapshot.slaves[0].hostname, "1.2.3.11");
    }

    #[test]
    fn test_decode_snapshot_ignores_unknown_fields() {
        let body = r#"{"leader": "", "frameworks": [], "slaves": [], "extra": 42}"#;
        let snapshot: Snapshot = serde_json::from_str(body).unwrap();
        assert_eq!(snapshot.leader, "");
    }
}

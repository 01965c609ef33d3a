use crate::errors::ConfigErr;
use crate::shared::dns;
use crate::shared::log::LogLevel;
use serde::{Deserialize, Serialize};
use std::net;
use std::str::FromStr;
use std::{fs, time};

/// Default external-recursion exchange timeout, used when the configured
/// `timeout` is 0 (§6: "external exchange timeout (seconds, 0 -> default 5)").
const DEFAULT_EXT_TIMEOUT_SECS: u64 = 5;

/// Configuration values obtained parsing the configuration file, covering
/// every option of the configuration table plus the UDP/TCP listener
/// parameters the server tasks need to bind their sockets.
#[derive(Debug, Serialize, Deserialize)]
pub struct Conf {
    pub log_level: LogLevel,

    pub domain: String,
    pub listener: String,
    pub port: u16,
    pub http_port: u16,

    pub resolvers: Vec<String>,
    pub external_on: bool,
    pub recurse_on: bool,
    pub timeout: u64,

    pub ttl: u32,
    pub soa_mname: String,
    pub soa_rname: String,
    pub soa_refresh: u32,
    pub soa_retry: u32,
    pub soa_expire: u32,

    pub masters: Vec<String>,
    pub zk: String,
    pub refresh_seconds: u64,

    pub udp_server: UdpServerConf,
    pub tcp_server: TcpServerConf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UdpServerConf {
    pub address: String,
    pub port: u16,
    pub write_timeout: u64,
    pub threads: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TcpServerConf {
    pub address: String,
    pub port: u16,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub threads: usize,
}

impl Conf {
    /// Read and parse the configuration values from a file. The file must
    /// be JSON-encoded and follow the organization of the [Conf] struct.
    pub fn from_file(path: &str) -> Result<Self, ConfigErr> {
        let file_bytes = fs::read_to_string(path)?;
        let mut conf = serde_json::from_str::<Self>(&file_bytes)?;
        conf.apply_defaults();
        conf.validate()?;
        Ok(conf)
    }

    /// The "0 -> default" style substitutions documented for the external
    /// recursion timeout (§6). Applied before validation so zero is never
    /// rejected as invalid.
    fn apply_defaults(&mut self) {
        if self.timeout == 0 {
            self.timeout = DEFAULT_EXT_TIMEOUT_SECS;
        }
    }

    /// Validate a configuration struct against some common errors.
    fn validate(&self) -> Result<(), ConfigErr> {
        if self.domain.is_empty() {
            return Err(ConfigErr::EmptyDomain);
        }
        dns::Name::from_string(&format!("{}.", self.domain)).map_err(ConfigErr::InvalidName)?;
        dns::Name::from_string(&format!("{}.", self.soa_mname)).map_err(ConfigErr::InvalidName)?;

        if self.listener != "0.0.0.0" && net::IpAddr::from_str(&self.listener).is_err() {
            return Err(ConfigErr::InvalidListener(self.listener.clone()));
        }
        if self.external_on && self.resolvers.is_empty() {
            return Err(ConfigErr::NoResolvers);
        }
        if self.soa_refresh == 0 || self.soa_retry == 0 || self.soa_expire == 0 {
            return Err(ConfigErr::ZeroTimeout("soa_refresh/soa_retry/soa_expire"));
        }
        if self.refresh_seconds == 0 {
            return Err(ConfigErr::ZeroTimeout("refresh_seconds"));
        }

        // Udp server confs.
        if net::IpAddr::from_str(self.udp_server.address.as_ref()).is_err() {
            return Err(ConfigErr::InvalidListener(self.udp_server.address.clone()));
        }
        if self.udp_server.write_timeout == 0 {
            return Err(ConfigErr::ZeroTimeout("udp_server.write_timeout"));
        }
        if self.udp_server.threads == 0 {
            return Err(ConfigErr::ZeroThreads("udp_server.threads"));
        }

        // Tcp server confs.
        if net::IpAddr::from_str(self.tcp_server.address.as_ref()).is_err() {
            return Err(ConfigErr::InvalidListener(self.tcp_server.address.clone()));
        }
        if self.tcp_server.write_timeout == 0 || self.tcp_server.read_timeout == 0 {
            return Err(ConfigErr::ZeroTimeout("tcp_server.read_timeout/write_timeout"));
        }
        if self.tcp_server.threads == 0 {
            return Err(ConfigErr::ZeroThreads("tcp_server.threads"));
        }

        Ok(())
    }

    /// SOA record fields as consumed by the DNS engine, excluding the
    /// ever-changing serial (held separately in the Record Store).
    pub fn soa_timers(&self) -> (u32, u32, u32) {
        (self.soa_refresh, self.soa_retry, self.soa_expire)
    }

    pub fn refresh_period(&self) -> time::Duration {
        time::Duration::from_secs(self.refresh_seconds)
    }

    pub fn external_timeout(&self) -> time::Duration {
        time::Duration::from_secs(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_conf() -> Conf {
        Conf {
            log_level: LogLevel::Info,
            domain: "mesos".to_string(),
            listener: "0.0.0.0".to_string(),
            port: 53,
            http_port: 8123,
            resolvers: vec!["8.8.8.8".to_string()],
            external_on: true,
            recurse_on: true,
            timeout: 0,
            ttl: 60,
            soa_mname: "ns1.mesos".to_string(),
            soa_rname: "root.ns1.mesos".to_string(),
            soa_refresh: 60,
            soa_retry: 600,
            soa_expire: 86400,
            masters: vec!["master1.com:5050".to_string()],
            zk: "zk://127.0.0.1:2181/mesos".to_string(),
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
    fn test_apply_defaults_fills_in_timeout() {
        let mut conf = base_conf();
        conf.apply_defaults();
        assert_eq!(conf.timeout, DEFAULT_EXT_TIMEOUT_SECS);
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let mut conf = base_conf();
        conf.domain = String::new();
        assert!(matches!(conf.validate(), Err(ConfigErr::EmptyDomain)));
    }

    #[test]
    fn test_validate_rejects_external_without_resolvers() {
        let mut conf = base_conf();
        conf.resolvers.clear();
        assert!(matches!(conf.validate(), Err(ConfigErr::NoResolvers)));
    }

    #[test]
    fn test_validate_accepts_base_conf() {
        assert!(base_conf().validate().is_ok());
    }
}

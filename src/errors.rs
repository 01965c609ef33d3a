use std::fmt::{self, Display, Formatter};
use std::io;

/// Errors produced while loading and validating the process configuration.
/// Mirrors the teacher's `conf::Conf::from_file`/`validate` pattern, given a
/// proper enum shape instead of `String`.
#[derive(Debug)]
pub enum ConfigErr {
    ReadFile(io::Error),
    Decode(serde_json::Error),
    EmptyDomain,
    InvalidName(crate::shared::dns::NameErr),
    InvalidListener(String),
    ZeroThreads(&'static str),
    ZeroTimeout(&'static str),
    NoResolvers,
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::ReadFile(err) => write!(f, "reading configuration file: {}", err),
            ConfigErr::Decode(err) => write!(f, "decoding configuration json: {}", err),
            ConfigErr::EmptyDomain => write!(f, "'domain' must not be empty"),
            ConfigErr::InvalidName(err) => write!(f, "invalid domain name: {:?}", err),
            ConfigErr::InvalidListener(addr) => write!(f, "invalid listener address: '{}'", addr),
            ConfigErr::ZeroThreads(field) => write!(f, "'{}' must be greater than zero", field),
            ConfigErr::ZeroTimeout(field) => write!(f, "'{}' must be greater than zero", field),
            ConfigErr::NoResolvers => write!(f, "'resolvers' must not be empty when external recursion is enabled"),
        }
    }
}

impl From<io::Error> for ConfigErr {
    fn from(err: io::Error) -> Self {
        ConfigErr::ReadFile(err)
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(err: serde_json::Error) -> Self {
        ConfigErr::Decode(err)
    }
}

/// Error returned by the Leader Locator (§4.2) when no fallback member nor
/// the coordination-service hint yielded a usable leader.
#[derive(Debug)]
pub enum LocatorErr {
    NoMaster,
}

impl Display for LocatorErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LocatorErr::NoMaster => write!(f, "no master found"),
        }
    }
}

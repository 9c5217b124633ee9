use std::net::Ipv4Addr;

pub const SOURCE_URL_VAR: &str = "LOADGEN_SOURCE_URL";

pub const DESTINATION_URL_VAR: &str = "LOADGEN_DESTINATION_URL";

pub const TARGET_RECORDS_VAR: &str = "LOADGEN_TARGET_RECORDS";

pub const SNAPSHOT_DIR_VAR: &str = "LOADGEN_SNAPSHOT_DIR";

/// Environment lookup used for config overrides
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

const AGENT_PORT: &str = "AGENT_PORT";

const DEFAULT_PORT: u16 = 3001;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(AGENT_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const AGENT_ADDR: &str = "AGENT_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> Ipv4Addr {
    let addr_from_env = std::env::var(AGENT_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const AGENT_FAIL_RATE: &str = "AGENT_FAIL_RATE";

/// Fraction of deliveries the agent rejects with 503, clamped to `0..=1`
pub fn get_fail_rate() -> f64 {
    std::env::var(AGENT_FAIL_RATE)
        .ok()
        .and_then(|rate| rate.parse::<f64>().ok())
        .filter(|rate| rate.is_finite())
        .map_or(0.0, |rate| rate.clamp(0.0, 1.0))
}

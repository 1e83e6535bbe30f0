use std::fs;
use std::io;
use std::path::Path;

use fxhash::{FxBuildHasher, FxHashMap};
use thiserror::Error;

use crate::{RouterId, INFINITY};

/// A configured outbound link: the UDP port the neighbor listens on and
/// the cost of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Neighbor {
    pub id: RouterId,
    pub port: u16,
    pub cost: u32,
}

/// Static router configuration, read from a three-line text file:
///
/// ```text
/// router-id 1
/// input-ports 6110, 6201
/// outputs 6010-1-2, 6301-5-3
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub id: RouterId,
    pub inputs: Vec<u16>,
    pub outputs: FxHashMap<RouterId, Neighbor>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("expected line starting with `{0}`")]
    MissingLine(&'static str),
    #[error("invalid router id `{0}` (must be 1..=65535)")]
    InvalidRouterId(String),
    #[error("invalid port `{0}` (must be 1025..=65535)")]
    InvalidPort(String),
    #[error("invalid output `{0}` (expected <port>-<cost>-<id>)")]
    InvalidOutput(String),
    #[error("invalid link cost {0} (must be 1..=15)")]
    InvalidCost(u32),
    #[error("duplicate input port {0}")]
    DuplicateInput(u16),
    #[error("duplicate neighbor {0}")]
    DuplicateNeighbor(RouterId),
    #[error("neighbor {0} is the router itself")]
    SelfNeighbor(RouterId),
}

impl RouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<RouterConfig, ConfigError> {
        RouterConfig::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(raw: &str) -> Result<RouterConfig, ConfigError> {
        let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
        let id = parse_router_id(required(&mut lines, "router-id")?)?;
        let inputs = parse_inputs(required(&mut lines, "input-ports")?)?;
        let outputs = parse_outputs(required(&mut lines, "outputs")?, id, &inputs)?;
        Ok(RouterConfig {
            id,
            inputs,
            outputs,
        })
    }
}

fn required<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    keyword: &'static str,
) -> Result<&'a str, ConfigError> {
    lines
        .next()
        .and_then(|line| line.strip_prefix(keyword))
        .map(str::trim)
        .ok_or(ConfigError::MissingLine(keyword))
}

fn parse_router_id(field: &str) -> Result<RouterId, ConfigError> {
    match field.parse::<RouterId>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ConfigError::InvalidRouterId(field.to_string())),
    }
}

fn parse_port(field: &str) -> Result<u16, ConfigError> {
    match field.parse::<u16>() {
        Ok(port) if port > 1024 => Ok(port),
        _ => Err(ConfigError::InvalidPort(field.to_string())),
    }
}

fn parse_inputs(field: &str) -> Result<Vec<u16>, ConfigError> {
    let mut inputs = Vec::new();
    for item in field.split(',').map(str::trim) {
        let port = parse_port(item)?;
        if inputs.contains(&port) {
            return Err(ConfigError::DuplicateInput(port));
        }
        inputs.push(port);
    }
    Ok(inputs)
}

fn parse_outputs(
    field: &str,
    local_id: RouterId,
    inputs: &[u16],
) -> Result<FxHashMap<RouterId, Neighbor>, ConfigError> {
    let mut outputs = FxHashMap::with_hasher(FxBuildHasher::default());
    for item in field.split(',').map(str::trim) {
        let mut parts = item.split('-');
        let (Some(port), Some(cost), Some(id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::InvalidOutput(item.to_string()));
        };

        let port = parse_port(port)?;
        let cost = cost
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidOutput(item.to_string()))?;
        if cost < 1 || cost >= INFINITY {
            return Err(ConfigError::InvalidCost(cost));
        }
        let id = parse_router_id(id)?;
        if id == local_id {
            return Err(ConfigError::SelfNeighbor(id));
        }
        if inputs.contains(&port) {
            return Err(ConfigError::DuplicateInput(port));
        }
        if outputs.insert(id, Neighbor { id, port, cost }).is_some() {
            return Err(ConfigError::DuplicateNeighbor(id));
        }
    }
    Ok(outputs)
}

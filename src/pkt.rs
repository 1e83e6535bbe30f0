use std::fmt::Write;

use thiserror::Error;

use crate::RouterId;

/// Receive buffer size; a full packet must fit into one datagram of this size.
pub const MAX_PACKET_SIZE: usize = 4096;

const TAG_LEN: usize = 10;
const VERSION: u32 = 2;

// Five 33-byte lines per entry plus the header line and the integrity tag.
// 24 entries keep the largest packet below MAX_PACKET_SIZE.
const MAX_ENTRIES: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RipPacket {
    pub command: RipCommand,
    pub dest: RouterId,
    pub entries: Vec<RipEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RipCommand {
    Response = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RipEntry {
    pub source: RouterId,
    pub dest: RouterId,
    pub first_hop: RouterId,
    pub metric: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload shorter than the integrity tag")]
    Truncated,
    #[error("integrity tag mismatch")]
    BadTag,
    #[error("unsupported command {0}")]
    BadCommand(u32),
    #[error("unsupported version {0}")]
    BadVersion(u32),
    #[error("packet addressed to router {0}")]
    WrongDestination(RouterId),
    #[error("packet carries no entries")]
    Empty,
    #[error("malformed body")]
    Malformed,
}

impl RipPacket {
    pub fn response(dest: RouterId, entries: Vec<RipEntry>) -> RipPacket {
        RipPacket {
            command: RipCommand::Response,
            dest,
            entries,
        }
    }

    /// Splits an entry set into as many packets as needed to respect the
    /// per-packet entry bound.
    pub fn packets(dest: RouterId, mut entries: &[RipEntry]) -> Vec<RipPacket> {
        let mut r = Vec::with_capacity(entries.len() / MAX_ENTRIES + 1);
        while !entries.is_empty() {
            let split = MAX_ENTRIES.min(entries.len());
            r.push(RipPacket::response(dest, entries[..split].to_vec()));
            entries = &entries[split..];
        }
        r
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = String::with_capacity(33 + 165 * self.entries.len());
        push_bits(&mut body, self.command as u32, 8);
        push_bits(&mut body, VERSION, 8);
        push_bits(&mut body, u32::from(self.dest), 16);
        body.push('\n');
        for entry in &self.entries {
            push_bits(&mut body, u32::from(entry.source), 16);
            push_bits(&mut body, 0, 16);
            body.push('\n');
            push_bits(&mut body, u32::from(entry.dest), 32);
            body.push('\n');
            push_bits(&mut body, 0, 32);
            body.push('\n');
            push_bits(&mut body, u32::from(entry.first_hop), 32);
            body.push('\n');
            push_bits(&mut body, entry.metric, 32);
            body.push('\n');
        }

        let mut out = integrity_tag(body.as_bytes()).into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }

    pub fn decode(payload: &[u8], local_id: RouterId) -> Result<RipPacket, PacketError> {
        if payload.len() < TAG_LEN {
            return Err(PacketError::Truncated);
        }
        let (tag, body) = payload.split_at(TAG_LEN);
        if tag != integrity_tag(body).as_bytes() {
            return Err(PacketError::BadTag);
        }
        let body = std::str::from_utf8(body).map_err(|_| PacketError::Malformed)?;
        if !body.is_ascii() || !body.ends_with('\n') {
            return Err(PacketError::Malformed);
        }

        let lines = body[..body.len() - 1].split('\n').collect::<Vec<_>>();
        let header = lines[0];
        if header.len() != 32 {
            return Err(PacketError::Malformed);
        }
        let command = match bits(&header[0..8], 8)? {
            2 => RipCommand::Response,
            other => return Err(PacketError::BadCommand(other)),
        };
        let version = bits(&header[8..16], 8)?;
        if version != VERSION {
            return Err(PacketError::BadVersion(version));
        }
        let dest = router_id(bits(&header[16..32], 16)?)?;
        if dest != local_id {
            return Err(PacketError::WrongDestination(dest));
        }

        let body = &lines[1..];
        if body.is_empty() {
            return Err(PacketError::Empty);
        }
        if body.len() % 5 != 0 {
            return Err(PacketError::Malformed);
        }

        let mut entries = Vec::with_capacity(body.len() / 5);
        for entry in body.chunks(5) {
            if entry[0].len() != 32 {
                return Err(PacketError::Malformed);
            }
            let source = router_id(bits(&entry[0][0..16], 16)?)?;
            if bits(&entry[0][16..32], 16)? != 0 {
                return Err(PacketError::Malformed);
            }
            let dest = router_id(bits(entry[1], 32)?)?;
            if bits(entry[2], 32)? != 0 {
                return Err(PacketError::Malformed);
            }
            let first_hop = router_id(bits(entry[3], 32)?)?;
            let metric = bits(entry[4], 32)?;
            entries.push(RipEntry {
                source,
                dest,
                first_hop,
                metric,
            });
        }

        Ok(RipPacket {
            command,
            dest,
            entries,
        })
    }
}

/// Content-integrity tag over the packet body, truncated to 10 hex chars.
fn integrity_tag(body: &[u8]) -> String {
    let mut digest = format!("{:x}", md5::compute(body));
    digest.truncate(TAG_LEN);
    digest
}

fn push_bits(out: &mut String, value: u32, width: usize) {
    let _ = write!(out, "{value:0width$b}");
}

fn bits(field: &str, width: usize) -> Result<u32, PacketError> {
    if field.len() != width || !field.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(PacketError::Malformed);
    }
    u32::from_str_radix(field, 2).map_err(|_| PacketError::Malformed)
}

fn router_id(value: u32) -> Result<RouterId, PacketError> {
    RouterId::try_from(value).map_err(|_| PacketError::Malformed)
}

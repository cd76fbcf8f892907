use crate::datagram::{Datagram, ReadyInfo};
use crate::error::{PeerError, Result};

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;

/// Protocol identity announced by the worker and checked by the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Expected protocol name.
    pub protocol_name: String,
    /// Local protocol version, `<major>.<minor>`.
    pub protocol_version: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_name: "wvpipe".to_string(),
            protocol_version: "1.0".to_string(),
        }
    }
}

/// The `ready` datagram a worker sends right after startup.
pub fn ready_datagram(config: &HandshakeConfig, pid: u32) -> Datagram {
    Datagram::Ready(ReadyInfo {
        protocol: config.protocol_name.clone(),
        version: config.protocol_version.clone(),
        pid,
    })
}

/// Check a worker's `ready` announcement against local expectations.
///
/// Protocol names must match exactly; versions are compatible when their
/// major components are equal.
pub fn validate_ready(config: &HandshakeConfig, info: &ReadyInfo) -> Result<()> {
    bounded("protocol name", &info.protocol, MAX_PROTOCOL_LEN)?;
    bounded("protocol version", &info.version, MAX_VERSION_LEN)?;
    let (remote_major, _) = parse_version(&info.version)?;

    if info.protocol != config.protocol_name {
        return Err(PeerError::HandshakeFailed(format!(
            "worker speaks '{}', expected '{}'",
            info.protocol, config.protocol_name
        )));
    }

    let (local_major, _) = parse_version(&config.protocol_version)?;
    if remote_major != local_major {
        return Err(PeerError::HandshakeFailed(format!(
            "worker protocol version {} is incompatible with local {}",
            info.version, config.protocol_version
        )));
    }
    Ok(())
}

fn bounded(what: &str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() || value.len() > max {
        return Err(PeerError::HandshakeFailed(format!(
            "{what} must be 1..={max} bytes, got {}",
            value.len()
        )));
    }
    Ok(())
}

/// Split `<major>.<minor>`.
fn parse_version(version: &str) -> Result<(u16, u16)> {
    let invalid = || PeerError::HandshakeFailed(format!("malformed version '{version}'"));
    let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
    let major = major.parse::<u16>().map_err(|_| invalid())?;
    let minor = minor.parse::<u16>().map_err(|_| invalid())?;
    Ok((major, minor))
}

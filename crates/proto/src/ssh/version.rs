//! Protocol version string exchange (RFC 4253 Section 4.2).
//!
//! Before any packet framing, both sides send an identification line:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! The exchange is driven through the synchronous coordinator like the rest
//! of the handshake. Lines longer than 255 characters or containing null
//! bytes are rejected.
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::version::Version;
//!
//! let version = Version::new("halyard_0.1.0", None);
//! assert_eq!(version.to_string(), "SSH-2.0-halyard_0.1.0");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_9.6\r\n").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_9.6");
//! ```

use halyard_platform::{HalyardError, HalyardResult};

/// Maximum length of the identification line.
pub const MAX_VERSION_LENGTH: usize = 255;

/// SSH protocol identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
}

impl Version {
    /// Creates a protocol-2.0 identification string.
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Returns the default halyard identification string.
    pub fn default_halyard() -> Self {
        Self::new(&format!("halyard_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Parses a received identification line (CR/LF tolerated).
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] if the line is too long, contains
    /// null bytes, does not start with `SSH-`, or advertises an unsupported
    /// protocol version (anything other than 2.0 or 1.99).
    pub fn parse(line: &str) -> HalyardResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() > MAX_VERSION_LENGTH {
            return Err(HalyardError::Protocol(format!(
                "version string too long: {} bytes (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(HalyardError::Protocol(
                "version string contains null byte".to_string(),
            ));
        }

        if !line.starts_with("SSH-") {
            return Err(HalyardError::Protocol(format!(
                "invalid version string: must start with 'SSH-', got '{}'",
                line
            )));
        }

        let mut parts = line.splitn(3, '-');
        parts.next(); // "SSH"
        let proto_version = parts.next().unwrap_or_default();
        let remainder = parts.next().ok_or_else(|| {
            HalyardError::Protocol(format!("malformed version string: '{}'", line))
        })?;

        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(HalyardError::Protocol(format!(
                "unsupported protocol version: '{}'",
                proto_version
            )));
        }

        let (software_version, comments) = match remainder.split_once(' ') {
            Some((software, comments)) => (software.to_string(), Some(comments.to_string())),
            None => (remainder.to_string(), None),
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version ("2.0" or "1.99").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version.
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Returns the identification line with the trailing CR LF.
    pub fn to_wire_string(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_display() {
        let v = Version::new("halyard_0.1.0", Some("client"));
        assert_eq!(v.to_string(), "SSH-2.0-halyard_0.1.0 client");
        assert_eq!(v.to_wire_string(), "SSH-2.0-halyard_0.1.0 client\r\n");
    }

    #[test]
    fn test_parse_round_trip() {
        let v = Version::parse("SSH-2.0-OpenSSH_9.6 Ubuntu-3ubuntu13\r\n").unwrap();
        assert_eq!(v.proto_version(), "2.0");
        assert_eq!(v.software(), "OpenSSH_9.6");
        assert_eq!(v.comments(), Some("Ubuntu-3ubuntu13"));
    }

    #[test]
    fn test_parse_legacy_199() {
        let v = Version::parse("SSH-1.99-OldServer").unwrap();
        assert_eq!(v.proto_version(), "1.99");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("HTTP/1.1 200 OK").is_err());
        assert!(Version::parse("SSH-3.0-Future").is_err());
        assert!(Version::parse(&format!("SSH-2.0-{}", "x".repeat(300))).is_err());
        assert!(Version::parse("SSH-2.0-bad\0byte").is_err());
    }
}

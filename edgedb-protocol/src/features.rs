/// The protocol version negotiated with the server.
///
/// This driver speaks the 0.x line of the binary protocol and accepts
/// exactly minor versions 11 through 11.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub(crate) major_ver: u16,
    pub(crate) minor_ver: u16,
}

pub const PROTO_MAJOR: u16 = 0;
pub const PROTO_MINOR: u16 = 11;
pub const PROTO_MINOR_MIN: u16 = 11;

impl ProtocolVersion {
    pub fn current() -> ProtocolVersion {
        ProtocolVersion {
            major_ver: PROTO_MAJOR,
            minor_ver: PROTO_MINOR,
        }
    }
    pub fn new(major_ver: u16, minor_ver: u16) -> ProtocolVersion {
        ProtocolVersion {
            major_ver,
            minor_ver,
        }
    }
    pub fn version_tuple(&self) -> (u16, u16) {
        (self.major_ver, self.minor_ver)
    }
    /// Whether a server-proposed version can be spoken by this driver.
    pub fn supported(&self) -> bool {
        self.major_ver == PROTO_MAJOR
            && (PROTO_MINOR_MIN..=PROTO_MINOR).contains(&self.minor_ver)
    }
    pub fn is_at_least(&self, major_ver: u16, minor_ver: u16) -> bool {
        self.major_ver > major_ver
            || self.major_ver == major_ver && self.minor_ver >= minor_ver
    }
    pub fn is_at_most(&self, major_ver: u16, minor_ver: u16) -> bool {
        self.major_ver < major_ver
            || self.major_ver == major_ver && self.minor_ver <= minor_ver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_window() {
        assert!(ProtocolVersion::new(0, 11).supported());
        assert!(!ProtocolVersion::new(0, 10).supported());
        assert!(!ProtocolVersion::new(0, 12).supported());
        assert!(!ProtocolVersion::new(1, 0).supported());
    }
}

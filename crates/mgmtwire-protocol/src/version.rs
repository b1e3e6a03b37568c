//! Native protocol versions and the negotiation ceiling.

use std::fmt;

/// Native protocol versions understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// Legacy version with credentials-style authentication.
    V1,
    /// First version with SASL authentication.
    V2,
    /// Widens stream identifiers to two bytes.
    V3,
    /// Adds server warnings to responses.
    V4,
    /// Current version.
    V5,
}

impl ProtocolVersion {
    /// Oldest supported version.
    pub const OLDEST: Self = Self::V1;
    /// Newest supported version.
    pub const NEWEST: Self = Self::V5;
    /// Every version, oldest first.
    pub const ALL: [Self; 5] = [Self::V1, Self::V2, Self::V3, Self::V4, Self::V5];

    /// Resolves the version number carried in the header (direction bit cleared).
    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|version| version.number() == number)
    }

    /// Version number as written on the wire.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
            Self::V5 => 5,
        }
    }

    /// Whether responses may carry captured warnings.
    #[must_use]
    pub fn supports_warnings(self) -> bool {
        self >= Self::V4
    }

    /// Whether this is the legacy version that still uses `CREDENTIALS`.
    #[must_use]
    pub fn is_legacy(self) -> bool {
        self == Self::OLDEST
    }

    /// Width of the stream identifier in the header.
    #[must_use]
    pub fn stream_id_width(self) -> usize {
        if self >= Self::V3 { 2 } else { 1 }
    }

    /// Total header length for frames of this version.
    #[must_use]
    pub fn header_len(self) -> usize {
        // version, flags, stream id, opcode, body length
        1 + 1 + self.stream_id_width() + 1 + 4
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/v{}", self.number(), self.number())
    }
}

/// Highest version the server is willing to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersionLimit {
    max: ProtocolVersion,
}

impl ProtocolVersionLimit {
    /// Builds a ceiling at `max`.
    #[must_use]
    pub const fn new(max: ProtocolVersion) -> Self {
        Self { max }
    }

    /// Builds a ceiling from a configured version number.
    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        ProtocolVersion::from_number(number).map(Self::new)
    }

    /// Highest accepted version.
    #[must_use]
    pub const fn max(self) -> ProtocolVersion {
        self.max
    }

    /// Whether `version` may be negotiated.
    #[must_use]
    pub fn permits(self, version: ProtocolVersion) -> bool {
        version <= self.max
    }

    /// Versions that may be negotiated, oldest first.
    pub fn supported(self) -> impl Iterator<Item = ProtocolVersion> {
        ProtocolVersion::ALL
            .into_iter()
            .filter(move |version| self.permits(*version))
    }

    /// Comma-separated list of supported versions for error messages.
    #[must_use]
    pub fn describe(self) -> String {
        self.supported()
            .map(|version| version.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for ProtocolVersionLimit {
    fn default() -> Self {
        Self::new(ProtocolVersion::NEWEST)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::v1(ProtocolVersion::V1, false, 8)]
    #[case::v2(ProtocolVersion::V2, false, 8)]
    #[case::v3(ProtocolVersion::V3, false, 9)]
    #[case::v4(ProtocolVersion::V4, true, 9)]
    #[case::v5(ProtocolVersion::V5, true, 9)]
    fn version_capabilities(
        #[case] version: ProtocolVersion,
        #[case] warnings: bool,
        #[case] header_len: usize,
    ) {
        assert_eq!(version.supports_warnings(), warnings);
        assert_eq!(version.header_len(), header_len);
    }

    #[test]
    fn only_the_oldest_version_is_legacy() {
        let legacy: Vec<_> = ProtocolVersion::ALL
            .into_iter()
            .filter(|version| version.is_legacy())
            .collect();
        assert_eq!(legacy, vec![ProtocolVersion::V1]);
    }

    #[test]
    fn limit_describes_supported_versions() {
        let limit = ProtocolVersionLimit::new(ProtocolVersion::V3);
        assert!(limit.permits(ProtocolVersion::V2));
        assert!(!limit.permits(ProtocolVersion::V4));
        assert_eq!(limit.describe(), "1/v1, 2/v2, 3/v3");
    }

    #[rstest]
    #[case::zero(0)]
    #[case::six(6)]
    fn unknown_version_numbers_have_no_limit(#[case] number: u8) {
        assert_eq!(ProtocolVersionLimit::from_number(number), None);
    }
}

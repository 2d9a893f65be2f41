//! Wire packets exchanged between nodes

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::{ScalarTimestamp, VectorTimestamp};
use crate::error::CodecError;
use crate::measurement::Measurement;

/// Keyword a server sends back for every datagram it receives
pub const RECEIVE_CONFIRMATION: &str = "RECEIVE_CONFIRMATION";

/// True if `data` is exactly the confirmation keyword
pub fn is_confirmation(data: &[u8]) -> bool {
    data == RECEIVE_CONFIRMATION.as_bytes()
}

/// Sender-scoped unique packet identifier
///
/// Rendered on the wire as `<sender>-<sequence>`. Sender names may
/// themselves contain dashes; the sequence is everything after the last one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PacketId {
    sender: String,
    sequence: u64,
}

impl PacketId {
    /// Create a new packet ID
    pub fn new(sender: impl Into<String>, sequence: u64) -> Self {
        Self {
            sender: sender.into(),
            sequence,
        }
    }

    /// Name of the node that produced the packet
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Per-sender sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sender, self.sequence)
    }
}

impl FromStr for PacketId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sender, sequence) = s
            .rsplit_once('-')
            .ok_or_else(|| CodecError::MalformedPacketId(s.to_string()))?;
        if sender.is_empty() {
            return Err(CodecError::MalformedPacketId(s.to_string()));
        }
        let sequence = sequence
            .parse()
            .map_err(|_| CodecError::MalformedPacketId(s.to_string()))?;
        Ok(Self::new(sender, sequence))
    }
}

impl TryFrom<String> for PacketId {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PacketId> for String {
    fn from(id: PacketId) -> Self {
        id.to_string()
    }
}

/// A measurement together with the sender's clocks at the time of sending
///
/// Built once per logical send and reused across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPacket {
    pub id: PacketId,
    pub measurement: Measurement,
    pub scalar_timestamp: ScalarTimestamp,
    pub vector_timestamp: VectorTimestamp,
}

impl MeasurementPacket {
    pub fn new(
        id: PacketId,
        measurement: Measurement,
        scalar_timestamp: ScalarTimestamp,
        vector_timestamp: VectorTimestamp,
    ) -> Self {
        Self {
            id,
            measurement,
            scalar_timestamp,
            vector_timestamp,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(data)?)
    }
}

impl Display for MeasurementPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) scalar={} vector={}",
            self.id, self.measurement, self.scalar_timestamp, self.vector_timestamp
        )
    }
}

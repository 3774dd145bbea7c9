//! Length-prefixed bincode framing
//!
//! Each frame is a 4-byte big-endian length followed by a bincode envelope
//! carrying the protocol version and the packet.

use serde::{Deserialize, Serialize};

use super::error::{NetworkResult, ProtocolError};
use super::packet::Packet;
use super::protocol::{FRAME_HEADER_SIZE, MAX_PACKET_SIZE, PROTOCOL_VERSION};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    packet: Packet,
}

impl Packet {
    /// Serialize packet to bytes
    pub fn to_bytes(&self) -> NetworkResult<Vec<u8>> {
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            packet: self.clone(),
        };
        let data = bincode::serialize(&envelope).map_err(ProtocolError::Encode)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: data.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(data)
    }

    /// Deserialize packet from bytes
    pub fn from_bytes(bytes: &[u8]) -> NetworkResult<Self> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: bytes.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        let envelope: Envelope = bincode::deserialize(bytes).map_err(ProtocolError::Decode)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found: envelope.version,
            });
        }
        Ok(envelope.packet)
    }
}

/// Encode a packet as one length-prefixed frame
pub fn encode_frame(packet: &Packet) -> NetworkResult<Vec<u8>> {
    let data = packet.to_bytes()?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&data);
    Ok(frame)
}

/// Reassembles frames from a byte stream that may split or join them
#[derive(Debug, Default)]
pub struct FrameDecoder {
    recv_buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport
    pub fn push(&mut self, bytes: &[u8]) {
        self.recv_buffer.extend_from_slice(bytes);
    }

    /// Next complete packet, if one is buffered.
    ///
    /// An oversized length prefix poisons the stream and is returned as an
    /// error; a frame that fails to decode is skipped and reported.
    pub fn next_packet(&mut self) -> NetworkResult<Option<Packet>> {
        if self.recv_buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([
            self.recv_buffer[0],
            self.recv_buffer[1],
            self.recv_buffer[2],
            self.recv_buffer[3],
        ]) as usize;

        if len > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: len,
                max: MAX_PACKET_SIZE,
            });
        }
        if self.recv_buffer.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }

        let result = Packet::from_bytes(&self.recv_buffer[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len]);
        self.recv_buffer.drain(..FRAME_HEADER_SIZE + len);
        result.map(Some)
    }

    /// Drain every complete packet, logging and dropping undecodable frames
    pub fn drain_packets(&mut self) -> NetworkResult<Vec<Packet>> {
        let mut packets = Vec::new();
        loop {
            match self.next_packet() {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(ProtocolError::PacketTooLarge { size, max }) => {
                    return Err(ProtocolError::PacketTooLarge { size, max });
                }
                Err(e) => log::warn!("Failed to deserialize packet: {}", e),
            }
        }
        Ok(packets)
    }

    pub fn buffered(&self) -> usize {
        self.recv_buffer.len()
    }
}

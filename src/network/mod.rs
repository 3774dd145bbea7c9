pub mod codec;
pub mod error;
pub mod packet;
pub mod protocol;

pub use codec::{encode_frame, FrameDecoder};
pub use error::{NetworkResult, ProtocolError};
pub use packet::{ClientPacket, Packet, ServerPacket, SurveyUpdateKind};
pub use protocol::{Protocol, MAX_PACKET_SIZE, MAX_SURVEY_CHUNKS, PROTOCOL_VERSION};

use super::error::ProtocolError;
use super::packet::ClientPacket;

/// Protocol version - increment when making breaking changes
pub const PROTOCOL_VERSION: u32 = 2;

/// Network limits
pub const MAX_PACKET_SIZE: usize = 65536; // 64KB max packet size
pub const MAX_PLAYER_NAME_LENGTH: usize = 16;
pub const MAX_SURVEY_CHUNKS: usize = 4096;
/// Bytes of length prefix in front of every frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// Protocol handler
pub struct Protocol;

impl Protocol {
    /// Validate a surveyor name as it appears in broadcasts
    pub fn validate_player_name(name: &str) -> Result<(), ProtocolError> {
        if name.is_empty() {
            return Err(ProtocolError::Invalid("player name cannot be empty".to_string()));
        }
        if name.len() > MAX_PLAYER_NAME_LENGTH {
            return Err(ProtocolError::Invalid(format!(
                "player name too long (max {} characters)",
                MAX_PLAYER_NAME_LENGTH
            )));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(ProtocolError::Invalid(
                "player name can only contain letters, numbers, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    /// Structural checks on a request before any session logic sees it
    pub fn validate_client_packet(packet: &ClientPacket) -> Result<(), ProtocolError> {
        match packet {
            ClientPacket::StartSurvey { chunks, .. } => {
                if chunks.is_empty() {
                    return Err(ProtocolError::Invalid("survey has no chunks".to_string()));
                }
                if chunks.len() > MAX_SURVEY_CHUNKS {
                    return Err(ProtocolError::Invalid(format!(
                        "survey lists {} chunks (max {})",
                        chunks.len(),
                        MAX_SURVEY_CHUNKS
                    )));
                }
                Ok(())
            }
            ClientPacket::QuitSurvey { .. } => Ok(()),
            ClientPacket::FinishSurvey { final_windspeed, .. } => Self::validate_windspeed(*final_windspeed),
            ClientPacket::SurveyAction { windspeed, .. } => Self::validate_windspeed(*windspeed),
        }
    }

    fn validate_windspeed(windspeed: f32) -> Result<(), ProtocolError> {
        if windspeed.is_finite() && windspeed >= 0.0 {
            Ok(())
        } else {
            Err(ProtocolError::Invalid(format!("invalid windspeed {}", windspeed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::EfRating;
    use crate::world::ChunkPos;

    #[test]
    fn test_player_names() {
        assert!(Protocol::validate_player_name("Storm_Chaser1").is_ok());
        assert!(Protocol::validate_player_name("").is_err());
        assert!(Protocol::validate_player_name("bad name").is_err());
        assert!(Protocol::validate_player_name("abcdefghijklmnopq").is_err());
    }

    #[test]
    fn test_rejects_malformed_requests() {
        let empty = ClientPacket::StartSurvey {
            tornado_id: 1,
            chunks: Vec::new(),
        };
        assert!(Protocol::validate_client_packet(&empty).is_err());

        let nan = ClientPacket::SurveyAction {
            tornado_id: 1,
            chunk_x: 0,
            chunk_z: 0,
            rating: EfRating::EF1,
            windspeed: f32::NAN,
        };
        assert!(Protocol::validate_client_packet(&nan).is_err());

        let ok = ClientPacket::StartSurvey {
            tornado_id: 1,
            chunks: vec![ChunkPos::new(0, 0)],
        };
        assert!(Protocol::validate_client_packet(&ok).is_ok());
    }
}

use serde::{Deserialize, Serialize};

use crate::damage::EfRating;
use crate::weather::StormId;
use crate::world::ChunkPos;

/// Packet types for network communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Client(ClientPacket),
    Server(ServerPacket),
}

/// Packets sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientPacket {
    /// Open a survey over the client-validated candidate chunks
    StartSurvey {
        tornado_id: StormId,
        chunks: Vec<ChunkPos>,
    },
    /// Abandon the sender's survey
    QuitSurvey {
        tornado_id: StormId,
    },
    /// Close the survey; the server recomputes the final values itself
    FinishSurvey {
        tornado_id: StormId,
        final_rating: EfRating,
        final_windspeed: f32,
    },
    /// Per-chunk contribution computed on the client
    SurveyAction {
        tornado_id: StormId,
        chunk_x: i32,
        chunk_z: i32,
        rating: EfRating,
        windspeed: f32,
    },
}

impl ClientPacket {
    pub fn tornado_id(&self) -> StormId {
        match self {
            ClientPacket::StartSurvey { tornado_id, .. }
            | ClientPacket::QuitSurvey { tornado_id }
            | ClientPacket::FinishSurvey { tornado_id, .. }
            | ClientPacket::SurveyAction { tornado_id, .. } => *tornado_id,
        }
    }
}

/// Packets sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPacket {
    SurveyUpdate {
        tornado_id: StormId,
        actor: String,
        update: SurveyUpdateKind,
    },
}

impl ServerPacket {
    pub fn tornado_id(&self) -> StormId {
        match self {
            ServerPacket::SurveyUpdate { tornado_id, .. } => *tornado_id,
        }
    }
}

/// Typed payload of a survey broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurveyUpdateKind {
    Started {
        target_chunks: u32,
        required: u32,
    },
    Quit,
    ChunkSurveyed {
        chunk: ChunkPos,
        rating: EfRating,
        windspeed: f32,
        surveyed: u32,
        required: u32,
    },
    Completed {
        rating: EfRating,
        windspeed: f32,
        surveyed: u32,
    },
    /// Rejection addressed to the actor only
    Error {
        reason: String,
        /// The server discarded the actor's session
        session_closed: bool,
    },
}

impl SurveyUpdateKind {
    /// Wire action name used in logs
    pub fn action(&self) -> &'static str {
        match self {
            SurveyUpdateKind::Started { .. } => "start",
            SurveyUpdateKind::Quit => "quit",
            SurveyUpdateKind::ChunkSurveyed { .. } => "chunk_surveyed",
            SurveyUpdateKind::Completed { .. } => "complete",
            SurveyUpdateKind::Error { .. } => "error",
        }
    }
}

//! Client side of the survey workflow
//!
//! Checks here are for responsiveness only; the server repeats every one of
//! them. Chunk ratings are computed locally from the evidence ledger and
//! reported to the server as-is; a chunk counts once the server echoes it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crossbeam_channel::Sender;

use super::{required_surveys, SurveyRejection};
use crate::damage::{EfRating, EvidenceLedger};
use crate::network::{ClientPacket, ServerPacket, SurveyUpdateKind};
use crate::time::Timestamp;
use crate::tracking::TornadoTrack;
use crate::weather::StormId;
use crate::world::ChunkPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSurveyState {
    None,
    /// Start sent, waiting for the server
    Requested,
    Active,
    /// Finish sent, waiting for the verdict
    Finished,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveySession {
    pub tornado_id: StormId,
    pub surveyor: String,
    pub start_time: Timestamp,
    pub state: ClientSurveyState,
    pub target_chunks: BTreeSet<ChunkPos>,
    /// Chunks the server has acknowledged
    pub surveyed: BTreeMap<ChunkPos, (EfRating, f32)>,
    /// Reports sent but not yet answered, oldest first
    pub pending: VecDeque<ChunkPos>,
    pub required: usize,
}

impl SurveySession {
    pub fn can_finish(&self) -> bool {
        self.surveyed.len() >= self.required
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.surveyed.len(), self.required)
    }

    pub fn final_result(&self) -> (EfRating, f32) {
        self.surveyed
            .values()
            .fold((EfRating::UNRATED, 0.0f32), |(rating, windspeed), (r, w)| {
                (rating.max(*r), windspeed.max(*w))
            })
    }
}

/// What a server broadcast meant for this client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SurveyStarted { tornado_id: StormId, required: usize },
    SurveyCompleted { tornado_id: StormId, rating: EfRating, windspeed: f32 },
    SurveyRejected { tornado_id: StormId, reason: String },
    /// Another player's survey started, progressed or ended
    RemoteSurveyChanged { tornado_id: StormId, surveyor: String },
}

pub struct SurveyClient {
    player: String,
    outbox: Sender<ClientPacket>,
    session: Option<SurveySession>,
    /// In-progress surveys of other players, from broadcasts
    remote_sessions: HashMap<StormId, String>,
    coverage_divisor: usize,
}

impl SurveyClient {
    pub fn new(player: impl Into<String>, outbox: Sender<ClientPacket>, coverage_divisor: usize) -> Self {
        Self {
            player: player.into(),
            outbox,
            session: None,
            remote_sessions: HashMap::new(),
            coverage_divisor,
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn session(&self) -> Option<&SurveySession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> ClientSurveyState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(ClientSurveyState::None)
    }

    /// Surveyor of an in-progress survey seen in broadcasts
    pub fn remote_surveyor(&self, tornado_id: StormId) -> Option<&str> {
        self.remote_sessions.get(&tornado_id).map(String::as_str)
    }

    fn send(&self, packet: ClientPacket) {
        if self.outbox.send(packet).is_err() {
            log::warn!("Survey outbox closed; packet for {} dropped", self.player);
        }
    }

    /// Ask the server to open a survey over pre-filtered candidate chunks
    pub fn request_start(&mut self, track: &TornadoTrack, candidates: Vec<ChunkPos>, now: Timestamp) -> Result<(), SurveyRejection> {
        if track.is_active() {
            return Err(SurveyRejection::TornadoActive(track.id));
        }
        if let Some(surveyor) = self.remote_sessions.get(&track.id) {
            return Err(SurveyRejection::SurveyInProgress {
                tornado: track.id,
                surveyor: surveyor.clone(),
            });
        }
        if let Some(session) = &self.session {
            return Err(SurveyRejection::AlreadySurveying(session.tornado_id));
        }
        let target_chunks: BTreeSet<ChunkPos> = candidates.into_iter().collect();
        if target_chunks.is_empty() {
            return Err(SurveyRejection::NoDamageEvidence(track.id));
        }

        let required = required_surveys(target_chunks.len(), self.coverage_divisor);
        self.send(ClientPacket::StartSurvey {
            tornado_id: track.id,
            chunks: target_chunks.iter().copied().collect(),
        });
        self.session = Some(SurveySession {
            tornado_id: track.id,
            surveyor: self.player.clone(),
            start_time: now,
            state: ClientSurveyState::Requested,
            target_chunks,
            surveyed: BTreeMap::new(),
            pending: VecDeque::new(),
            required,
        });
        Ok(())
    }

    /// Rate one chunk from its evidence and report it
    pub fn survey_chunk(&mut self, chunk: ChunkPos, ledger: &EvidenceLedger) -> Result<(EfRating, f32), SurveyRejection> {
        let session = match self.session.as_mut() {
            Some(s) if s.state == ClientSurveyState::Active => s,
            Some(s) => return Err(SurveyRejection::NoSession(s.tornado_id)),
            None => return Err(SurveyRejection::InvalidRequest("no survey in progress".to_string())),
        };
        if !session.target_chunks.contains(&chunk) {
            return Err(SurveyRejection::ChunkNotInSurvey(chunk));
        }
        if session.surveyed.contains_key(&chunk) || session.pending.contains(&chunk) {
            return Err(SurveyRejection::ChunkAlreadySurveyed(chunk));
        }

        let (rating, windspeed) = ledger
            .assess(session.tornado_id, chunk)
            .unwrap_or((EfRating::UNRATED, 0.0));
        session.pending.push_back(chunk);
        let tornado_id = session.tornado_id;

        self.send(ClientPacket::SurveyAction {
            tornado_id,
            chunk_x: chunk.x,
            chunk_z: chunk.z,
            rating,
            windspeed,
        });
        Ok((rating, windspeed))
    }

    pub fn can_finish(&self) -> bool {
        self.session.as_ref().map(|s| s.can_finish()).unwrap_or(false)
    }

    /// Send the final result; the verdict arrives as a broadcast
    pub fn finish(&mut self) -> Result<(EfRating, f32), SurveyRejection> {
        let session = match self.session.as_mut() {
            Some(s) if s.state == ClientSurveyState::Active => s,
            Some(s) => return Err(SurveyRejection::NoSession(s.tornado_id)),
            None => return Err(SurveyRejection::InvalidRequest("no survey in progress".to_string())),
        };
        if !session.pending.is_empty() {
            return Err(SurveyRejection::InvalidRequest(format!(
                "{} chunk reports still awaiting the server",
                session.pending.len()
            )));
        }
        if !session.can_finish() {
            return Err(SurveyRejection::InsufficientCoverage {
                surveyed: session.surveyed.len(),
                required: session.required,
            });
        }
        let (rating, windspeed) = session.final_result();
        session.state = ClientSurveyState::Finished;
        let tornado_id = session.tornado_id;

        self.send(ClientPacket::FinishSurvey {
            tornado_id,
            final_rating: rating,
            final_windspeed: windspeed,
        });
        Ok((rating, windspeed))
    }

    /// Abandon the survey; nothing surveyed so far is kept
    pub fn quit(&mut self) -> Result<(), SurveyRejection> {
        let Some(mut session) = self.session.take() else {
            return Err(SurveyRejection::InvalidRequest("no survey in progress".to_string()));
        };
        session.state = ClientSurveyState::Quit;
        self.send(ClientPacket::QuitSurvey {
            tornado_id: session.tornado_id,
        });
        Ok(())
    }

    /// Apply a server broadcast
    pub fn handle_server_packet(&mut self, packet: &ServerPacket) -> Option<ClientEvent> {
        let ServerPacket::SurveyUpdate {
            tornado_id,
            actor,
            update,
        } = packet;
        let tornado_id = *tornado_id;

        if *actor != self.player {
            return self.track_remote(tornado_id, actor, update);
        }

        let ours = self
            .session
            .as_ref()
            .map(|s| s.tornado_id == tornado_id)
            .unwrap_or(false);

        match update {
            SurveyUpdateKind::Started { required, .. } if ours => {
                if let Some(session) = self.session.as_mut() {
                    session.state = ClientSurveyState::Active;
                    session.required = *required as usize;
                }
                Some(ClientEvent::SurveyStarted {
                    tornado_id,
                    required: *required as usize,
                })
            }
            SurveyUpdateKind::ChunkSurveyed {
                chunk, rating, windspeed, ..
            } if ours => {
                if let Some(session) = self.session.as_mut() {
                    session.pending.retain(|c| c != chunk);
                    session.surveyed.insert(*chunk, (*rating, *windspeed));
                }
                None
            }
            SurveyUpdateKind::Completed { rating, windspeed, .. } if ours => {
                self.session = None;
                Some(ClientEvent::SurveyCompleted {
                    tornado_id,
                    rating: *rating,
                    windspeed: *windspeed,
                })
            }
            SurveyUpdateKind::Quit if ours => {
                self.session = None;
                None
            }
            SurveyUpdateKind::Error { reason, session_closed } => {
                if ours {
                    let state = self.state();
                    if *session_closed || state == ClientSurveyState::Requested {
                        self.session = None;
                    } else if let Some(session) = self.session.as_mut() {
                        if state == ClientSurveyState::Finished {
                            session.state = ClientSurveyState::Active;
                        } else {
                            // Replies come in request order, so this answers the oldest report
                            session.pending.pop_front();
                        }
                    }
                }
                Some(ClientEvent::SurveyRejected {
                    tornado_id,
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }

    fn track_remote(&mut self, tornado_id: StormId, actor: &str, update: &SurveyUpdateKind) -> Option<ClientEvent> {
        match update {
            SurveyUpdateKind::Started { .. } | SurveyUpdateKind::ChunkSurveyed { .. } => {
                self.remote_sessions.insert(tornado_id, actor.to_string());
            }
            SurveyUpdateKind::Quit | SurveyUpdateKind::Completed { .. } => {
                self.remote_sessions.remove(&tornado_id);
            }
            SurveyUpdateKind::Error { .. } => return None,
        }
        Some(ClientEvent::RemoteSurveyChanged {
            tornado_id,
            surveyor: actor.to_string(),
        })
    }

    /// Connection lost; the server discards the session on its side
    pub fn on_disconnect(&mut self) {
        self.session = None;
        self.remote_sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::ScouringLevel;
    use crate::weather::StormSnapshot;
    use crate::world::VoxelPos;
    use crossbeam_channel::{unbounded, Receiver};
    use glam::Vec3;

    fn ended_track() -> TornadoTrack {
        let mut track = TornadoTrack::new(&StormSnapshot::tornado(42, 3, Vec3::new(8.0, 64.0, 8.0), 150, 60.0), 0);
        track.mark_damaged(ChunkPos::new(0, 0));
        track.deactivate(60_000, 0.1, 5_000);
        track
    }

    fn client(name: &str) -> (SurveyClient, Receiver<ClientPacket>) {
        let (tx, rx) = unbounded();
        (SurveyClient::new(name, tx, 4), rx)
    }

    fn update(actor: &str, update: SurveyUpdateKind) -> ServerPacket {
        ServerPacket::SurveyUpdate {
            tornado_id: 42,
            actor: actor.to_string(),
            update,
        }
    }

    fn chunk_surveyed(chunk: ChunkPos, rating: EfRating, windspeed: f32) -> SurveyUpdateKind {
        SurveyUpdateKind::ChunkSurveyed {
            chunk,
            rating,
            windspeed,
            surveyed: 1,
            required: 1,
        }
    }

    fn started() -> SurveyUpdateKind {
        SurveyUpdateKind::Started {
            target_chunks: 1,
            required: 1,
        }
    }

    #[test]
    fn test_full_client_flow() {
        let ledger = EvidenceLedger::new();
        ledger.add_scouring_evidence(42, VoxelPos::new(4, 64, 4), ScouringLevel::GrassToDirt);
        let (mut client, rx) = client("A");

        client.request_start(&ended_track(), vec![ChunkPos::new(0, 0)], 100).unwrap();
        assert_eq!(client.state(), ClientSurveyState::Requested);
        assert!(client.survey_chunk(ChunkPos::new(0, 0), &ledger).is_err());

        client.handle_server_packet(&update("A", started()));
        assert_eq!(client.state(), ClientSurveyState::Active);

        let (rating, windspeed) = client.survey_chunk(ChunkPos::new(0, 0), &ledger).unwrap();
        assert_eq!(rating, EfRating::EF3);
        assert_eq!(windspeed, 140.0);
        assert_eq!(
            client.survey_chunk(ChunkPos::new(0, 0), &ledger),
            Err(SurveyRejection::ChunkAlreadySurveyed(ChunkPos::new(0, 0)))
        );
        assert!(!client.can_finish());
        assert!(client.finish().is_err());

        client.handle_server_packet(&update("A", chunk_surveyed(ChunkPos::new(0, 0), rating, windspeed)));
        assert!(client.can_finish());
        client.finish().unwrap();
        let event = client.handle_server_packet(&update(
            "A",
            SurveyUpdateKind::Completed {
                rating,
                windspeed,
                surveyed: 1,
            },
        ));
        assert!(matches!(event, Some(ClientEvent::SurveyCompleted { .. })));
        assert_eq!(client.state(), ClientSurveyState::None);

        let sent: Vec<ClientPacket> = rx.try_iter().collect();
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[2], ClientPacket::FinishSurvey { final_rating: EfRating::EF3, .. }));
    }

    #[test]
    fn test_refused_report_does_not_count() {
        let ledger = EvidenceLedger::new();
        ledger.add_scouring_evidence(42, VoxelPos::new(4, 64, 4), ScouringLevel::GrassToDirt);
        ledger.add_scouring_evidence(42, VoxelPos::new(20, 64, 4), ScouringLevel::GrassToDirt);
        let mut track = ended_track();
        track.mark_damaged(ChunkPos::new(1, 0));
        let (mut client, _rx) = client("A");
        client
            .request_start(&track, vec![ChunkPos::new(0, 0), ChunkPos::new(1, 0)], 0)
            .unwrap();
        client.handle_server_packet(&update("A", started()));

        client.survey_chunk(ChunkPos::new(0, 0), &ledger).unwrap();
        let (rating, windspeed) = client.survey_chunk(ChunkPos::new(1, 0), &ledger).unwrap();
        client.handle_server_packet(&update(
            "A",
            SurveyUpdateKind::Error {
                reason: "chunk not part of this survey".to_string(),
                session_closed: false,
            },
        ));
        let session = client.session().unwrap();
        assert_eq!(session.state, ClientSurveyState::Active);
        assert!(session.surveyed.is_empty());
        assert_eq!(session.pending, VecDeque::from([ChunkPos::new(1, 0)]));
        assert!(!client.can_finish());

        client.handle_server_packet(&update("A", chunk_surveyed(ChunkPos::new(1, 0), rating, windspeed)));
        let session = client.session().unwrap();
        assert!(session.pending.is_empty());
        assert_eq!(session.surveyed.keys().copied().collect::<Vec<_>>(), vec![ChunkPos::new(1, 0)]);
        assert!(client.can_finish());

        // The refused chunk may be reported again
        assert!(client.survey_chunk(ChunkPos::new(0, 0), &ledger).is_ok());
    }

    #[test]
    fn test_active_tornado_rejected_locally() {
        let (mut client, rx) = client("A");
        let track = TornadoTrack::new(&StormSnapshot::tornado(42, 3, Vec3::ZERO, 150, 60.0), 0);
        assert_eq!(
            client.request_start(&track, vec![ChunkPos::new(0, 0)], 0),
            Err(SurveyRejection::TornadoActive(42))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_session_blocks_start() {
        let (mut client, _rx) = client("B");
        client.handle_server_packet(&update("A", started()));
        assert_eq!(client.remote_surveyor(42), Some("A"));
        assert!(matches!(
            client.request_start(&ended_track(), vec![ChunkPos::new(0, 0)], 0),
            Err(SurveyRejection::SurveyInProgress { .. })
        ));

        client.handle_server_packet(&update("A", SurveyUpdateKind::Quit));
        assert!(client.request_start(&ended_track(), vec![ChunkPos::new(0, 0)], 0).is_ok());
    }

    #[test]
    fn test_closing_error_drops_session() {
        let (mut client, _rx) = client("B");
        client.request_start(&ended_track(), vec![ChunkPos::new(0, 0)], 0).unwrap();
        client.handle_server_packet(&update("B", started()));
        client.handle_server_packet(&update(
            "B",
            SurveyUpdateKind::Error {
                reason: "downgrade".to_string(),
                session_closed: true,
            },
        ));
        assert_eq!(client.state(), ClientSurveyState::None);
    }

    #[test]
    fn test_quit_discards_progress() {
        let ledger = EvidenceLedger::new();
        ledger.add_debarking_evidence(42, VoxelPos::new(4, 70, 4));
        let (mut client, rx) = client("A");
        client.request_start(&ended_track(), vec![ChunkPos::new(0, 0)], 0).unwrap();
        client.handle_server_packet(&update("A", started()));
        client.survey_chunk(ChunkPos::new(0, 0), &ledger).unwrap();
        client.quit().unwrap();
        assert!(client.session().is_none());
        assert!(!ledger.get(42, ChunkPos::new(0, 0)).unwrap().is_surveyed());
        assert!(matches!(rx.try_iter().last(), Some(ClientPacket::QuitSurvey { tornado_id: 42 })));
    }
}

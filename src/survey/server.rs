//! Authoritative survey session table
//!
//! One session per tornado and one per player, both enforced under a single
//! lock. Finishing reads every stored chunk value, checks the published
//! result and commits while holding that lock, so no second survey of the
//! same tornado can interleave with the final aggregation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;

use super::{required_surveys, SurveyRejection};
use crate::damage::{EfRating, EvidenceLedger};
use crate::network::{ClientPacket, Protocol, ServerPacket, SurveyUpdateKind};
use crate::time::Timestamp;
use crate::tracking::TornadoTracker;
use crate::weather::StormId;
use crate::world::ChunkPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSurveyState {
    Active,
    Complete,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSurveySession {
    pub tornado_id: StormId,
    pub surveyor: String,
    pub start_time: Timestamp,
    pub state: ServerSurveyState,
    pub target_chunks: BTreeSet<ChunkPos>,
    /// Client-reported (rating, windspeed) per surveyed chunk
    pub surveyed: BTreeMap<ChunkPos, (EfRating, f32)>,
    pub required: usize,
}

impl ServerSurveySession {
    pub fn can_finish(&self) -> bool {
        self.surveyed.len() >= self.required
    }

    /// Highest rating and windspeed over the surveyed chunks
    pub fn final_result(&self) -> (EfRating, f32) {
        self.surveyed
            .values()
            .fold((EfRating::UNRATED, 0.0f32), |(rating, windspeed), (r, w)| {
                (rating.max(*r), windspeed.max(*w))
            })
    }
}

/// Who a server packet goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub packet: ServerPacket,
}

impl Outgoing {
    fn broadcast(tornado_id: StormId, actor: &str, update: SurveyUpdateKind) -> Self {
        Self {
            recipient: Recipient::All,
            packet: ServerPacket::SurveyUpdate {
                tornado_id,
                actor: actor.to_string(),
                update,
            },
        }
    }

    /// Error addressed only to the player whose request failed
    pub fn rejection(tornado_id: StormId, player: &str, rejection: &SurveyRejection) -> Self {
        Self {
            recipient: Recipient::Player(player.to_string()),
            packet: ServerPacket::SurveyUpdate {
                tornado_id,
                actor: player.to_string(),
                update: SurveyUpdateKind::Error {
                    reason: rejection.to_string(),
                    session_closed: rejection.closes_session(),
                },
            },
        }
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    by_tornado: HashMap<StormId, ServerSurveySession>,
    by_player: HashMap<String, StormId>,
}

impl SessionTable {
    fn session_of(&mut self, player: &str, tornado: StormId) -> Result<&mut ServerSurveySession, SurveyRejection> {
        match self.by_player.get(player) {
            Some(id) if *id == tornado => {}
            _ => return Err(SurveyRejection::NoSession(tornado)),
        }
        self.by_tornado
            .get_mut(&tornado)
            .filter(|s| s.surveyor == player)
            .ok_or(SurveyRejection::NoSession(tornado))
    }

    fn remove(&mut self, tornado: StormId) -> Option<ServerSurveySession> {
        let session = self.by_tornado.remove(&tornado)?;
        self.by_player.remove(&session.surveyor);
        Some(session)
    }
}

/// Collaborators the server reads and commits to
pub struct ServerContext<'a> {
    pub tracker: &'a TornadoTracker,
    pub ledger: &'a EvidenceLedger,
}

pub struct SurveyServer {
    sessions: Mutex<SessionTable>,
    coverage_divisor: usize,
}

impl SurveyServer {
    pub fn new(coverage_divisor: usize) -> Self {
        Self {
            sessions: Mutex::new(SessionTable::default()),
            coverage_divisor,
        }
    }

    /// Handle one client packet, turning any rejection into an error
    /// addressed to the sender
    pub fn handle_packet(&self, player: &str, packet: ClientPacket, ctx: &ServerContext<'_>, now: Timestamp) -> Vec<Outgoing> {
        let tornado_id = packet.tornado_id();
        match self.process(player, packet, ctx, now) {
            Ok(outgoing) => outgoing,
            Err(rejection) => {
                log::info!("Survey request from {} for tornado {} rejected: {}", player, tornado_id, rejection);
                vec![Outgoing::rejection(tornado_id, player, &rejection)]
            }
        }
    }

    pub fn process(
        &self,
        player: &str,
        packet: ClientPacket,
        ctx: &ServerContext<'_>,
        now: Timestamp,
    ) -> Result<Vec<Outgoing>, SurveyRejection> {
        Protocol::validate_player_name(player).map_err(|e| SurveyRejection::InvalidRequest(e.to_string()))?;
        Protocol::validate_client_packet(&packet).map_err(|e| SurveyRejection::InvalidRequest(e.to_string()))?;
        match packet {
            ClientPacket::StartSurvey { tornado_id, chunks } => self.handle_start(player, tornado_id, chunks, ctx, now),
            ClientPacket::SurveyAction {
                tornado_id,
                chunk_x,
                chunk_z,
                rating,
                windspeed,
            } => self.handle_action(player, tornado_id, ChunkPos::new(chunk_x, chunk_z), rating, windspeed),
            ClientPacket::FinishSurvey {
                tornado_id,
                final_rating,
                final_windspeed,
            } => self.handle_finish(player, tornado_id, final_rating, final_windspeed, ctx, now),
            ClientPacket::QuitSurvey { tornado_id } => self.handle_quit(player, tornado_id),
        }
    }

    pub fn handle_start(
        &self,
        player: &str,
        tornado_id: StormId,
        chunks: Vec<ChunkPos>,
        ctx: &ServerContext<'_>,
        now: Timestamp,
    ) -> Result<Vec<Outgoing>, SurveyRejection> {
        let track = ctx.tracker.get(tornado_id).ok_or(SurveyRejection::UnknownTornado(tornado_id))?;
        if track.is_active() {
            return Err(SurveyRejection::TornadoActive(tornado_id));
        }

        let mut table = self.sessions.lock();
        if let Some(existing) = table.by_tornado.get(&tornado_id) {
            return Err(SurveyRejection::SurveyInProgress {
                tornado: tornado_id,
                surveyor: existing.surveyor.clone(),
            });
        }
        if let Some(other) = table.by_player.get(player) {
            return Err(SurveyRejection::AlreadySurveying(*other));
        }

        let target_chunks: BTreeSet<ChunkPos> = chunks
            .into_iter()
            .filter(|chunk| track.damaged_chunks().contains(chunk) && ctx.ledger.has_damage(tornado_id, *chunk))
            .collect();
        if target_chunks.is_empty() {
            return Err(SurveyRejection::NoDamageEvidence(tornado_id));
        }

        let required = required_surveys(target_chunks.len(), self.coverage_divisor);
        let target_count = target_chunks.len();
        table.by_player.insert(player.to_string(), tornado_id);
        table.by_tornado.insert(
            tornado_id,
            ServerSurveySession {
                tornado_id,
                surveyor: player.to_string(),
                start_time: now,
                state: ServerSurveyState::Active,
                target_chunks,
                surveyed: BTreeMap::new(),
                required,
            },
        );
        log::info!(
            "{} started surveying tornado {} ({} chunks, {} required)",
            player,
            tornado_id,
            target_count,
            required
        );

        Ok(vec![Outgoing::broadcast(
            tornado_id,
            player,
            SurveyUpdateKind::Started {
                target_chunks: target_count as u32,
                required: required as u32,
            },
        )])
    }

    /// Record a client-computed chunk result. A repeat for a chunk already
    /// surveyed is ignored.
    pub fn handle_action(
        &self,
        player: &str,
        tornado_id: StormId,
        chunk: ChunkPos,
        rating: EfRating,
        windspeed: f32,
    ) -> Result<Vec<Outgoing>, SurveyRejection> {
        let mut table = self.sessions.lock();
        let session = table.session_of(player, tornado_id)?;
        if !session.target_chunks.contains(&chunk) {
            return Err(SurveyRejection::ChunkNotInSurvey(chunk));
        }
        if session.surveyed.contains_key(&chunk) {
            log::debug!("Duplicate survey of chunk {} for tornado {} ignored", chunk, tornado_id);
            return Ok(Vec::new());
        }

        session.surveyed.insert(chunk, (rating, windspeed));
        let surveyed = session.surveyed.len() as u32;
        let required = session.required as u32;
        log::debug!(
            "{} surveyed chunk {} of tornado {}: {} ({:.0} mph)",
            player,
            chunk,
            tornado_id,
            rating,
            windspeed
        );

        Ok(vec![Outgoing::broadcast(
            tornado_id,
            player,
            SurveyUpdateKind::ChunkSurveyed {
                chunk,
                rating,
                windspeed,
                surveyed,
                required,
            },
        )])
    }

    pub fn handle_finish(
        &self,
        player: &str,
        tornado_id: StormId,
        client_rating: EfRating,
        client_windspeed: f32,
        ctx: &ServerContext<'_>,
        now: Timestamp,
    ) -> Result<Vec<Outgoing>, SurveyRejection> {
        let mut table = self.sessions.lock();
        let session = table.session_of(player, tornado_id)?;
        if !session.can_finish() {
            return Err(SurveyRejection::InsufficientCoverage {
                surveyed: session.surveyed.len(),
                required: session.required,
            });
        }

        let (rating, windspeed) = session.final_result();
        if rating != client_rating || (windspeed - client_windspeed).abs() > 0.5 {
            log::warn!(
                "{} reported {} ({:.0} mph) for tornado {}; stored chunk values give {} ({:.0} mph)",
                player,
                client_rating,
                client_windspeed,
                tornado_id,
                rating,
                windspeed
            );
        }

        let published = ctx.tracker.get(tornado_id).and_then(|t| t.survey().cloned());
        if let Some(existing) = published {
            if existing.surveyed_by != player && existing.rating > rating {
                table.remove(tornado_id);
                log::warn!(
                    "Downgrade of tornado {} from {} ({}) to {} by {} rejected",
                    tornado_id,
                    existing.rating,
                    existing.surveyed_by,
                    rating,
                    player
                );
                return Err(SurveyRejection::DowngradeConflict {
                    tornado: tornado_id,
                    existing: existing.rating,
                    surveyor: existing.surveyed_by,
                    attempted: rating,
                });
            }
        }

        ctx.tracker
            .apply_survey(tornado_id, player, now, rating, windspeed)
            .map_err(|_| SurveyRejection::UnknownTornado(tornado_id))?;

        let Some(mut session) = table.remove(tornado_id) else {
            return Err(SurveyRejection::NoSession(tornado_id));
        };
        session.state = ServerSurveyState::Complete;
        for (chunk, (chunk_rating, chunk_windspeed)) in &session.surveyed {
            ctx.ledger
                .mark_surveyed(tornado_id, *chunk, player, now, *chunk_rating, *chunk_windspeed);
        }

        Ok(vec![Outgoing::broadcast(
            tornado_id,
            player,
            SurveyUpdateKind::Completed {
                rating,
                windspeed,
                surveyed: session.surveyed.len() as u32,
            },
        )])
    }

    pub fn handle_quit(&self, player: &str, tornado_id: StormId) -> Result<Vec<Outgoing>, SurveyRejection> {
        let mut table = self.sessions.lock();
        table.session_of(player, tornado_id)?;
        if let Some(mut session) = table.remove(tornado_id) {
            session.state = ServerSurveyState::Quit;
            log::info!(
                "{} quit surveying tornado {} after {} chunks",
                player,
                tornado_id,
                session.surveyed.len()
            );
        }
        Ok(vec![Outgoing::broadcast(tornado_id, player, SurveyUpdateKind::Quit)])
    }

    /// Discard the session of a player who left
    pub fn handle_disconnect(&self, player: &str) -> Vec<Outgoing> {
        let mut table = self.sessions.lock();
        let Some(tornado_id) = table.by_player.get(player).copied() else {
            return Vec::new();
        };
        table.remove(tornado_id);
        log::info!("{} disconnected; survey of tornado {} discarded", player, tornado_id);
        vec![Outgoing::broadcast(tornado_id, player, SurveyUpdateKind::Quit)]
    }

    pub fn session(&self, tornado_id: StormId) -> Option<ServerSurveySession> {
        self.sessions.lock().by_tornado.get(&tornado_id).cloned()
    }

    pub fn session_of_player(&self, player: &str) -> Option<StormId> {
        self.sessions.lock().by_player.get(player).copied()
    }

    pub fn has_session(&self, tornado_id: StormId) -> bool {
        self.sessions.lock().by_tornado.contains_key(&tornado_id)
    }

    /// Chunks targeted by any in-progress session
    pub fn chunks_in_use(&self) -> HashSet<ChunkPos> {
        self.sessions
            .lock()
            .by_tornado
            .values()
            .flat_map(|s| s.target_chunks.iter().copied())
            .collect()
    }

    /// Drop the session of a tornado being reset. Returns the surveyor, if any.
    pub fn discard_tornado(&self, tornado_id: StormId) -> Option<String> {
        self.sessions.lock().remove(tornado_id).map(|s| s.surveyor)
    }

    pub fn clear(&self) {
        let mut table = self.sessions.lock();
        table.by_tornado.clear();
        table.by_player.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().by_tornado.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().by_tornado.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurveyConfig;
    use crate::damage::ScouringLevel;
    use crate::weather::StormSnapshot;
    use crate::world::VoxelPos;
    use glam::Vec3;

    struct Fixture {
        tracker: TornadoTracker,
        ledger: EvidenceLedger,
        server: SurveyServer,
    }

    impl Fixture {
        /// Ended tornado 42 with `chunks` damaged chunks along z = 0, each scoured
        fn new(chunks: i32) -> Self {
            let tracker = TornadoTracker::new(&SurveyConfig::default());
            tracker.ingest(&[StormSnapshot::tornado(42, 3, Vec3::new(8.0, 64.0, 8.0), 150, 60.0)], 0);
            let mut dead = StormSnapshot::tornado(42, 3, Vec3::new(8.0, 64.0, 8.0), 150, 60.0);
            dead.dead = true;
            tracker.ingest(&[dead], 20_000);

            let ledger = EvidenceLedger::new();
            for x in 0..chunks {
                tracker.mark_damaged(42, ChunkPos::new(x, 0));
                ledger.add_scouring_evidence(42, VoxelPos::new(x * 16 + 4, 64, 4), ScouringLevel::GrassToDirt);
            }
            Self {
                tracker,
                ledger,
                server: SurveyServer::new(4),
            }
        }

        fn ctx(&self) -> ServerContext<'_> {
            ServerContext {
                tracker: &self.tracker,
                ledger: &self.ledger,
            }
        }

        fn start(&self, player: &str, chunks: Vec<ChunkPos>) -> Result<Vec<Outgoing>, SurveyRejection> {
            self.server.handle_start(player, 42, chunks, &self.ctx(), 100_000)
        }

        fn survey_and_finish(&self, player: &str, rating: EfRating, windspeed: f32) -> Result<Vec<Outgoing>, SurveyRejection> {
            self.start(player, vec![ChunkPos::new(0, 0)])?;
            self.server.handle_action(player, 42, ChunkPos::new(0, 0), rating, windspeed)?;
            self.server.handle_finish(player, 42, rating, windspeed, &self.ctx(), 200_000)
        }
    }

    #[test]
    fn test_start_rejected_while_active() {
        let fx = Fixture::new(1);
        fx.tracker
            .ingest(&[StormSnapshot::tornado(43, 3, Vec3::ZERO, 120, 30.0)], 30_000);
        assert_eq!(
            fx.server.handle_start("A", 43, vec![ChunkPos::new(0, 0)], &fx.ctx(), 30_000),
            Err(SurveyRejection::TornadoActive(43))
        );
        assert!(fx.server.is_empty());
    }

    #[test]
    fn test_one_session_per_tornado_and_player() {
        let fx = Fixture::new(2);
        fx.start("A", vec![ChunkPos::new(0, 0)]).unwrap();
        assert!(matches!(
            fx.start("B", vec![ChunkPos::new(1, 0)]),
            Err(SurveyRejection::SurveyInProgress { .. })
        ));
        assert_eq!(fx.server.session_of_player("A"), Some(42));
        assert_eq!(fx.server.len(), 1);
    }

    #[test]
    fn test_malformed_player_name_rejected() {
        let fx = Fixture::new(1);
        let start = || ClientPacket::StartSurvey {
            tornado_id: 42,
            chunks: vec![ChunkPos::new(0, 0)],
        };
        for name in ["", "surveyor_with_a_long_name", "two words"] {
            let out = fx.server.handle_packet(name, start(), &fx.ctx(), 100_000);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].recipient, Recipient::Player(name.to_string()));
            assert!(matches!(
                out[0].packet,
                ServerPacket::SurveyUpdate {
                    update: SurveyUpdateKind::Error { session_closed: false, .. },
                    ..
                }
            ));
        }
        assert!(fx.server.is_empty());
    }

    #[test]
    fn test_start_requires_evidence() {
        let fx = Fixture::new(1);
        assert_eq!(
            fx.start("A", vec![ChunkPos::new(5, 5)]),
            Err(SurveyRejection::NoDamageEvidence(42))
        );
    }

    #[test]
    fn test_coverage_gate() {
        let fx = Fixture::new(8);
        let chunks: Vec<ChunkPos> = (0..8).map(|x| ChunkPos::new(x, 0)).collect();
        fx.start("A", chunks).unwrap();
        assert_eq!(fx.server.session(42).unwrap().required, 2);

        fx.server.handle_action("A", 42, ChunkPos::new(0, 0), EfRating::EF3, 147.0).unwrap();
        assert_eq!(
            fx.server.handle_finish("A", 42, EfRating::EF3, 147.0, &fx.ctx(), 1),
            Err(SurveyRejection::InsufficientCoverage { surveyed: 1, required: 2 })
        );
        fx.server.handle_action("A", 42, ChunkPos::new(1, 0), EfRating::EF4, 170.0).unwrap();
        fx.server.handle_finish("A", 42, EfRating::EF4, 170.0, &fx.ctx(), 2).unwrap();

        let track = fx.tracker.get(42).unwrap();
        assert_eq!(track.rating(), EfRating::EF4);
        assert!(fx.ledger.get(42, ChunkPos::new(1, 0)).unwrap().is_surveyed());
        assert!(!fx.ledger.get(42, ChunkPos::new(2, 0)).unwrap().is_surveyed());
    }

    #[test]
    fn test_chunk_action_validation() {
        let fx = Fixture::new(2);
        fx.start("A", vec![ChunkPos::new(0, 0)]).unwrap();
        assert_eq!(
            fx.server.handle_action("A", 42, ChunkPos::new(1, 0), EfRating::EF3, 140.0),
            Err(SurveyRejection::ChunkNotInSurvey(ChunkPos::new(1, 0)))
        );
        assert_eq!(
            fx.server.handle_action("B", 42, ChunkPos::new(0, 0), EfRating::EF3, 140.0),
            Err(SurveyRejection::NoSession(42))
        );
        assert_eq!(fx.server.handle_action("A", 42, ChunkPos::new(0, 0), EfRating::EF3, 140.0).unwrap().len(), 1);
        assert!(fx.server.handle_action("A", 42, ChunkPos::new(0, 0), EfRating::EF5, 250.0).unwrap().is_empty());
        assert_eq!(fx.server.session(42).unwrap().final_result().0, EfRating::EF3);
    }

    #[test]
    fn test_same_surveyor_may_lower_rating() {
        let fx = Fixture::new(1);
        fx.survey_and_finish("A", EfRating::EF4, 170.0).unwrap();
        fx.survey_and_finish("A", EfRating::EF2, 120.0).unwrap();
        assert_eq!(fx.tracker.get(42).unwrap().rating(), EfRating::EF2);
    }

    #[test]
    fn test_other_surveyor_cannot_downgrade() {
        let fx = Fixture::new(1);
        fx.survey_and_finish("A", EfRating::EF3, 147.0).unwrap();
        let before = fx.tracker.get(42).unwrap();
        let ledger_before = fx.ledger.get(42, ChunkPos::new(0, 0));

        let rejection = fx.survey_and_finish("B", EfRating::EF1, 100.0).unwrap_err();
        assert!(matches!(rejection, SurveyRejection::DowngradeConflict { .. }));
        assert_eq!(fx.tracker.get(42).unwrap(), before);
        assert_eq!(fx.ledger.get(42, ChunkPos::new(0, 0)), ledger_before);
        assert!(fx.server.is_empty());

        // A higher rating from someone else is accepted
        fx.survey_and_finish("B", EfRating::EF4, 170.0).unwrap();
        assert_eq!(fx.tracker.get(42).unwrap().survey().unwrap().surveyed_by, "B");
    }

    #[test]
    fn test_quit_and_disconnect_discard() {
        let fx = Fixture::new(1);
        fx.start("A", vec![ChunkPos::new(0, 0)]).unwrap();
        fx.server.handle_action("A", 42, ChunkPos::new(0, 0), EfRating::EF3, 147.0).unwrap();
        fx.server.handle_quit("A", 42).unwrap();
        assert!(fx.server.is_empty());
        assert!(!fx.tracker.get(42).unwrap().is_surveyed());

        fx.start("A", vec![ChunkPos::new(0, 0)]).unwrap();
        let out = fx.server.handle_disconnect("A");
        assert_eq!(out.len(), 1);
        assert!(fx.server.session_of_player("A").is_none());
        assert!(fx.server.handle_disconnect("A").is_empty());
    }

    #[test]
    fn test_rejection_addressed_to_sender() {
        let fx = Fixture::new(1);
        let out = fx.server.handle_packet("A", ClientPacket::QuitSurvey { tornado_id: 42 }, &fx.ctx(), 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient, Recipient::Player("A".to_string()));
        assert!(matches!(
            &out[0].packet,
            ServerPacket::SurveyUpdate { update: SurveyUpdateKind::Error { session_closed: false, .. }, .. }
        ));
    }
}

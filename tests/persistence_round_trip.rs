use std::sync::Arc;

use glam::Vec3;
use tempfile::TempDir;
use tornado_survey::{
    persistence::{TrackFile, TrackRecord, SCHEMA_VERSION},
    BlockId, BlockRegistry, ChunkPos, EfRating, EvidenceLedger, MemoryWorld, ScouringLevel, SharedFeed,
    StormSession, StormSnapshot, SurveyConfig, SurveyDataStore, TornadoTrack, TornadoTracker, VoxelPos,
};

fn ended_track(id: i64) -> TornadoTrack {
    let mut track = TornadoTrack::new(&StormSnapshot::tornado(id, 3, Vec3::new(0.0, 64.0, 0.0), 140, 50.0), 0);
    track.observe(&StormSnapshot::tornado(id, 4, Vec3::new(40.0, 64.0, 10.0), 180, 70.0), 10_000, 10_000);
    track.observe(&StormSnapshot::tornado(id, 4, Vec3::new(80.0, 64.0, 20.0), 0, 30.0), 20_000, 10_000);
    track.mark_damaged(ChunkPos::new(0, 0));
    track.mark_damaged(ChunkPos::new(2, 0));
    track.mark_damaged(ChunkPos::new(5, 1));
    track.deactivate(60_000, 0.1, 5_000);
    track
}

#[test]
fn test_tracks_and_ledger_survive_reload() {
    let dir = TempDir::new().unwrap();
    let store = SurveyDataStore::new(dir.path());
    let config = SurveyConfig::deterministic(3);

    let tracker = TornadoTracker::new(&config);
    let unrated = ended_track(1);
    let mut rated = ended_track(2);
    rated.apply_survey("surveyor", 90_000, EfRating::EF4, 181.0);
    tracker.insert(unrated.clone());
    tracker.insert(rated.clone());

    let ledger = EvidenceLedger::new();
    ledger.add_scouring_evidence(2, VoxelPos::new(3, 64, 3), ScouringLevel::DirtToMedium);
    ledger.add_debarking_evidence(2, VoxelPos::new(35, 70, 4));
    ledger.mark_surveyed(2, ChunkPos::new(0, 0), "surveyor", 90_000, EfRating::EF4, 178.5);
    store.save_all(&tracker, &ledger, 100_000).unwrap();

    // A fresh world session picks everything up on load
    let world = Arc::new(MemoryWorld::new(BlockRegistry::with_defaults()));
    let session = StormSession::new(config, Arc::new(SharedFeed::new()), world).with_store(store.clone());
    session.on_world_load().unwrap();

    assert_eq!(session.tracker().get(1).unwrap(), unrated);
    assert_eq!(session.tracker().get(2).unwrap(), rated);
    assert_eq!(session.tracker().get(1).unwrap().rating(), EfRating::UNRATED);
    assert_eq!(session.ledger().snapshot(), ledger.snapshot());

    let data = session.ledger().get(2, ChunkPos::new(0, 0)).unwrap();
    assert_eq!(data.minimum_ef_rating_from_evidence(), EfRating::EF4);
    assert!(data.enhanced_windspeed_estimate() >= 170.0);
    assert!(data.is_surveyed());
}

#[test]
fn test_tampered_rating_loads_unrated() {
    let dir = TempDir::new().unwrap();
    let store = SurveyDataStore::new(dir.path());

    let mut record = TrackRecord::from(&ended_track(9));
    record.rating = "EF5".to_string();
    record.surveyed_ef_rating = 5;
    let file = TrackFile {
        schema_version: SCHEMA_VERSION,
        saved_at: 0,
        tracks: vec![record],
    };
    std::fs::write(store.tracks_path(), serde_json::to_vec(&file).unwrap()).unwrap();

    let tracks = store.load_tracks().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].rating(), EfRating::UNRATED);
    assert!(!tracks[0].is_surveyed());
}

#[test]
fn test_newer_schema_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let store = SurveyDataStore::new(dir.path());
    let json = r#"{
        "schema_version": 7,
        "saved_at": 5,
        "tracks": [
            { "id": 11, "active": false, "max_windspeed": 120.0, "first_seen": 1, "last_seen": 2,
              "damaged_chunks": [{ "x": 1, "z": 2 }], "funnel_colour": "grey" }
        ],
        "weather_mod_version": "2.0"
    }"#;
    std::fs::write(store.tracks_path(), json).unwrap();

    let tracks = store.load_tracks().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id, 11);
    assert_eq!(tracks[0].max_windspeed(), 120.0);
    assert!(tracks[0].damaged_chunks().contains(&ChunkPos::new(1, 2)));
    assert!(tracks[0].position_history().is_empty());
    assert_eq!(tracks[0].rating(), EfRating::UNRATED);
}

#[test]
fn test_session_saves_on_unload() {
    let dir = TempDir::new().unwrap();
    let store = SurveyDataStore::new(dir.path().join("world").join("tornado_survey"));
    let feed = Arc::new(SharedFeed::new());
    let world = MemoryWorld::new(BlockRegistry::with_defaults());
    world.insert_chunk(
        ChunkPos::new(0, 0),
        tornado_survey::world::ChunkColumn::flat(96, 64, BlockId::GRASS),
        true,
    );
    let session = StormSession::new(SurveyConfig::deterministic(5), feed.clone(), Arc::new(world))
        .with_store(store.clone());
    session.on_world_load().unwrap();

    feed.publish(vec![StormSnapshot::tornado(77, 3, Vec3::new(8.0, 64.0, 8.0), 160, 60.0)]);
    session.tick(0);
    session.on_world_unload(1_000).unwrap();
    assert!(session.tracker().is_empty());

    let tracks = store.load_tracks().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id, 77);
    assert!(tracks[0].is_active());
}

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tornado_survey::{
    time::format_timestamp, EvidenceLedger, StormId, SurveyDataStore, TornadoTrack,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print tornado tracks and damage evidence from a save directory", long_about = None)]
struct Args {
    /// Directory holding tornado_tracks.json and damage_ledger.json
    dir: PathBuf,
    /// Also list per-chunk evidence
    #[arg(long)]
    evidence: bool,
    /// Only show this tornado
    #[arg(long)]
    tornado: Option<StormId>,
}

fn print_track(track: &TornadoTrack, ledger: &EvidenceLedger, evidence: bool) {
    let summary = track.summary();
    println!(
        "Tornado {} [{}] {}",
        summary.id,
        if summary.active { "active" } else { "ended" },
        summary.rating
    );
    println!(
        "  seen {} .. {}",
        format_timestamp(summary.first_seen),
        format_timestamp(summary.last_seen)
    );
    println!(
        "  max {:.0} mph, max width {:.0}, path {:.0} blocks over {} samples",
        summary.max_windspeed, summary.max_width, summary.path_length, summary.sample_count
    );
    println!(
        "  {} damaged chunks, {} with evidence",
        summary.damaged_chunk_count,
        ledger.chunks_with_evidence(summary.id).len()
    );
    match track.survey() {
        Some(survey) => println!(
            "  surveyed by {} at {} ({:.0} mph)",
            survey.surveyed_by,
            format_timestamp(survey.survey_time),
            survey.max_windspeed
        ),
        None => println!("  not surveyed"),
    }

    if !evidence {
        return;
    }
    for data in ledger.entries_for(summary.id) {
        if !data.has_damage() {
            continue;
        }
        let (rating, windspeed) = data.survey_assessment();
        println!(
            "    chunk {}: {} destroyed, {} debarked, {} scoured -> {} ({:.0} mph){}",
            data.chunk,
            data.damage_records.len(),
            data.debarked_logs.len(),
            data.scouring.len(),
            rating,
            windspeed,
            if data.is_surveyed() { ", surveyed" } else { "" }
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = SurveyDataStore::new(args.dir.clone());
    let mut tracks = store
        .load_tracks()
        .with_context(|| format!("reading {}", store.tracks_path().display()))?;
    let ledger = EvidenceLedger::new();
    store
        .load_ledger(&ledger)
        .with_context(|| format!("reading {}", store.ledger_path().display()))?;

    if let Some(id) = args.tornado {
        tracks.retain(|t| t.id == id);
        if tracks.is_empty() {
            bail!("no tornado {} in {}", id, args.dir.display());
        }
    }
    tracks.sort_by_key(|t| t.id);

    if tracks.is_empty() {
        println!("No tornado tracks in {}", args.dir.display());
        return Ok(());
    }
    for track in &tracks {
        print_track(track, &ledger, args.evidence);
    }
    Ok(())
}

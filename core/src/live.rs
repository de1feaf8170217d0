//! `LiveParser` — forward-streaming tail parser with a 500 ms poll loop and
//! a 1 Hz snapshot timer (spec.md §4.7).
//!
//! Grounded on `core/src/combat_log/reader.rs`'s `tail_log_file` poll loop
//! (`tokio::time::sleep` re-arming itself) and `context/watcher.rs`'s
//! background-task pattern; the poll and snapshot loops here are two
//! cooperative `tokio::spawn` tasks sharing an `Arc<RwLock<LiveState>>`
//! rather than the teacher's single watcher task, since spec.md §4.7 and §9
//! call for two independently-scheduled cooperative tasks.

use crate::error::ReaderError;
use crate::line::{is_player_id, is_star_target, player_handle, DamageType, LogLine, LogLineCodec};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct PlayerAccumulator {
    pub damage: f64,
    pub heal: f64,
    pub damage_buffer: f64,
    pub base_damage_buffer: f64,
    pub attacks_in_buffer: f64,
    /// Supplemental: mirrors `damage_buffer`'s reset-every-snapshot shape
    /// for heals, since spec.md §4.7 names only `damage_buffer` explicitly
    /// but HPS needs an equivalent per-snapshot delta.
    pub heal_buffer: f64,
    pub combat_start: Option<NaiveDateTime>,
    pub combat_end: Option<NaiveDateTime>,
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotMetrics {
    pub dps: f64,
    pub hps: f64,
    pub debuff: f64,
    pub attacks_in_share: f64,
}

pub type SnapshotCallback = Arc<dyn Fn(HashMap<String, SnapshotMetrics>) + Send + Sync>;

struct LiveState {
    path: PathBuf,
    position: u64,
    accumulators: HashMap<String, PlayerAccumulator>,
    last_line_time: Option<NaiveDateTime>,
    inactivity_gap: f64,
}

pub struct LiveParser {
    active: Arc<AtomicBool>,
    poll_handle: Option<JoinHandle<()>>,
    snapshot_handle: Option<JoinHandle<()>>,
}

impl LiveParser {
    /// Opens `path` for forward tailing from end-of-file and starts the two
    /// cooperative tasks (spec.md §4.7).
    pub fn start(path: PathBuf, inactivity_gap: f64, on_snapshot: SnapshotCallback) -> Result<Self, ReaderError> {
        if !path.exists() {
            return Err(ReaderError::PathNotFound(path));
        }
        let filesize = std::fs::metadata(&path)
            .map_err(|e| ReaderError::Io { path: path.clone(), source: e })?
            .len();

        let state = Arc::new(RwLock::new(LiveState {
            path,
            position: filesize,
            accumulators: HashMap::new(),
            last_line_time: None,
            inactivity_gap,
        }));
        let active = Arc::new(AtomicBool::new(true));

        let poll_state = state.clone();
        let poll_active = active.clone();
        let poll_handle = tokio::spawn(async move {
            while poll_active.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let mut guard = poll_state.write().await;
                if let Err(error) = poll_once(&mut guard) {
                    tracing::warn!(%error, "live parser poll failed");
                }
            }
        });

        let snapshot_state = state.clone();
        let snapshot_active = active.clone();
        let snapshot_handle = tokio::spawn(async move {
            while snapshot_active.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let mut guard = snapshot_state.write().await;
                let snapshot = take_snapshot(&mut guard);
                drop(guard);
                on_snapshot(snapshot);
            }
        });

        Ok(LiveParser { active, poll_handle: Some(poll_handle), snapshot_handle: Some(snapshot_handle) })
    }

    /// Clears the active flag, cancels the snapshot timer, and allows at
    /// most one further poll iteration in flight (spec.md §5).
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.snapshot_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for LiveParser {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_once(state: &mut LiveState) -> Result<(), ReaderError> {
    let mut file = std::fs::File::open(&state.path).map_err(|e| ReaderError::Io { path: state.path.clone(), source: e })?;
    let filesize = file
        .seek(SeekFrom::End(0))
        .map_err(|e| ReaderError::Io { path: state.path.clone(), source: e })?;
    if filesize <= state.position {
        return Ok(());
    }
    file.seek(SeekFrom::Start(state.position))
        .map_err(|e| ReaderError::Io { path: state.path.clone(), source: e })?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| ReaderError::Io { path: state.path.clone(), source: e })?;
    state.position = filesize;

    let text = String::from_utf8_lossy(&buf).into_owned();
    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        // Tolerate a not-yet-flushed trailing partial line; it will be
        // picked up whole on the next poll.
        if let Ok(parsed) = LogLineCodec::parse(raw) {
            apply_line(state, &parsed);
        }
    }
    Ok(())
}

fn apply_line(state: &mut LiveState, line: &LogLine) {
    if let Some(last) = state.last_line_time {
        let gap = (line.timestamp - last).num_milliseconds() as f64 / 1000.0;
        if gap > state.inactivity_gap {
            state.accumulators.clear();
        }
    }
    state.last_line_time = Some(line.timestamp);

    let is_heal = (line.damage_type == DamageType::HitPoints && line.magnitude < 0.0)
        || (line.damage_type == DamageType::Shield && line.magnitude < 0.0 && line.magnitude2 >= 0.0);
    let magnitude = line.magnitude.abs();

    if is_player_id(&line.owner_id) {
        let handle = player_handle(&line.owner_id).unwrap_or(&line.owner_id).to_string();
        let acc = state.accumulators.entry(handle).or_default();
        if is_heal {
            acc.heal += magnitude;
            acc.heal_buffer += magnitude;
        } else {
            acc.damage += magnitude;
            acc.damage_buffer += magnitude;
            acc.base_damage_buffer += line.magnitude2.abs();
            if !is_star_target(&line.target_id) && line.owner_id != line.target_id {
                acc.combat_start.get_or_insert(line.timestamp);
                acc.combat_end = Some(line.timestamp);
            }
            if line.flags.kill {
                acc.kills += 1;
            }
        }
    }
    if is_player_id(&line.target_id) && !is_heal {
        let handle = player_handle(&line.target_id).unwrap_or(&line.target_id).to_string();
        let acc = state.accumulators.entry(handle).or_default();
        acc.attacks_in_buffer += 1.0;
        if line.flags.kill {
            acc.deaths += 1;
        }
    }
}

fn take_snapshot(state: &mut LiveState) -> HashMap<String, SnapshotMetrics> {
    let total_attacks_in: f64 = state.accumulators.values().map(|a| a.attacks_in_buffer).sum();
    let mut out = HashMap::with_capacity(state.accumulators.len());
    for (handle, acc) in state.accumulators.iter_mut() {
        let debuff = if acc.base_damage_buffer != 0.0 {
            acc.damage_buffer / acc.base_damage_buffer - 1.0
        } else {
            0.0
        };
        out.insert(
            handle.clone(),
            SnapshotMetrics {
                dps: acc.damage_buffer,
                hps: acc.heal_buffer,
                debuff,
                attacks_in_share: if total_attacks_in > 0.0 { acc.attacks_in_buffer / total_attacks_in } else { 0.0 },
            },
        );
        acc.damage_buffer = 0.0;
        acc.base_damage_buffer = 0.0;
        acc.attacks_in_buffer = 0.0;
        acc.heal_buffer = 0.0;
    }
    out
}

//! IoU-based multi-object tracker
//!
//! Consolidates per-frame detections into persistent track identities.
//!
//! Association is greedy over all (track, detection) pairs whose IoU clears
//! the threshold, taken in order of descending IoU, then descending detection
//! confidence, then ascending track id. Track boxes are predicted forward to
//! the frame time with a constant-velocity model before matching, so a steadily
//! moving object keeps its identity.
//!
//! Lifecycle per processed frame:
//! - matched: hits += 1, misses = 0; Tentative becomes Confirmed at `confirm_hits`
//! - unmatched: misses += 1, hits = 0; reaching `loss_timeout_frames` marks it Lost
//! - Lost: aged once per frame, removed after `lost_grace_frames`
//!
//! Misses count processed frames, not elapsed time, so frames dropped by the
//! scheduler never terminate a track early.
//!
//! The dominant track is sticky: a challenger takes over only when its
//! salience beats the incumbent's by `dominance_margin`, or when the
//! incumbent stops being Confirmed.

use crate::config::TrackerConfig;
use serde::Serialize;
use sonoro_common::vision::{BoundingBox, ConfidenceLevel, Detection, TrackId, TrackState};
use sonoro_common::Timestamp;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Prediction horizon cap; beyond this the track is assumed stationary
const MAX_PREDICTION_SECS: f64 = 1.0;

/// Weight of the newest velocity measurement
const VELOCITY_SMOOTHING: f32 = 0.5;

/// A persistent object identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedObject {
    pub id: TrackId,
    pub label: String,
    /// Smoothed bounding box at `last_seen`
    pub bbox: BoundingBox,
    /// Box centre velocity in pixels per second
    pub velocity: (f32, f32),
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// Consecutive matched frames
    pub hits: u32,
    /// Consecutive unmatched frames
    pub misses: u32,
    /// Total matched frames over the track lifetime
    pub total_hits: u64,
    /// Confidence of the latest matched detection
    pub confidence: f32,
    pub state: TrackState,
    /// Processed frames spent in the Lost state
    lost_frames: u32,
}

impl TrackedObject {
    fn new(id: TrackId, detection: &Detection, now: Timestamp) -> Self {
        Self {
            id,
            label: detection.label.clone(),
            bbox: detection.bbox,
            velocity: (0.0, 0.0),
            first_seen: now,
            last_seen: now,
            hits: 1,
            misses: 0,
            total_hits: 1,
            confidence: detection.confidence,
            state: TrackState::Tentative,
            lost_frames: 0,
        }
    }

    /// Constant-velocity prediction of the box at `now`
    pub fn predicted_box(&self, now: Timestamp) -> BoundingBox {
        let dt = now.secs_since(self.last_seen).clamp(0.0, MAX_PREDICTION_SECS) as f32;
        self.bbox.translated(self.velocity.0 * dt, self.velocity.1 * dt)
    }

    /// Time since first detection
    pub fn dwell(&self, now: Timestamp) -> std::time::Duration {
        now.saturating_since(self.first_seen)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TrackState::Tentative | TrackState::Confirmed)
    }

    /// Area-weighted confidence used for dominant-object selection
    pub fn salience(&self) -> f32 {
        self.bbox.area() * self.confidence
    }
}

/// Lifecycle change recorded during an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackTransition {
    Confirmed { id: TrackId, label: String, at: Timestamp },
    Lost { id: TrackId, label: String, at: Timestamp },
    Removed { id: TrackId, label: String, at: Timestamp },
}

/// Multi-object tracker
pub struct ObjectTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, TrackedObject>,
    next_id: u64,
    transitions: Vec<TrackTransition>,
    last_update: Option<Timestamp>,
    frames_processed: u64,
    dominant: Option<TrackId>,
}

impl ObjectTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            transitions: Vec::new(),
            last_update: None,
            frames_processed: 0,
            dominant: None,
        }
    }

    /// Process one frame's detections
    ///
    /// # Arguments
    /// * `detections` - Detections of a single frame (any order)
    /// * `now` - Frame timestamp; must not go backwards
    ///
    /// # Returns
    /// All tracks that still exist after this frame, ordered by id
    pub fn update(&mut self, detections: &[Detection], now: Timestamp) -> Vec<TrackedObject> {
        let now = match self.last_update {
            Some(last) if now < last => {
                debug!("Tracker got out-of-order timestamp {} (last {}), clamping", now, last);
                last
            }
            _ => now,
        };
        self.last_update = Some(now);
        self.frames_processed += 1;

        // Lost tracks age first, so a track lost on this frame is not aged twice
        self.age_lost_tracks(now);

        let candidates: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.is_reliable(self.config.min_confidence))
            .collect();

        let (matches, unmatched_detections) = self.associate(&candidates, now);

        let mut matched_tracks = Vec::with_capacity(matches.len());
        for (track_id, detection_index) in matches {
            self.apply_match(track_id, candidates[detection_index], now);
            matched_tracks.push(track_id);
        }

        self.apply_misses(&matched_tracks, now);

        for detection_index in unmatched_detections {
            self.spawn(candidates[detection_index], now);
        }

        self.select_dominant();
        self.tracks.values().cloned().collect()
    }

    /// Greedy association, returns matched (track, detection index) pairs and unmatched detections
    fn associate(&self, detections: &[&Detection], now: Timestamp) -> (Vec<(TrackId, usize)>, Vec<usize>) {
        struct Pair {
            iou: f32,
            confidence: f32,
            track: TrackId,
            detection: usize,
        }

        let mut pairs = Vec::new();
        for track in self.tracks.values().filter(|t| t.is_active()) {
            let predicted = track.predicted_box(now);
            for (index, detection) in detections.iter().enumerate() {
                if detection.label != track.label {
                    continue;
                }
                let iou = predicted.iou(&detection.bbox);
                if iou >= self.config.iou_threshold {
                    pairs.push(Pair {
                        iou,
                        confidence: detection.confidence,
                        track: track.id,
                        detection: index,
                    });
                }
            }
        }

        pairs.sort_by(|a, b| {
            b.iou
                .total_cmp(&a.iou)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.track.cmp(&b.track))
                .then(a.detection.cmp(&b.detection))
        });

        let mut track_used = std::collections::BTreeSet::new();
        let mut detection_used = vec![false; detections.len()];
        let mut matches = Vec::new();
        for pair in pairs {
            if detection_used[pair.detection] || track_used.contains(&pair.track) {
                continue;
            }
            detection_used[pair.detection] = true;
            track_used.insert(pair.track);
            trace!("Matched track {} to detection {} (IoU {:.3})", pair.track, pair.detection, pair.iou);
            matches.push((pair.track, pair.detection));
        }

        let unmatched = detection_used
            .iter()
            .enumerate()
            .filter(|(_, used)| !**used)
            .map(|(index, _)| index)
            .collect();

        (matches, unmatched)
    }

    fn apply_match(&mut self, id: TrackId, detection: &Detection, now: Timestamp) {
        let confirm_hits = self.config.confirm_hits;
        let smoothing = self.config.box_smoothing;
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };

        let dt = now.secs_since(track.last_seen) as f32;
        let previous_center = track.bbox.center();
        let smoothed = track.predicted_box(now).lerp(&detection.bbox, smoothing);
        if dt > 0.0 {
            let center = smoothed.center();
            let measured = ((center.0 - previous_center.0) / dt, (center.1 - previous_center.1) / dt);
            track.velocity = (
                track.velocity.0 + (measured.0 - track.velocity.0) * VELOCITY_SMOOTHING,
                track.velocity.1 + (measured.1 - track.velocity.1) * VELOCITY_SMOOTHING,
            );
        }

        track.bbox = smoothed;
        track.last_seen = now;
        track.hits = track.hits.saturating_add(1);
        track.misses = 0;
        track.total_hits += 1;
        track.confidence = detection.confidence;

        if track.state == TrackState::Tentative && track.hits >= confirm_hits {
            track.state = TrackState::Confirmed;
            debug!(
                "Track {} ({}) confirmed, {} confidence",
                track.id,
                track.label,
                ConfidenceLevel::from_score(track.confidence)
            );
            self.transitions.push(TrackTransition::Confirmed {
                id,
                label: track.label.clone(),
                at: now,
            });
        }
    }

    fn apply_misses(&mut self, matched: &[TrackId], now: Timestamp) {
        let loss_timeout = self.config.loss_timeout_frames;
        for track in self.tracks.values_mut().filter(|t| t.is_active()) {
            if matched.contains(&track.id) {
                continue;
            }
            track.misses = track.misses.saturating_add(1);
            track.hits = 0;
            if track.misses >= loss_timeout {
                track.state = TrackState::Lost;
                track.lost_frames = 0;
                debug!("Track {} ({}) lost after {} missed frames", track.id, track.label, track.misses);
                self.transitions.push(TrackTransition::Lost {
                    id: track.id,
                    label: track.label.clone(),
                    at: now,
                });
            }
        }
    }

    fn age_lost_tracks(&mut self, now: Timestamp) {
        let grace = self.config.lost_grace_frames;
        let mut expired = Vec::new();
        for track in self.tracks.values_mut().filter(|t| t.state == TrackState::Lost) {
            track.lost_frames = track.lost_frames.saturating_add(1);
            if track.lost_frames >= grace {
                expired.push(track.id);
            }
        }
        for id in expired {
            if let Some(track) = self.tracks.remove(&id) {
                debug!("Track {} ({}) removed", id, track.label);
                self.transitions.push(TrackTransition::Removed {
                    id,
                    label: track.label,
                    at: now,
                });
            }
        }
    }

    fn spawn(&mut self, detection: &Detection, now: Timestamp) {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        let mut track = TrackedObject::new(id, detection, now);
        trace!("New track {} ({})", id, track.label);

        if self.config.confirm_hits <= 1 {
            track.state = TrackState::Confirmed;
            self.transitions.push(TrackTransition::Confirmed {
                id,
                label: track.label.clone(),
                at: now,
            });
        }
        self.tracks.insert(id, track);
    }

    /// Drain lifecycle transitions recorded since the last call
    pub fn take_transitions(&mut self) -> Vec<TrackTransition> {
        std::mem::take(&mut self.transitions)
    }

    /// Re-evaluate the dominant track after an update
    fn select_dominant(&mut self) {
        let challenger = self
            .tracks
            .values()
            .filter(|t| t.state == TrackState::Confirmed)
            .fold(None, |best: Option<&TrackedObject>, track| match best {
                Some(current) if current.salience() >= track.salience() => Some(current),
                _ => Some(track),
            });
        let incumbent = self
            .dominant
            .and_then(|id| self.tracks.get(&id))
            .filter(|t| t.state == TrackState::Confirmed);

        let selected = match (incumbent, challenger) {
            (Some(current), Some(best)) if best.id != current.id => {
                let bar = current.salience() * (1.0 + self.config.dominance_margin);
                if best.salience() > bar {
                    Some(best.id)
                } else {
                    Some(current.id)
                }
            }
            (Some(current), _) => Some(current.id),
            (None, best) => best.map(|t| t.id),
        };

        if selected != self.dominant {
            debug!("Dominant track {:?} -> {:?}", self.dominant, selected);
            self.dominant = selected;
        }
    }

    /// The Confirmed track driving the music
    ///
    /// Initially the most salient one (largest area × confidence, ties to the
    /// lower id); kept until a challenger clears the dominance margin.
    pub fn dominant(&self) -> Option<&TrackedObject> {
        self.dominant.and_then(|id| self.tracks.get(&id))
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedObject> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks.values()
    }

    /// Tentative plus Confirmed tracks
    pub fn active_count(&self) -> usize {
        self.tracks.values().filter(|t| t.is_active()).count()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

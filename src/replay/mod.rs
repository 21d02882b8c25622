//! Replay timeline over a stored session.
//!
//! Rendering is left to the page replay library; the daemon keeps the clock:
//! which session is loaded, where playback is, at what speed, and which
//! events are due at the current position.

use crate::error::{Result, TabreelError};
use crate::recording::schema::{RecordingEvent, RecordingSession};
use serde::Serialize;
use tokio::time::Instant;

/// Playback speeds offered by the replay UI.
pub const SPEEDS: [f64; 6] = [0.25, 0.5, 1.0, 1.5, 2.0, 4.0];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStatus {
    pub session_id: String,
    pub is_playing: bool,
    /// Playback position in ms from the first event.
    pub current_time: u64,
    pub total_time: u64,
    pub speed: f64,
    pub progress_percent: u64,
    pub events_due: usize,
    pub events_total: usize,
}

#[derive(Debug)]
pub struct Replayer {
    session_id: String,
    events: Vec<RecordingEvent>,
    first_timestamp: u64,
    total_time: u64,
    speed: f64,
    /// Position when playback last (re)anchored.
    position: u64,
    playing_since: Option<Instant>,
}

impl Replayer {
    /// Load the flattened history of `session`. Fails if it has no events.
    pub fn new(session: &RecordingSession) -> Result<Self> {
        let events = session.flatten_events();
        if events.is_empty() {
            return Err(TabreelError::Replay("No events to replay".to_string()));
        }

        let first_timestamp = events.iter().filter_map(|e| e.timestamp()).min().unwrap_or(0);
        let last_timestamp = events
            .iter()
            .filter_map(|e| e.timestamp())
            .max()
            .unwrap_or(first_timestamp);

        Ok(Self {
            session_id: session.id.clone(),
            events,
            first_timestamp,
            total_time: last_timestamp.saturating_sub(first_timestamp),
            speed: 1.0,
            position: 0,
            playing_since: None,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn total_time(&self) -> u64 {
        self.total_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some() && self.current_time() < self.total_time
    }

    pub fn current_time(&self) -> u64 {
        match self.playing_since {
            Some(since) => {
                let elapsed = since.elapsed().as_millis() as f64 * self.speed;
                (self.position + elapsed as u64).min(self.total_time)
            }
            None => self.position,
        }
    }

    /// Start or resume playback. Playing again after the end was reached
    /// restarts from the beginning.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        self.position = self.current_time();
        if self.position >= self.total_time {
            self.position = 0;
        }
        self.playing_since = Some(Instant::now());
    }

    pub fn pause(&mut self) {
        self.position = self.current_time();
        self.playing_since = None;
    }

    /// Jump to `time` ms from the first event, clamped to the session length.
    pub fn seek(&mut self, time: u64) {
        self.position = time.min(self.total_time);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        tracing::debug!("Seeking to {}ms in session {}", self.position, self.session_id);
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !SPEEDS.contains(&speed) {
            return Err(TabreelError::Validation(format!(
                "unsupported speed {} (expected one of {:?})",
                speed, SPEEDS
            )));
        }
        // Re-anchor so the position reached so far is kept.
        self.position = self.current_time();
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        self.speed = speed;
        Ok(())
    }

    /// Events reached at the current position, in history order. Batches of
    /// different tabs may overlap in time, so every event is checked.
    pub fn due_events(&self) -> Vec<&RecordingEvent> {
        let now = self.first_timestamp + self.current_time();
        self.events
            .iter()
            .filter(|e| e.timestamp().map_or(true, |ts| ts <= now))
            .collect()
    }

    pub fn status(&self) -> ReplayStatus {
        let current_time = self.current_time();
        let progress_percent = if self.total_time > 0 {
            current_time * 100 / self.total_time
        } else {
            0
        };
        ReplayStatus {
            session_id: self.session_id.clone(),
            is_playing: self.is_playing(),
            current_time,
            total_time: self.total_time,
            speed: self.speed,
            progress_percent,
            events_due: self.due_events().len(),
            events_total: self.events.len(),
        }
    }
}

/// Render a position as `m:ss`.
pub fn format_time(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

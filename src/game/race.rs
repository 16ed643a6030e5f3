//! Checkpoint race: a Bézier circuit revealed through a sliding window of trigger zones.
//!
//! The race never touches the world directly. Every call returns the [`RaceEvent`]s the
//! owning world has to apply (zones to add or remove, start and finish notifications).

use std::collections::VecDeque;

use super::zone::{Zone, ZoneAction};
use super::{EntityId, SessionId};
use crate::util::math::Vec3;

/// Checkpoints materialized ahead of the racer
pub const VISIBLE_WAYPOINTS: usize = 3;
pub const MAX_LAPS: usize = 1;
pub const CHECKPOINT_SIZE: f32 = 5.0;
/// Distance from a checkpoint at which it counts as reached
pub const REACH_RADIUS: f32 = 5.0;
pub const BEZIER_SEGMENTS: usize = 200;
/// Minimum arc length between sampled checkpoints
pub const MIN_SPACING: f32 = 100.0;
/// Where a racer's car is placed relative to the first checkpoint
pub const START_OFFSET: [f32; 3] = [0.0, 5.0, -20.0];

const CHECKPOINT_COLOR: &str = "#FFA500";

/// Cubic Bézier point, flattened to y = 0
pub fn bezier_point(t: f32, p: &[Vec3; 4]) -> Vec3 {
    let u = 1.0 - t;
    let mut point = p[0] * (u * u * u) + p[1] * (3.0 * u * u * t) + p[2] * (3.0 * u * t * t) + p[3] * (t * t * t);
    point.y = 0.0;
    point
}

/// Sample a curve, keeping the start point and then a point whenever the travelled
/// distance since the last kept one reaches `min_spacing`
pub fn sample_bezier(p: &[Vec3; 4], segments: usize, min_spacing: f32) -> Vec<Vec3> {
    let mut prev = bezier_point(0.0, p);
    let mut points = vec![prev];
    let mut travelled = 0.0;
    for i in 1..=segments {
        let current = bezier_point(i as f32 / segments as f32, p);
        travelled += (current - prev).norm();
        if travelled >= min_spacing {
            points.push(current);
            travelled = 0.0;
        }
        prev = current;
    }
    points
}

/// The built-in two-curve circuit
pub fn circuit_path() -> Vec<Vec3> {
    let curves = [
        [
            Vec3::new(-100.0, 0.0, -100.0),
            Vec3::new(-50.0, 0.0, 150.0),
            Vec3::new(50.0, 0.0, -150.0),
            Vec3::new(100.0, 0.0, 100.0),
        ],
        [
            Vec3::new(100.0, 0.0, 100.0),
            Vec3::new(200.0, 0.0, 200.0),
            Vec3::new(300.0, 0.0, -200.0),
            Vec3::new(-100.0, 0.0, -100.0),
        ],
    ];
    let path: Vec<Vec3> = curves
        .iter()
        .flat_map(|c| sample_bezier(c, BEZIER_SEGMENTS, MIN_SPACING))
        .collect();
    if path.is_empty() {
        vec![Vec3::zeros()]
    } else {
        path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    NotStarted,
    Started,
    Finished,
}

#[derive(Debug, Clone)]
pub enum RaceEvent {
    CheckpointSpawned(Zone),
    CheckpointRemoved(EntityId),
    Started { racer: SessionId, at: f64 },
    Finished { racer: SessionId, total_time: f64 },
}

#[derive(Debug, Clone)]
struct Waypoint {
    zone_id: EntityId,
    position: Vec3,
    track_index: usize,
    sequence: usize,
}

#[derive(Debug, Clone)]
pub struct Race {
    path: Vec<Vec3>,
    active: VecDeque<Waypoint>,
    next_track_index: usize,
    spawned: usize,
    reached: usize,
    total: usize,
    lap: usize,
    phase: RacePhase,
    started_at: Option<f64>,
    finished_at: Option<f64>,
    racers: Vec<SessionId>,
}

impl Default for Race {
    fn default() -> Self {
        Self::new()
    }
}

impl Race {
    pub fn new() -> Self {
        Self::with_path(circuit_path(), MAX_LAPS)
    }

    pub fn with_path(path: Vec<Vec3>, max_laps: usize) -> Self {
        let path = if path.is_empty() { vec![Vec3::zeros()] } else { path };
        let max_laps = max_laps.max(1);
        Self {
            total: path.len() * max_laps,
            path,
            active: VecDeque::new(),
            next_track_index: 0,
            spawned: 0,
            reached: 0,
            lap: 0,
            phase: RacePhase::NotStarted,
            started_at: None,
            finished_at: None,
            racers: Vec::new(),
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned
    }

    pub fn reached_count(&self) -> usize {
        self.reached
    }

    pub fn total_waypoints(&self) -> usize {
        self.total
    }

    pub fn lap(&self) -> usize {
        self.lap
    }

    pub fn active_checkpoints(&self) -> usize {
        self.active.len()
    }

    pub fn start_position(&self) -> Vec3 {
        self.path.first().copied().unwrap_or_else(Vec3::zeros)
    }

    /// Where a joining racer's car is teleported
    pub fn grid_position(&self) -> Vec3 {
        let [x, y, z] = START_OFFSET;
        self.start_position() + Vec3::new(x, y, z)
    }

    pub fn add_racer(&mut self, racer: SessionId) {
        if !self.racers.contains(&racer) {
            self.racers.push(racer);
        }
    }

    pub fn remove_racer(&mut self, racer: SessionId) {
        self.racers.retain(|r| *r != racer);
    }

    pub fn racers(&self) -> &[SessionId] {
        &self.racers
    }

    /// The racer whose car drives the checkpoints
    pub fn leader(&self) -> Option<SessionId> {
        self.racers.first().copied()
    }

    /// Reset progress and preload the lookahead window
    pub fn start(&mut self) -> Vec<RaceEvent> {
        let mut events = self.clear();
        self.next_track_index = 0;
        self.spawned = 0;
        self.reached = 0;
        self.lap = 0;
        self.phase = RacePhase::NotStarted;
        self.started_at = None;
        self.finished_at = None;
        for _ in 0..VISIBLE_WAYPOINTS.min(self.total) {
            self.spawn_next(&mut events);
        }
        events
    }

    /// Remove every live checkpoint
    pub fn clear(&mut self) -> Vec<RaceEvent> {
        self.active
            .drain(..)
            .map(|w| RaceEvent::CheckpointRemoved(w.zone_id))
            .collect()
    }

    /// Advance with the leader's car position
    pub fn update(&mut self, now: f64, car_position: Option<Vec3>) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        if self.phase == RacePhase::Finished {
            return events;
        }
        let (Some(racer), Some(position), Some(target)) = (self.leader(), car_position, self.active.front()) else {
            return events;
        };
        if (position - target.position).norm() > REACH_RADIUS {
            return events;
        }

        if self.phase == RacePhase::NotStarted {
            self.phase = RacePhase::Started;
            self.started_at = Some(now);
            events.push(RaceEvent::Started { racer, at: now });
        }
        self.reach(now, racer, &mut events);
        events
    }

    fn spawn_next(&mut self, events: &mut Vec<RaceEvent>) {
        if self.phase == RacePhase::Finished || self.spawned >= self.total {
            return;
        }
        let position = self.path[self.next_track_index];
        let zone = Zone::new(
            position,
            Vec3::new(CHECKPOINT_SIZE, CHECKPOINT_SIZE, CHECKPOINT_SIZE),
            CHECKPOINT_COLOR,
            ZoneAction::Passive,
        );
        self.active.push_back(Waypoint {
            zone_id: zone.id,
            position,
            track_index: self.next_track_index,
            sequence: self.spawned,
        });
        events.push(RaceEvent::CheckpointSpawned(zone));

        self.spawned += 1;
        self.next_track_index = (self.next_track_index + 1) % self.path.len();
    }

    fn reach(&mut self, now: f64, racer: SessionId, events: &mut Vec<RaceEvent>) {
        let Some(reached) = self.active.pop_front() else {
            return;
        };
        events.push(RaceEvent::CheckpointRemoved(reached.zone_id));
        self.reached += 1;

        if reached.track_index == self.path.len() - 1 {
            self.lap += 1;
        }

        if reached.sequence + 1 == self.total {
            self.finish(now, racer, events);
            return;
        }

        while self.active.len() < VISIBLE_WAYPOINTS && self.spawned < self.total {
            self.spawn_next(events);
        }
    }

    fn finish(&mut self, now: f64, racer: SessionId, events: &mut Vec<RaceEvent>) {
        if self.phase == RacePhase::Finished {
            return;
        }
        self.phase = RacePhase::Finished;
        self.finished_at = Some(now);
        events.extend(self.clear());
        let started = *self.started_at.get_or_insert(now);
        events.push(RaceEvent::Finished {
            racer,
            total_time: now - started,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn straight_path(n: usize) -> Vec<Vec3> {
        (0..n).map(|i| Vec3::new(0.0, 0.0, i as f32 * 50.0)).collect()
    }

    fn next_target(events: &[RaceEvent], live: &mut VecDeque<(EntityId, Vec3)>) {
        for event in events {
            match event {
                RaceEvent::CheckpointSpawned(zone) => live.push_back((zone.id, zone.position)),
                RaceEvent::CheckpointRemoved(id) => live.retain(|(z, _)| z != id),
                _ => {}
            }
        }
    }

    #[test]
    fn circuit_is_flat_and_spaced() {
        let path = circuit_path();
        assert!(path.len() > 2);
        assert!(path.iter().all(|p| p.y == 0.0));
        assert_eq!(path[0], Vec3::new(-100.0, 0.0, -100.0));
    }

    #[test]
    fn sampling_keeps_arc_spacing() {
        let line = [
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(100.0, 3.0, 0.0),
            Vec3::new(200.0, 3.0, 0.0),
            Vec3::new(300.0, 3.0, 0.0),
        ];
        let points = sample_bezier(&line, 300, 99.0);
        assert_eq!(points.len(), 4);
        for pair in points.windows(2) {
            assert!((pair[1] - pair[0]).norm() >= 98.5);
        }
        assert!(points.iter().all(|p| p.y == 0.0));
    }

    #[test]
    fn start_preloads_window() {
        let mut race = Race::with_path(straight_path(5), 1);
        let events = race.start();
        let spawned = events
            .iter()
            .filter(|e| matches!(e, RaceEvent::CheckpointSpawned(_)))
            .count();
        assert_eq!(spawned, VISIBLE_WAYPOINTS);
        assert_eq!(race.active_checkpoints(), VISIBLE_WAYPOINTS);

        let mut tiny = Race::with_path(straight_path(2), 1);
        tiny.start();
        assert_eq!(tiny.active_checkpoints(), 2);
    }

    #[test]
    fn driving_the_course_finishes_exactly_once() {
        let racer = Uuid::new_v4();
        let mut race = Race::with_path(straight_path(5), 2);
        race.add_racer(racer);
        let mut live = VecDeque::new();
        next_target(&race.start(), &mut live);

        let mut finishes = 0;
        let mut starts = 0;
        let mut spawned_total = VISIBLE_WAYPOINTS;
        let mut now = 0.0;
        for _ in 0..100 {
            now += 1.0;
            let target = live.front().map(|(_, p)| *p);
            let events = race.update(now, target);
            assert!(race.spawned_count() <= race.total_waypoints());
            for event in &events {
                match event {
                    RaceEvent::Finished { racer: r, total_time } => {
                        assert_eq!(*r, racer);
                        assert!(*total_time > 0.0);
                        finishes += 1;
                    }
                    RaceEvent::Started { .. } => starts += 1,
                    RaceEvent::CheckpointSpawned(_) => spawned_total += 1,
                    _ => {}
                }
            }
            next_target(&events, &mut live);
        }

        assert_eq!(finishes, 1);
        assert_eq!(starts, 1);
        assert_eq!(race.phase(), RacePhase::Finished);
        assert_eq!(race.lap(), 2);
        assert_eq!(race.reached_count(), 10);
        assert_eq!(spawned_total, race.total_waypoints());
        assert!(live.is_empty());
        assert!(race.update(now + 1.0, Some(Vec3::zeros())).is_empty());
    }

    #[test]
    fn far_from_checkpoint_does_nothing() {
        let mut race = Race::with_path(straight_path(5), 1);
        race.add_racer(Uuid::new_v4());
        race.start();
        assert!(race.update(1.0, Some(Vec3::new(0.0, 0.0, 20.0))).is_empty());
        assert!(race.update(1.0, None).is_empty());
        assert_eq!(race.phase(), RacePhase::NotStarted);
    }

    #[test]
    fn single_checkpoint_race_starts_and_finishes_together() {
        let racer = Uuid::new_v4();
        let mut race = Race::with_path(vec![Vec3::new(1.0, 0.0, 1.0)], 1);
        race.add_racer(racer);
        race.start();
        let events = race.update(3.0, Some(Vec3::new(1.0, 0.0, 1.0)));
        assert!(events
            .iter()
            .any(|e| matches!(e, RaceEvent::Finished { total_time, .. } if *total_time == 0.0)));
        assert_eq!(race.spawned_count(), 1);
    }

    #[test]
    fn grid_position_is_behind_start() {
        let race = Race::new();
        assert_eq!(race.grid_position(), race.start_position() + Vec3::new(0.0, 5.0, -20.0));
    }
}

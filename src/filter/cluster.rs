//! Stabilization of point-of-gaze estimates by clustering.
//!
//! Raw estimates jitter from frame to frame, and single frames regularly produce estimates far
//! away from where the user is actually looking (blinks, reflections, lid occlusion). Fixations
//! show up as tight groups of consecutive estimates, so the filter keeps a few recent clusters
//! and only reports positions that are backed by one of them.

use std::{collections::VecDeque, time::Duration};

use serde::Deserialize;

use super::Filter;
use crate::screen::Screen;

/// An Eye Point Of Gaze estimate in screen-local pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epog {
    pub x: f32,
    pub y: f32,
    /// Timestamp of the frame the estimate was computed from.
    pub timestamp: Duration,
}

impl Epog {
    pub fn new(x: f32, y: f32, timestamp: Duration) -> Self {
        Self { x, y, timestamp }
    }

    fn distance_to(&self, (x, y): (f32, f32)) -> f32 {
        (self.x - x).hypot(self.y - y)
    }
}

/// Stabilization parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StabilizationConfig {
    /// Whether to stabilize at all. When disabled, every raw estimate is passed through.
    pub enabled: bool,
    /// Maximum distance from a cluster centroid for an estimate to join the cluster, as a
    /// fraction of the screen width.
    pub merge_distance: f32,
    /// Number of members a cluster needs before its centroid is reported.
    pub min_members: usize,
    /// Number of most recent members the centroid is averaged over.
    pub max_members: usize,
    /// Maximum number of clusters kept at once.
    pub max_clusters: usize,
    /// Clusters that received no estimate for this long are discarded.
    pub idle_ms: u64,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            merge_distance: 0.1,
            min_members: 2,
            max_members: 20,
            max_clusters: 4,
            idle_ms: 750,
        }
    }
}

/// A group of recent estimates judged to belong to the same fixation.
#[derive(Debug, Clone)]
pub struct Cluster {
    members: VecDeque<(f32, f32)>,
    centroid: (f32, f32),
    count: usize,
    last_update: Duration,
}

impl Cluster {
    fn new(epog: Epog, capacity: usize) -> Self {
        let mut members = VecDeque::with_capacity(capacity);
        members.push_back((epog.x, epog.y));
        Self {
            members,
            centroid: (epog.x, epog.y),
            count: 1,
            last_update: epog.timestamp,
        }
    }

    fn add(&mut self, epog: Epog, capacity: usize) {
        self.members.push_back((epog.x, epog.y));
        if self.members.len() > capacity {
            self.members.pop_front();
        }
        self.count += 1;
        self.last_update = epog.timestamp;

        let n = self.members.len() as f32;
        let (sx, sy) = self
            .members
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        self.centroid = (sx / n, sy / n);
    }

    /// Mean position of the most recent members.
    #[inline]
    pub fn centroid(&self) -> (f32, f32) {
        self.centroid
    }

    /// Total number of estimates assigned to this cluster.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn last_update(&self) -> Duration {
        self.last_update
    }
}

/// Suppresses spurious single-frame estimates.
///
/// When enabled, each estimate joins the nearest cluster whose centroid is within the merge
/// distance, or starts a new one. The filter outputs the centroid of the cluster the estimate
/// joined once that cluster has enough members, and `None` otherwise.
///
/// When disabled, every estimate is returned unchanged.
pub struct StabilizationFilter {
    enabled: bool,
    merge_distance: f32,
    min_members: usize,
    max_members: usize,
    max_clusters: usize,
    idle: Duration,
    clusters: Vec<Cluster>,
}

impl StabilizationFilter {
    /// Creates a filter for estimates on `screen`.
    pub fn new(config: &StabilizationConfig, screen: &Screen) -> Self {
        Self::with_merge_distance(config, config.merge_distance * screen.width() as f32)
    }

    /// Creates a filter with an absolute merge distance in pixels.
    pub fn with_merge_distance(config: &StabilizationConfig, merge_distance: f32) -> Self {
        Self {
            enabled: config.enabled,
            merge_distance,
            min_members: config.min_members.max(1),
            max_members: config.max_members.max(1),
            max_clusters: config.max_clusters.max(1),
            idle: Duration::from_millis(config.idle_ms),
            clusters: Vec::new(),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the currently tracked clusters.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn prune(&mut self, now: Duration) {
        let idle = self.idle;
        let before = self.clusters.len();
        self.clusters
            .retain(|c| now.saturating_sub(c.last_update) <= idle);
        if self.clusters.len() != before {
            log::trace!("dropped {} idle clusters", before - self.clusters.len());
        }
    }

    fn nearest(&self, epog: &Epog) -> Option<(usize, f32)> {
        self.clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, epog.distance_to(c.centroid)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Filter<Epog> for StabilizationFilter {
    type Output = Option<Epog>;

    fn push(&mut self, epog: Epog) -> Option<Epog> {
        if !self.enabled {
            return Some(epog);
        }

        self.prune(epog.timestamp);

        match self.nearest(&epog) {
            Some((i, dist)) if dist <= self.merge_distance => {
                let cluster = &mut self.clusters[i];
                cluster.add(epog, self.max_members);
                if cluster.count >= self.min_members {
                    let (x, y) = cluster.centroid;
                    Some(Epog::new(x, y, epog.timestamp))
                } else {
                    None
                }
            }
            _ => {
                if self.clusters.len() >= self.max_clusters {
                    if let Some(stalest) = self
                        .clusters
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, c)| c.last_update)
                        .map(|(i, _)| i)
                    {
                        self.clusters.swap_remove(stalest);
                    }
                }
                log::trace!("new cluster at ({}, {})", epog.x, epog.y);
                self.clusters.push(Cluster::new(epog, self.max_members));
                if self.min_members <= 1 {
                    Some(epog)
                } else {
                    None
                }
            }
        }
    }

    fn reset(&mut self) {
        self.clusters.clear();
    }
}

//! Alert Manager Implementation

use road_scene::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two firings of the same alert kind (seconds)
    pub cooldown_seconds: f64,
    /// Fire alerts at all
    pub enabled: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 3.0,
            enabled: true,
        }
    }
}

/// Alert kind, the unit of deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    FollowingTooClose,
    RedLightAhead,
    StopSignAhead,
}

/// Alert derived from one frame's analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoadAlert {
    /// Debounced following-distance alarm
    FollowingTooClose { distance_m: f64 },
    RedLightAhead,
    StopSignAhead,
}

impl RoadAlert {
    pub fn kind(&self) -> AlertKind {
        match self {
            RoadAlert::FollowingTooClose { .. } => AlertKind::FollowingTooClose,
            RoadAlert::RedLightAhead => AlertKind::RedLightAhead,
            RoadAlert::StopSignAhead => AlertKind::StopSignAhead,
        }
    }
}

impl fmt::Display for RoadAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoadAlert::FollowingTooClose { distance_m } => {
                write!(f, "Following too close: {:.1} m", distance_m)
            }
            RoadAlert::RedLightAhead => f.write_str("Red light ahead"),
            RoadAlert::StopSignAhead => f.write_str("Stop sign ahead"),
        }
    }
}

/// State of an alert kind
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired
    pub fire_count: usize,
}

/// Alert manager for deduplication
pub struct AlertManager {
    /// Configuration
    config: AlertConfig,
    /// Alert states by kind
    states: HashMap<AlertKind, AlertState>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Alerts raised by a result, in following / red light / stop sign order
    pub fn alerts_from(result: &AnalysisResult) -> Vec<RoadAlert> {
        let mut alerts = Vec::new();
        if result.alarm_active {
            if let Some(distance_m) = result.nearest_m {
                alerts.push(RoadAlert::FollowingTooClose { distance_m });
            }
        }
        if result.red_light_alert {
            alerts.push(RoadAlert::RedLightAhead);
        }
        if result.stop_sign_alert {
            alerts.push(RoadAlert::StopSignAhead);
        }
        alerts
    }

    /// Check if an alert of `kind` may fire at `now`
    pub fn should_fire_at(&self, kind: AlertKind, now: Instant) -> bool {
        if !self.config.enabled {
            return false;
        }

        if let Some(state) = self.states.get(&kind) {
            let elapsed = now.saturating_duration_since(state.last_fired);
            if elapsed.as_secs_f64() < self.config.cooldown_seconds {
                debug!("Alert suppressed: {:?} in cooldown period", kind);
                return false;
            }
        }

        true
    }

    /// Check if an alert of `kind` may fire now
    pub fn should_fire(&self, kind: AlertKind) -> bool {
        self.should_fire_at(kind, Instant::now())
    }

    /// Record that an alert was fired at `now`
    pub fn record_fire_at(&mut self, kind: AlertKind, now: Instant) {
        let state = self.states.entry(kind).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
        });

        state.last_fired = now;
        state.fire_count += 1;

        debug!("Alert recorded: {:?} (count: {})", kind, state.fire_count);
    }

    /// Record that an alert was fired now
    pub fn record_fire(&mut self, kind: AlertKind) {
        self.record_fire_at(kind, Instant::now());
    }

    /// Fire every alert of `result` that is out of cooldown at `now`
    pub fn process_at(&mut self, result: &AnalysisResult, now: Instant) -> Vec<RoadAlert> {
        let mut fired = Vec::new();
        for alert in Self::alerts_from(result) {
            if self.should_fire_at(alert.kind(), now) {
                self.record_fire_at(alert.kind(), now);
                warn!("{}", alert);
                fired.push(alert);
            }
        }
        fired
    }

    /// Fire every alert of `result` that is out of cooldown
    pub fn process(&mut self, result: &AnalysisResult) -> Vec<RoadAlert> {
        self.process_at(result, Instant::now())
    }

    /// Number of times `kind` fired since creation or the last clear
    pub fn fire_count(&self, kind: AlertKind) -> usize {
        self.states.get(&kind).map_or(0, |s| s.fire_count)
    }

    /// Enable or disable firing
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        info!("Alerts {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Clear all alert states
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

//! Temporal smoothing of the following distance and alarm debounce

/// EMA weight of the newest distance sample
pub const DISTANCE_ALPHA: f64 = 0.4;

/// Exponential moving average of the nearest distance.
///
/// The value is sticky: frames without a vehicle leave it unchanged.
#[derive(Debug, Clone)]
pub struct DistanceSmoother {
    alpha: f64,
    value: Option<f64>,
}

impl DistanceSmoother {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Feed the raw nearest distance of a frame (`None` when no vehicle was kept)
    pub fn update(&mut self, raw: Option<f64>) -> Option<f64> {
        if let Some(raw) = raw {
            self.value = Some(match self.value {
                None => raw,
                Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
            });
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Default for DistanceSmoother {
    fn default() -> Self {
        Self::new(DISTANCE_ALPHA)
    }
}

/// Counts consecutive frames below the alarm distance
#[derive(Debug, Clone)]
pub struct AlarmDebouncer {
    threshold_m: f64,
    hold_frames: u32,
    count: u32,
}

impl AlarmDebouncer {
    pub fn new(threshold_m: f64, hold_frames: u32) -> Self {
        Self {
            threshold_m,
            hold_frames,
            count: 0,
        }
    }

    /// Feed the smoothed distance; returns whether the alarm is active
    pub fn update(&mut self, smoothed: Option<f64>) -> bool {
        match smoothed {
            Some(d) if d < self.threshold_m => self.count = self.count.saturating_add(1),
            _ => self.count = 0,
        }
        self.is_active()
    }

    pub fn is_active(&self) -> bool {
        self.count >= self.hold_frames
    }

    /// Consecutive frames below the threshold so far
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Apply new thresholds without touching the running count
    pub fn reconfigure(&mut self, threshold_m: f64, hold_frames: u32) {
        self.threshold_m = threshold_m;
        self.hold_frames = hold_frames;
    }
}

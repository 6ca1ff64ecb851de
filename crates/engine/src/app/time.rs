use thiserror::Error;
use tracing::{debug, info};

pub const NORMAL_TIME_SCALE: f32 = 1.0;

/// Proof of ownership over the shared simulation time scale.
///
/// Leases are stamped with the epoch they were granted in. Once another
/// holder preempts the scale, every older lease is stale and rejected.
#[derive(Debug)]
pub struct TimeScaleLease {
    holder: &'static str,
    epoch: u64,
}

impl TimeScaleLease {
    pub fn holder(&self) -> &'static str {
        self.holder
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimeScaleError {
    #[error("time scale is currently owned by {holder}")]
    Held { holder: &'static str },
    #[error("time scale lease held by {holder} was revoked")]
    Revoked { holder: &'static str },
    #[error("invalid time scale {0}: must be finite and non-negative")]
    InvalidScale(f32),
}

#[derive(Debug)]
pub struct TimeScale {
    scale: f32,
    owner: Option<(&'static str, u64)>,
    next_epoch: u64,
}

impl Default for TimeScale {
    fn default() -> Self {
        Self {
            scale: NORMAL_TIME_SCALE,
            owner: None,
            next_epoch: 0,
        }
    }
}

impl TimeScale {
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn holder(&self) -> Option<&'static str> {
        self.owner.map(|(holder, _)| holder)
    }

    pub fn is_held(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_current(&self, lease: &TimeScaleLease) -> bool {
        self.owner
            .is_some_and(|(_, epoch)| epoch == lease.epoch)
    }

    pub fn try_acquire(&mut self, holder: &'static str) -> Result<TimeScaleLease, TimeScaleError> {
        if let Some((current, _)) = self.owner {
            return Err(TimeScaleError::Held { holder: current });
        }
        Ok(self.grant(holder))
    }

    /// Takes the scale away from whoever holds it. The previous lease goes stale.
    pub fn preempt(&mut self, holder: &'static str) -> TimeScaleLease {
        if let Some((previous, _)) = self.owner {
            info!(previous, holder, "time_scale_preempted");
        }
        self.grant(holder)
    }

    pub fn set(&mut self, lease: &TimeScaleLease, scale: f32) -> Result<(), TimeScaleError> {
        if !self.is_current(lease) {
            return Err(TimeScaleError::Revoked {
                holder: lease.holder,
            });
        }
        if !scale.is_finite() || scale < 0.0 {
            return Err(TimeScaleError::InvalidScale(scale));
        }
        self.scale = scale;
        Ok(())
    }

    /// Returns the scale to normal if `lease` is still the current one.
    pub fn release(&mut self, lease: TimeScaleLease) -> Result<(), TimeScaleError> {
        if !self.is_current(&lease) {
            return Err(TimeScaleError::Revoked {
                holder: lease.holder,
            });
        }
        self.owner = None;
        self.scale = NORMAL_TIME_SCALE;
        debug!(holder = lease.holder, "time_scale_released");
        Ok(())
    }

    fn grant(&mut self, holder: &'static str) -> TimeScaleLease {
        let epoch = self.next_epoch;
        self.next_epoch = self.next_epoch.saturating_add(1);
        self.owner = Some((holder, epoch));
        TimeScaleLease { holder, epoch }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickTime {
    pub tick: u64,
    /// Fixed step multiplied by the current time scale.
    pub dt_seconds: f32,
    pub unscaled_dt_seconds: f32,
    /// Scaled simulation time at the end of this tick.
    pub time_seconds: f64,
}

#[derive(Debug, Default)]
pub struct SimClock {
    tick: u64,
    scaled_seconds: f64,
    unscaled_seconds: f64,
    time_scale: TimeScale,
}

impl SimClock {
    pub fn advance(&mut self, fixed_dt_seconds: f32) -> TickTime {
        let dt_seconds = fixed_dt_seconds * self.time_scale.scale();
        self.tick = self.tick.saturating_add(1);
        self.scaled_seconds += dt_seconds as f64;
        self.unscaled_seconds += fixed_dt_seconds as f64;
        TickTime {
            tick: self.tick,
            dt_seconds,
            unscaled_dt_seconds: fixed_dt_seconds,
            time_seconds: self.scaled_seconds,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time_seconds(&self) -> f64 {
        self.scaled_seconds
    }

    pub fn unscaled_time_seconds(&self) -> f64 {
        self.unscaled_seconds
    }

    pub fn time_scale(&self) -> &TimeScale {
        &self.time_scale
    }

    pub fn time_scale_mut(&mut self) -> &mut TimeScale {
        &mut self.time_scale
    }
}

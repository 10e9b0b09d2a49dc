//! Status LED and display timers, and the recognition cooldown.
//!
//! State machines only: callers pass in `Instant`s and act on the returned
//! events, so the timing rules can be tested without sleeping.

use facegate_core::Decision;
use serde::Serialize;
use std::time::{Duration, Instant};

/// How long the enrollment LED stays lit after a user completes.
pub const ENROLLED_BLINK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedStatus {
    Off,
    /// Green.
    Success,
    /// Red.
    Fail,
    /// Red and green together.
    Uncertain,
    /// Blue.
    Enrolled,
}

impl LedStatus {
    pub fn for_decision(decision: Decision) -> Self {
        match decision {
            Decision::Authorized => LedStatus::Success,
            Decision::Unstable | Decision::LowConfidence => LedStatus::Uncertain,
            Decision::Denied => LedStatus::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorEvent {
    Led(LedStatus),
    DisplayOff,
    DisplayOn,
}

#[derive(Debug)]
pub struct Indicator {
    led: LedStatus,
    led_since: Instant,
    led_timeout: Duration,
    display_active: bool,
    last_face: Instant,
    display_timeout: Duration,
}

impl Indicator {
    pub fn new(led_timeout: Duration, display_timeout: Duration, now: Instant) -> Self {
        Self {
            led: LedStatus::Off,
            led_since: now,
            led_timeout,
            display_active: true,
            last_face: now,
            display_timeout,
        }
    }

    pub fn led(&self) -> LedStatus {
        self.led
    }

    pub fn display_active(&self) -> bool {
        self.display_active
    }

    fn set_led(&mut self, status: LedStatus, now: Instant) -> IndicatorEvent {
        self.led = status;
        self.led_since = now;
        tracing::debug!(led = ?status, "led");
        IndicatorEvent::Led(status)
    }

    /// A face was seen. Wakes the display if it had blanked.
    pub fn on_face(&mut self, now: Instant) -> Option<IndicatorEvent> {
        self.last_face = now;
        if self.display_active {
            return None;
        }
        self.display_active = true;
        tracing::info!("face seen; display on");
        Some(IndicatorEvent::DisplayOn)
    }

    pub fn on_verdict(&mut self, decision: Decision, now: Instant) -> IndicatorEvent {
        self.set_led(LedStatus::for_decision(decision), now)
    }

    /// Light the enrollment LED; it clears after [`ENROLLED_BLINK`].
    pub fn on_enrolled(&mut self, now: Instant) -> IndicatorEvent {
        self.set_led(LedStatus::Enrolled, now)
    }

    /// Advance the timers to `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<IndicatorEvent> {
        let mut events = Vec::new();

        let timeout = match self.led {
            LedStatus::Off => None,
            LedStatus::Enrolled => Some(ENROLLED_BLINK),
            _ => Some(self.led_timeout),
        };
        if let Some(timeout) = timeout {
            if now.saturating_duration_since(self.led_since) > timeout {
                tracing::info!(led = ?self.led, "led timed out");
                events.push(self.set_led(LedStatus::Off, now));
            }
        }

        if self.display_active && now.saturating_duration_since(self.last_face) > self.display_timeout {
            self.display_active = false;
            tracing::info!("no face seen; display off");
            events.push(IndicatorEvent::DisplayOff);
        }

        events
    }
}

/// Minimum gap between completed recognition attempts.
#[derive(Debug)]
pub struct Cooldown {
    period: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.period,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

//! Arrival estimates: live-speed when the bus reports one, static segment
//! timings otherwise.

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::geo::haversine_km;
use crate::route::{Progress, Span};

pub const WAITING_FOR_GPS: &str = "Waiting for GPS data";
pub const INVALID_STOP: &str = "Invalid stop selection";
pub const ALREADY_PASSED: &str = "The bus has already passed this stop.";
pub const ARRIVING_NOW: &str = "Arriving now!";
pub const AT_YOUR_STOP: &str = "The bus is at your stop";

const CLOCK_FORMAT: &str = "%I:%M %p";

/// Longest live-speed projection that is shown. A speed so low that the
/// projection runs past a day is treated like a stationary bus.
pub const MAX_DYNAMIC_MINUTES: f64 = 24.0 * 60.0;

/// Wall-clock source for projected arrival times.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub fn format_clock(at: NaiveDateTime) -> String {
    at.format(CLOCK_FORMAT).to_string()
}

/// `now` plus a fractional number of minutes, at millisecond precision.
/// Saturates at the end of the representable range.
pub fn add_minutes(now: NaiveDateTime, minutes: f64) -> NaiveDateTime {
    let millis = (minutes * 60_000.0) as i64;
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Dynamic { speed_kmh: f64, distance_km: f64 },
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub minutes: f64,
    pub strategy: Strategy,
}

/// Travel time over `span`.
///
/// With a positive `speed_kmh` the stop-to-stop great-circle distance is used,
/// starting from the bus's snapped stop. Otherwise, or when that projection
/// exceeds [`MAX_DYNAMIC_MINUTES`], each traversed stop's `time_to_next` is
/// summed.
pub fn estimate(span: &Span, speed_kmh: Option<f64>) -> Estimate {
    let stops = span.stops();

    if let Some(speed_kmh) = speed_kmh.filter(|s| *s > 0.0) {
        let distance_km: f64 = stops
            .windows(2)
            .map(|pair| haversine_km(pair[0].coord(), pair[1].coord()))
            .sum();
        let minutes = distance_km / speed_kmh * 60.0;
        if minutes <= MAX_DYNAMIC_MINUTES {
            return Estimate {
                minutes,
                strategy: Strategy::Dynamic {
                    speed_kmh,
                    distance_km,
                },
            };
        }
    }

    let minutes: u64 = stops[..stops.len() - 1]
        .iter()
        .map(|s| u64::from(s.time_to_next))
        .sum();
    Estimate {
        minutes: minutes as f64,
        strategy: Strategy::Static,
    }
}

/// The two strings shown to a rider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arrival {
    pub estimated_time: String,
    pub remaining_time: String,
}

impl Arrival {
    pub fn status(message: &str) -> Self {
        Self {
            estimated_time: message.to_string(),
            remaining_time: String::new(),
        }
    }

    pub fn projected(now: NaiveDateTime, minutes: f64) -> Self {
        Self {
            estimated_time: format_clock(add_minutes(now, minutes)),
            remaining_time: format!("Expected in {} minutes", minutes as i64),
        }
    }
}

/// Turns a resolved [`Progress`] into rider-facing text.
pub fn arrival(progress: &Progress, speed_kmh: Option<f64>, clock: &dyn Clock) -> Arrival {
    match progress {
        Progress::InvalidStop => Arrival::status(INVALID_STOP),
        Progress::AwaitingPosition => Arrival::status(WAITING_FOR_GPS),
        Progress::AlreadyPassed => Arrival::status(ALREADY_PASSED),
        Progress::Arrived => Arrival {
            estimated_time: ARRIVING_NOW.to_string(),
            remaining_time: AT_YOUR_STOP.to_string(),
        },
        Progress::EnRoute(span) => {
            let estimate = estimate(span, speed_kmh);
            Arrival::projected(clock.now(), estimate.minutes)
        }
    }
}

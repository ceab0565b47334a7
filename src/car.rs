//! Vehicle kinematics.

use crate::policy::N_SENSORS;

pub const START_X: f64 = 450.0;
pub const START_Y: f64 = 150.0;
pub const MAX_SPEED: f64 = 6.0;

const STEERING_RATE: f64 = 0.1;
const ACCELERATION: f64 = 0.25;

/// Radar fan offsets relative to the heading, in radians.
pub const SENSOR_ANGLES: [f64; N_SENSORS] = [-1.2, -0.6, 0.0, 0.6, 1.2];

/// One radar reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radar {
    pub distance: f64,
    /// Offset from the heading.
    pub angle: f64,
}

/// Kinematic state of one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
    /// Cumulative distance driven.
    pub distance: f64,
}

impl Default for Car {
    fn default() -> Self {
        Self {
            x: START_X,
            y: START_Y,
            heading: 0.0,
            speed: 0.0,
            distance: 0.0,
        }
    }
}

impl Car {
    /// Apply one tick of steering and throttle.
    pub fn advance(&mut self, steering: f64, throttle: f64) {
        self.heading += steering * STEERING_RATE;
        self.speed = (self.speed + throttle * ACCELERATION).clamp(0.0, MAX_SPEED);

        self.x += self.speed * self.heading.cos();
        self.y += self.speed * self.heading.sin();
        self.distance += self.speed.abs();
    }
}

//! Planar heading math used by steering analysis.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use contracts::Vec3;

/// Four-quadrant heading of the horizontal vector `(x, y)` in radians,
/// measured counter-clockwise from +x. Zero only for the zero vector.
pub fn heading(x: f64, y: f64) -> f64 {
    if x > 0.0 {
        (y / x).atan()
    } else if x < 0.0 {
        if y >= 0.0 {
            (y / x).atan() + PI
        } else {
            (y / x).atan() - PI
        }
    } else if y > 0.0 {
        FRAC_PI_2
    } else if y < 0.0 {
        -FRAC_PI_2
    } else {
        0.0
    }
}

pub fn velocity_heading(velocity: &Vec3) -> f64 {
    heading(velocity.x, velocity.y)
}

/// Wraps a signed angle difference into `(-π, π]`.
pub fn normalize_delta(delta: f64) -> f64 {
    let mut wrapped = delta % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// `None` for a zero delta.
    pub fn of(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(Self::Left)
        } else if delta < 0.0 {
            Some(Self::Right)
        } else {
            None
        }
    }
}

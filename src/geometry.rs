//! Pose and orientation utilities.
//!
//! Pure functions over [`nalgebra`] types: Euler/quaternion conversion, angle
//! wrapping, and the fixed compass offsets used by directional placement.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Roll/pitch/yaw angles in radians (extrinsic x-y-z).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Euler {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Euler {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Only a rotation about the vertical axis.
    pub fn yaw_only(yaw: f64) -> Self {
        Self::new(0.0, 0.0, yaw)
    }

    pub fn to_quaternion(self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw)
    }

    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        let (roll, pitch, yaw) = q.euler_angles();
        Self { roll, pitch, yaw }
    }
}

/// Position plus orientation of a rigid body or the end effector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_euler(position: Vector3<f64>, euler: Euler) -> Self {
        Self::new(position, euler.to_quaternion())
    }

    /// Pose at `position` with identity orientation.
    pub fn at(position: Vector3<f64>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    pub fn euler(&self) -> Euler {
        Euler::from_quaternion(&self.orientation)
    }

    pub fn yaw(&self) -> f64 {
        self.euler().yaw
    }

    /// Same orientation, position shifted by `offset`.
    pub fn translated(&self, offset: Vector3<f64>) -> Self {
        Self::new(self.position + offset, self.orientation)
    }
}

/// Wrap an angle into `[-π, π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Signed yaw difference `a - b`, wrapped into `[-π, π)`.
pub fn yaw_difference(a: f64, b: f64) -> f64 {
    wrap_angle(a - b)
}

/// Absolute x and y distances between two points.
pub fn horizontal_delta(a: &Vector3<f64>, b: &Vector3<f64>) -> (f64, f64) {
    ((a.x - b.x).abs(), (a.y - b.y).abs())
}

/// Euclidean distance in the horizontal plane.
pub fn planar_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// True when `a` and `b` agree on every axis within `tolerance`.
pub fn all_close(a: &Vector3<f64>, b: &Vector3<f64>, tolerance: f64) -> bool {
    (a - b).iter().all(|d| d.abs() <= tolerance)
}

/// Gripper orientation pointing straight down, rotated to `yaw` about the vertical.
pub fn downward_grip(yaw: f64) -> UnitQuaternion<f64> {
    Euler::new(PI, 0.0, yaw).to_quaternion()
}

/// The eight compass directions used by `place-<direction>` actions.
///
/// North is +y, east is +x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Unit steps along x and y.
    pub fn unit(self) -> (f64, f64) {
        match self {
            Direction::North => (0.0, 1.0),
            Direction::South => (0.0, -1.0),
            Direction::East => (1.0, 0.0),
            Direction::West => (-1.0, 0.0),
            Direction::NorthEast => (1.0, 1.0),
            Direction::NorthWest => (-1.0, 1.0),
            Direction::SouthEast => (1.0, -1.0),
            Direction::SouthWest => (-1.0, -1.0),
        }
    }

    /// Horizontal offset of `step` along each non-zero axis.
    ///
    /// Diagonals move `step` on both axes, not `step` along the diagonal.
    pub fn offset(self, step: f64) -> Vector3<f64> {
        let (ux, uy) = self.unit();
        Vector3::new(ux * step, uy * step, 0.0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::NorthEast => "northeast",
            Direction::NorthWest => "northwest",
            Direction::SouthEast => "southeast",
            Direction::SouthWest => "southwest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn wrap_angle_stays_in_range() {
        for k in -20..20 {
            let a = k as f64 * 0.7;
            let w = wrap_angle(a);
            assert!((-PI..PI).contains(&w), "{a} wrapped to {w}");
            let turns = (a - w) / (2.0 * PI);
            assert!((turns - turns.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn opposite_yaw_differs_by_pi() {
        let d = yaw_difference(0.3 + PI, 0.3);
        assert!((d.abs() - PI).abs() < EPS);
        let d = yaw_difference(-2.9, 0.24);
        assert!((d.abs() - PI).abs() < 0.01);
    }

    #[test]
    fn euler_round_trip_through_quaternion() {
        let e = Euler::new(0.1, -0.2, 1.3);
        let back = Euler::from_quaternion(&e.to_quaternion());
        assert!((back.roll - e.roll).abs() < EPS);
        assert!((back.pitch - e.pitch).abs() < EPS);
        assert!((back.yaw - e.yaw).abs() < EPS);
    }

    #[test]
    fn downward_grip_preserves_yaw() {
        for yaw in [-2.5, -0.4, 0.0, 0.9, 3.0] {
            let pose = Pose::new(Vector3::zeros(), downward_grip(yaw));
            assert!(yaw_difference(pose.yaw(), yaw).abs() < 1e-9);
        }
    }

    #[test]
    fn direction_offsets() {
        let o = Direction::NorthWest.offset(0.047);
        assert!((o.x + 0.047).abs() < EPS && (o.y - 0.047).abs() < EPS && o.z == 0.0);
        assert_eq!(Direction::parse("southeast"), Some(Direction::SouthEast));
        assert_eq!(Direction::parse("up"), None);
    }

    #[test]
    fn planar_helpers() {
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(0.3, 0.4, -5.0);
        assert!((planar_distance(&a, &b) - 0.5).abs() < EPS);
        assert!(all_close(&a, &Vector3::new(0.0005, 0.0, 1.0), 0.001));
        assert!(!all_close(&a, &b, 0.001));
    }
}

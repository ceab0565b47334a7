//! Track geometry consumed by the episode runner.

/// Geometry and sensing queries of a closed track.
pub trait Track {
    /// Whether a point lies on the drivable surface.
    ///
    /// Points that cannot be classified must report `false`.
    fn is_on_track(&self, x: f64, y: f64) -> bool;

    /// Distance to the first off-track point along a ray, or the maximum range.
    fn cast_radar(&self, x: f64, y: f64, angle: f64) -> f64;

    /// Whether moving from `prev_x` to `(x, y)` crossed the finish line.
    fn has_crossed_finish(&self, prev_x: f64, x: f64, y: f64) -> bool;

    /// Distance from the ideal driving line.
    fn offset_from_centerline(&self, x: f64, y: f64) -> f64;
}

pub const RADAR_MAX_RANGE: f64 = 200.0;
pub const RADAR_STEP: f64 = 5.0;

/// Stadium-shaped track: two half-disc turns joined by straights.
#[derive(Debug, Clone)]
pub struct StadiumTrack {
    width: f64,
    height: f64,
    center_left: (f64, f64),
    center_right: (f64, f64),
    outer_radius: f64,
    inner_radius: f64,
    finish_x: f64,
}

impl Default for StadiumTrack {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            center_left: (200.0, 300.0),
            center_right: (600.0, 300.0),
            outer_radius: 200.0,
            inner_radius: 100.0,
            finish_x: 400.0,
        }
    }
}

impl StadiumTrack {
    fn center_radius(&self) -> f64 {
        (self.outer_radius + self.inner_radius) / 2.0
    }

    /// Distance from the spine of the stadium (the segment joining both turn centres).
    fn spine_distance(&self, x: f64, y: f64) -> f64 {
        let (lx, cy) = self.center_left;
        let (rx, _) = self.center_right;
        if x < lx {
            (x - lx).hypot(y - cy)
        } else if x > rx {
            (x - rx).hypot(y - cy)
        } else {
            (y - cy).abs()
        }
    }
}

impl Track for StadiumTrack {
    fn is_on_track(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        if x < 0.0 || y < 0.0 || x >= self.width || y >= self.height {
            return false;
        }
        let dist = self.spine_distance(x, y);
        dist >= self.inner_radius && dist <= self.outer_radius
    }

    fn cast_radar(&self, x: f64, y: f64, angle: f64) -> f64 {
        let (dx, dy) = (angle.cos() * RADAR_STEP, angle.sin() * RADAR_STEP);
        let (mut cur_x, mut cur_y) = (x, y);
        let mut length = 0.0;
        while length < RADAR_MAX_RANGE {
            cur_x += dx;
            cur_y += dy;
            length += RADAR_STEP;
            if !self.is_on_track(cur_x, cur_y) {
                return length;
            }
        }
        RADAR_MAX_RANGE
    }

    fn has_crossed_finish(&self, prev_x: f64, x: f64, y: f64) -> bool {
        let cy = self.center_left.1;
        let top = cy - self.outer_radius;
        let bottom = cy - self.inner_radius;
        if !(top < y && y < bottom) {
            return false;
        }
        prev_x < self.finish_x && self.finish_x <= x
    }

    fn offset_from_centerline(&self, x: f64, y: f64) -> f64 {
        (self.spine_distance(x, y) - self.center_radius()).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_straights_turns_and_infield() {
        let track = StadiumTrack::default();
        assert!(track.is_on_track(450.0, 150.0));
        assert!(track.is_on_track(300.0, 450.0));
        assert!(track.is_on_track(50.0, 300.0));
        assert!(track.is_on_track(750.0, 300.0));
        assert!(!track.is_on_track(400.0, 300.0));
        assert!(!track.is_on_track(400.0, 50.0));
    }

    #[test]
    fn unclassifiable_points_are_off_track() {
        let track = StadiumTrack::default();
        assert!(!track.is_on_track(-1.0, 150.0));
        assert!(!track.is_on_track(450.0, 600.0));
        assert!(!track.is_on_track(f64::NAN, 150.0));
        assert!(!track.is_on_track(f64::INFINITY, 150.0));
    }

    #[test]
    fn radar_hits_walls_in_steps() {
        let track = StadiumTrack::default();
        // Straight up from the centreline: wall at y = 100, 50 units away.
        let up = track.cast_radar(450.0, 150.0, -std::f64::consts::FRAC_PI_2);
        assert!((up - 55.0).abs() < 1e-9);
        // Straight down: infield begins below y = 200.
        let down = track.cast_radar(450.0, 150.0, std::f64::consts::FRAC_PI_2);
        assert!((down - 55.0).abs() < 1e-9);
    }

    #[test]
    fn radar_caps_at_max_range() {
        let track = StadiumTrack::default();
        assert_eq!(track.cast_radar(210.0, 150.0, 0.0), RADAR_MAX_RANGE);
    }

    #[test]
    fn finish_requires_rightward_crossing_on_top_straight() {
        let track = StadiumTrack::default();
        assert!(track.has_crossed_finish(398.0, 401.0, 150.0));
        assert!(track.has_crossed_finish(399.0, 400.0, 150.0));
        assert!(!track.has_crossed_finish(401.0, 398.0, 150.0));
        assert!(!track.has_crossed_finish(398.0, 401.0, 450.0));
    }

    #[test]
    fn centerline_offset_per_segment() {
        let track = StadiumTrack::default();
        assert_eq!(track.offset_from_centerline(450.0, 150.0), 0.0);
        assert_eq!(track.offset_from_centerline(300.0, 470.0), 20.0);
        assert!((track.offset_from_centerline(50.0, 300.0) - 0.0).abs() < 1e-9);
        assert!((track.offset_from_centerline(600.0 + 130.0, 300.0) - 20.0).abs() < 1e-9);
    }
}

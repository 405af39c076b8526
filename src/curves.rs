/*
 * This file is part of fan-controller.
 *
 * Copyright (C) 2025 fan-controller contributors
 *
 * fan-controller is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fan-controller is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fan-controller. If not, see <https://www.gnu.org/licenses/>.
 */

//! Temperature to fan speed curves.
//!
//! A curve is an ordered list of `(temperature, speed)` control points. Points are
//! kept sorted by temperature with at most one point per temperature, so
//! evaluation is a simple bracket search followed by linear interpolation.
//! Outside the defined range the nearest end point is held; there is no
//! extrapolation.

use crate::constants::curve as curve_const;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
    pub temp_c: f64,
    pub speed_pct: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a curve from unsorted, possibly duplicated pairs as found in the
    /// configuration file. Later duplicates win.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut curve = Self::new();
        for (temp_c, speed_pct) in points {
            curve.add_point(temp_c, speed_pct);
        }
        curve
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Insert a point, replacing any point at the same temperature.
    ///
    /// Speed is clamped to 0..=100. NaN temperatures are ignored.
    pub fn add_point(&mut self, temp_c: f64, speed_pct: f64) {
        if temp_c.is_nan() {
            return;
        }
        let speed_pct = if speed_pct.is_nan() {
            curve_const::MIN_SPEED
        } else {
            speed_pct.clamp(curve_const::MIN_SPEED, curve_const::MAX_SPEED)
        };

        if let Some(existing) = self
            .points
            .iter_mut()
            .find(|p| (p.temp_c - temp_c).abs() < curve_const::FLOAT_EPSILON)
        {
            existing.speed_pct = speed_pct;
            return;
        }

        self.points.push(CurvePoint { temp_c, speed_pct });
        self.points.sort_by(|a, b| a.temp_c.total_cmp(&b.temp_c));
    }

    /// Remove the point nearest to `temp_c` if it lies within the tolerance.
    /// Returns the removed point.
    pub fn remove_point(&mut self, temp_c: f64) -> Option<CurvePoint> {
        let (idx, distance) = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p.temp_c - temp_c).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;

        if distance <= curve_const::REMOVE_TOLERANCE_CELSIUS {
            Some(self.points.remove(idx))
        } else {
            None
        }
    }

    /// Target speed in percent for `temp_c`. An empty curve yields 0.
    pub fn evaluate(&self, temp_c: f64) -> f64 {
        evaluate_points(&self.points, temp_c)
    }
}

/// Linear interpolation over points sorted ascending by temperature.
///
/// - no points: 0
/// - one point: constant
/// - below first / above last: held at the end point
/// - zero-width segment: the later point's speed
pub fn evaluate_points(points: &[CurvePoint], temp_c: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    if points.len() == 1 {
        return first.speed_pct;
    }
    if temp_c >= last.temp_c {
        return last.speed_pct;
    }
    if temp_c <= first.temp_c {
        return first.speed_pct;
    }

    // searched from the top so duplicate temperatures resolve to the later point
    for w in points.windows(2).rev() {
        let a = &w[0];
        let b = &w[1];
        if temp_c >= a.temp_c && temp_c <= b.temp_c {
            let width = b.temp_c - a.temp_c;
            if width.abs() < curve_const::FLOAT_EPSILON {
                return b.speed_pct;
            }
            let t = (temp_c - a.temp_c) / width;
            return a.speed_pct + (b.speed_pct - a.speed_pct) * t;
        }
    }

    // NaN temperatures fall through every comparison
    last.speed_pct
}

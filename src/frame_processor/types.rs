// SPDX-License-Identifier: GPL-3.0-only

//! Core types for detector results

/// Pixel position in frame coordinates (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Centroid accumulator over selected pixels
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Centroid {
    sum_x: u64,
    sum_y: u64,
    count: u64,
}

impl Centroid {
    pub(crate) fn add(&mut self, x: u32, y: u32) {
        self.sum_x += u64::from(x);
        self.sum_y += u64::from(y);
        self.count += 1;
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Mean position once at least `min_count` pixels were added
    pub(crate) fn center(&self, min_count: u64) -> Option<Point> {
        if self.count == 0 || self.count < min_count {
            return None;
        }
        Some(Point::new(
            (self.sum_x / self.count) as i32,
            (self.sum_y / self.count) as i32,
        ))
    }
}

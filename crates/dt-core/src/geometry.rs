//! Point geometry and axis-aligned rectangles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 2D point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle, always normalized so that min <= max
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Rect {
    /// Create a rectangle from two corners in any order
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            xmin: x1.min(x2),
            ymin: y1.min(y2),
            xmax: x1.max(x2),
            ymax: y1.max(y2),
        }
    }

    /// Degenerate rectangle covering a single point
    pub fn from_point(point: Point) -> Self {
        Self {
            xmin: point.x,
            ymin: point.y,
            xmax: point.x,
            ymax: point.y,
        }
    }

    /// Inclusive point-in-rectangle test
    pub fn contains(&self, point: &Point) -> bool {
        self.xmin <= point.x && point.x <= self.xmax && self.ymin <= point.y && point.y <= self.ymax
    }

    /// Grow the rectangle to cover `point`
    pub fn include(&mut self, point: Point) {
        self.xmin = self.xmin.min(point.x);
        self.ymin = self.ymin.min(point.y);
        self.xmax = self.xmax.max(point.x);
        self.ymax = self.ymax.max(point.y);
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} : {},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseRectError {
    #[error("expected 4 comma separated numbers, got {0}")]
    WrongArity(usize),

    #[error("invalid coordinate '{0}'")]
    InvalidNumber(String),
}

/// Parses `xmin,ymin,xmax,ymax`
impl FromStr for Rect {
    type Err = ParseRectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ParseRectError::WrongArity(parts.len()));
        }

        let mut coords = [0.0f64; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ParseRectError::InvalidNumber(part.to_string()))?;
        }

        Ok(Rect::new(coords[0], coords[1], coords[2], coords[3]))
    }
}

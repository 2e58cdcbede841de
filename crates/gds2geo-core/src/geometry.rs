use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D point in layout database units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for Point {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

/// A rectangle defined by lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            lower_left: Point::new(x1.min(x2), y1.min(y2)),
            upper_right: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    /// The rectangle as a closed 5-point polygon, counter-clockwise from the
    /// lower-left corner.
    pub fn to_polygon(&self) -> Polygon {
        let (x0, y0) = (self.lower_left.x, self.lower_left.y);
        let (x1, y1) = (self.upper_right.x, self.upper_right.y);
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
            Point::new(x0, y0),
        ])
    }
}

/// A polygon as an ordered point list.
///
/// Boundaries read from a stream keep their closing point; nothing here
/// depends on whether the last point repeats the first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// True when every edge, including the implicit closing edge, is
    /// horizontal or vertical.
    pub fn is_manhattan(&self) -> bool {
        let n = self.points.len();
        (0..n).all(|i| {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            a.x == b.x || a.y == b.y
        })
    }
}

/// A wire defined by a center line and a width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePath {
    pub points: Vec<Point>,
    pub width: i64,
}

impl WirePath {
    pub fn new(points: Vec<Point>, width: i64) -> Self {
        Self { points, width }
    }
}

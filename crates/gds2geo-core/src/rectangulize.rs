//! Decomposition of Manhattan wires into rectangles.
//!
//! A wire is a center line plus a width. Its two ends are pushed out by half
//! the width (square caps), every segment is inflated by half the width on
//! both sides, and each segment ending at an interior joint is carried half a
//! width past that joint so the corner square of an orthogonal turn is
//! covered by the incoming segment.

use thiserror::Error;

use crate::geometry::{Point, Rect, WirePath};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("wire has {0} vertices, at least 2 are required")]
    TooFewVertices(usize),

    #[error("wire segment {index} from {from} to {to} is neither horizontal nor vertical")]
    DiagonalSegment { index: usize, from: Point, to: Point },

    #[error("wire width {0} is negative")]
    NegativeWidth(i64),
}

/// Travel direction of a single wire segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    East,
    West,
    North,
    South,
}

impl Direction {
    /// Direction from `from` to `to`; `None` for a zero-length segment.
    fn of_segment(index: usize, from: Point, to: Point) -> Result<Option<Self>, GeometryError> {
        let dir = if from == to {
            None
        } else if from.y == to.y {
            Some(if from.x < to.x { Self::East } else { Self::West })
        } else if from.x == to.x {
            Some(if from.y < to.y { Self::North } else { Self::South })
        } else {
            return Err(GeometryError::DiagonalSegment { index, from, to });
        };
        Ok(dir)
    }

    fn is_vertical(self) -> bool {
        matches!(self, Self::North | Self::South)
    }

    /// Move `p` by `distance` along this direction (negative moves backward).
    fn step(self, p: Point, distance: i64) -> Point {
        match self {
            Self::East => p.translate(distance, 0),
            Self::West => p.translate(-distance, 0),
            Self::North => p.translate(0, distance),
            Self::South => p.translate(0, -distance),
        }
    }
}

/// Decompose a wire into one rectangle per segment, in segment order.
///
/// Half the width is computed with integer division, so an odd width loses
/// one unit overall; all emitted coordinates stay exact integers.
pub fn rectangulize(wire: &WirePath) -> Result<Vec<Rect>, GeometryError> {
    let n = wire.points.len();
    if n < 2 {
        return Err(GeometryError::TooFewVertices(n));
    }
    if wire.width < 0 {
        return Err(GeometryError::NegativeWidth(wire.width));
    }
    let half = wire.width / 2;

    let directions = wire
        .points
        .windows(2)
        .enumerate()
        .map(|(i, w)| Direction::of_segment(i, w[0], w[1]))
        .collect::<Result<Vec<_>, _>>()?;

    let mut vertices = wire.points.clone();
    if let Some(dir) = directions[0] {
        vertices[0] = dir.step(vertices[0], -half);
    }
    let last = directions.len() - 1;
    if let Some(dir) = directions[last] {
        vertices[n - 1] = dir.step(vertices[n - 1], half);
    }

    let rects = directions
        .iter()
        .enumerate()
        .map(|(i, dir)| {
            let from = vertices[i];
            let mut to = vertices[i + 1];
            if i < last {
                if let Some(d) = dir {
                    to = d.step(to, half);
                }
            }
            segment_rect(from, to, *dir, half)
        })
        .collect();
    Ok(rects)
}

fn segment_rect(from: Point, to: Point, dir: Option<Direction>, half: i64) -> Rect {
    match dir {
        Some(d) if d.is_vertical() => Rect::new(from.x - half, from.y, to.x + half, to.y),
        // Zero-length segments fall through here and come out degenerate.
        _ => Rect::new(from.x, from.y - half, to.x, to.y + half),
    }
}

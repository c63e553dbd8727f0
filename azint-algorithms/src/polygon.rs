//! Small convex clipping kernel for pixel footprints.
//!
//! A pixel quadrilateral clipped against an axis-aligned rectangle has at
//! most eight vertices, so polygons live on the stack.

/// A vertex `(radial, chi)`.
pub type Point = (f64, f64);

const MAX_VERTICES: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coord {
    X,
    Y,
}

impl Coord {
    #[inline]
    fn of(self, p: Point) -> f64 {
        match self {
            Coord::X => p.0,
            Coord::Y => p.1,
        }
    }
}

/// Fixed-capacity polygon.
#[derive(Clone, Copy, Debug)]
pub struct Polygon {
    vertices: [Point; MAX_VERTICES],
    len: usize,
}

impl Polygon {
    /// Polygon from the four corners of a pixel footprint.
    #[must_use]
    pub fn from_quad(corners: [Point; 4]) -> Self {
        let mut vertices = [(0.0, 0.0); MAX_VERTICES];
        vertices[..4].copy_from_slice(&corners);
        Self { vertices, len: 4 }
    }

    fn empty() -> Self {
        Self {
            vertices: [(0.0, 0.0); MAX_VERTICES],
            len: 0,
        }
    }

    #[inline]
    fn push(&mut self, p: Point) {
        // Convex clipping adds at most one vertex per half-plane.
        if self.len < MAX_VERTICES {
            self.vertices[self.len] = p;
            self.len += 1;
        }
    }

    /// Vertices in order.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices[..self.len]
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when clipping removed everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len < 3
    }

    /// Absolute area (shoelace formula).
    #[must_use]
    pub fn area(&self) -> f64 {
        if self.len < 3 {
            return 0.0;
        }
        let mut twice = 0.0f64;
        for i in 0..self.len {
            let (x1, y1) = self.vertices[i];
            let (x2, y2) = self.vertices[(i + 1) % self.len];
            twice += x1 * y2 - x2 * y1;
        }
        0.5 * twice.abs()
    }

    /// Axis-aligned bounds `(x_min, x_max, y_min, y_max)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.vertices().iter().fold(
            (
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
            ),
            |(x0, x1, y0, y1), &(x, y)| (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
        )
    }

    /// Copy translated along `y`.
    #[must_use]
    pub fn shifted_y(&self, dy: f64) -> Self {
        let mut out = *self;
        for v in &mut out.vertices[..out.len] {
            v.1 += dy;
        }
        out
    }

    /// Part of the polygon with `lo <= x <= hi`.
    #[must_use]
    pub fn clip_x(&self, lo: f64, hi: f64) -> Self {
        self.clip_half(Coord::X, lo, true)
            .clip_half(Coord::X, hi, false)
    }

    /// Part of the polygon with `lo <= y <= hi`.
    #[must_use]
    pub fn clip_y(&self, lo: f64, hi: f64) -> Self {
        self.clip_half(Coord::Y, lo, true)
            .clip_half(Coord::Y, hi, false)
    }

    /// One Sutherland–Hodgman pass against `coord >= bound` (`keep_above`)
    /// or `coord <= bound`.
    fn clip_half(&self, coord: Coord, bound: f64, keep_above: bool) -> Self {
        let mut out = Self::empty();
        if self.len == 0 {
            return out;
        }
        let inside = |p: Point| {
            let v = coord.of(p);
            if keep_above {
                v >= bound
            } else {
                v <= bound
            }
        };
        let crossing = |a: Point, b: Point| {
            let (va, vb) = (coord.of(a), coord.of(b));
            let t = (bound - va) / (vb - va);
            match coord {
                Coord::X => (bound, a.1 + t * (b.1 - a.1)),
                Coord::Y => (a.0 + t * (b.0 - a.0), bound),
            }
        };

        let mut prev = self.vertices[self.len - 1];
        let mut prev_in = inside(prev);
        for &curr in self.vertices() {
            let curr_in = inside(curr);
            if curr_in {
                if !prev_in {
                    out.push(crossing(prev, curr));
                }
                out.push(curr);
            } else if prev_in {
                out.push(crossing(prev, curr));
            }
            prev = curr;
            prev_in = curr_in;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Polygon {
        Polygon::from_quad([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
    }

    #[test]
    fn test_area_orientation_independent() {
        let ccw = unit_square();
        let cw = Polygon::from_quad([(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert_relative_eq!(ccw.area(), 1.0);
        assert_relative_eq!(cw.area(), 1.0);
    }

    #[test]
    fn test_clip_x_strips_partition_area() {
        let quad = Polygon::from_quad([(0.2, 0.0), (1.7, 0.3), (1.9, 1.4), (0.1, 1.1)]);
        let total = quad.area();
        let pieces: f64 = [(-1.0, 0.5), (0.5, 1.0), (1.0, 1.5), (1.5, 3.0)]
            .iter()
            .map(|&(lo, hi)| quad.clip_x(lo, hi).area())
            .sum();
        assert_relative_eq!(pieces, total, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_rectangle() {
        let square = unit_square();
        let piece = square.clip_x(0.25, 0.75).clip_y(0.5, 2.0);
        assert_relative_eq!(piece.area(), 0.25, epsilon = 1e-12);
        let outside = square.clip_x(2.0, 3.0);
        assert!(outside.is_empty());
        assert!(outside.area().abs() < f64::EPSILON);
    }

    #[test]
    fn test_diamond_clip() {
        let diamond = Polygon::from_quad([(1.0, 0.0), (2.0, 1.0), (1.0, 2.0), (0.0, 1.0)]);
        assert_relative_eq!(diamond.area(), 2.0);
        assert_relative_eq!(diamond.clip_x(0.0, 1.0).area(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(diamond.clip_x(0.5, 1.5).area(), 1.5, epsilon = 1e-12);
        let (x0, x1, y0, y1) = diamond.bounds();
        assert_eq!((x0, x1, y0, y1), (0.0, 2.0, 0.0, 2.0));
        assert_relative_eq!(diamond.shifted_y(360.0).bounds().2, 360.0);
    }
}

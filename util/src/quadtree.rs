//! # Quadtree Implementation
//!
//! This is an implementation of a quadtree, as described in [the wikipedia
//! article](https://en.wikipedia.org/wiki/Quadtree). It backs spatial queries
//! over accumulated detections, such as "which rocks lie within 5 m of the
//! rover" and "which mapped rock is closest".

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::Vector2;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Number of points per QuadTree node before it subdivides
pub const CAPACITY: usize = 4;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Represents a quad with a centre and half-width.
///
/// Containment is half-open, a point on the lower edge is inside while one on
/// the upper edge is not. This guarantees subdivision assigns every point to
/// exactly one child.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quad {
    centre: Vector2<f64>,
    half_width: f64,
}

/// An implementation of a QuadTree
#[derive(Clone, Debug)]
pub struct QuadTree {
    /// The bounds of this node
    boundary: Quad,

    /// Points stored in this node
    points: Vec<Vector2<f64>>,

    /// Children of this node, in NW, NE, SW, SE order. `None` until the node
    /// subdivides.
    children: Option<Box<[QuadTree; 4]>>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum QuadTreeError {
    #[error("The given point {0} was not in the bounds of the quadtree {1:?}")]
    PointNotInBounds(Vector2<f64>, Quad),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Quad {
    /// Creates a new quad with the given `centre` and `half_width`.
    pub fn new(centre: Vector2<f64>, half_width: f64) -> Self {
        Self { centre, half_width }
    }

    /// Returns `true` if `point` is inside this [`Quad`]
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        (self.centre[0] - self.half_width) <= point[0]
            && (self.centre[0] + self.half_width) > point[0]
            && (self.centre[1] - self.half_width) <= point[1]
            && (self.centre[1] + self.half_width) > point[1]
    }

    /// Returns `true` if `other` overlaps with this [`Quad`].
    pub fn intersects(&self, other: &Quad) -> bool {
        // Overlap test on both axes, rather than vertex containment, so that
        // a quad fully enclosing this one still intersects it.
        (self.centre[0] - self.half_width) <= (other.centre[0] + other.half_width)
            && (self.centre[0] + self.half_width) >= (other.centre[0] - other.half_width)
            && (self.centre[1] - self.half_width) <= (other.centre[1] + other.half_width)
            && (self.centre[1] + self.half_width) >= (other.centre[1] - other.half_width)
    }

    /// Distance from `point` to the closest edge of the quad, or zero if the
    /// point is inside it.
    fn min_dist_to(&self, point: &Vector2<f64>) -> f64 {
        let dx = ((self.centre[0] - self.half_width) - point[0])
            .max(point[0] - (self.centre[0] + self.half_width))
            .max(0.0);
        let dy = ((self.centre[1] - self.half_width) - point[1])
            .max(point[1] - (self.centre[1] + self.half_width))
            .max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

impl QuadTree {
    pub fn new(boundary: Quad) -> Self {
        Self {
            boundary,
            points: Vec::new(),
            children: None,
        }
    }

    /// Insert a point into the QuadTree.
    pub fn insert(&mut self, point: Vector2<f64>) -> Result<(), QuadTreeError> {
        // Check if it's in the tree
        if !self.boundary.contains(&point) {
            return Err(QuadTreeError::PointNotInBounds(point, self.boundary));
        }

        // If there's space in this node and it's not been divided add it to
        // the points list
        if self.points.len() < CAPACITY && self.children.is_none() {
            self.points.push(point);
            return Ok(());
        }

        // Otherwise subdivide if needed
        if self.children.is_none() {
            self.subdivide();
        }

        // And add the point to the child which contains it. Half-open
        // containment means exactly one child will accept it.
        if let Some(ref mut children) = self.children {
            for child in children.iter_mut() {
                if child.boundary.contains(&point) {
                    return child.insert(point);
                }
            }
        }

        // Can't happen while the children tile the parent
        Err(QuadTreeError::PointNotInBounds(point, self.boundary))
    }

    /// Return a list of all points within the given quad.
    pub fn query_in_quad(&self, quad: &Quad) -> Vec<Vector2<f64>> {
        let mut points = Vec::new();

        // If the quad doesn't overlap this node nothing below can match
        if !self.boundary.intersects(quad) {
            return points;
        }

        // Check self for the points
        for point in self.points.iter() {
            if quad.contains(point) {
                points.push(*point);
            }
        }

        // Then search the children
        if let Some(ref children) = self.children {
            for child in children.iter() {
                points.extend(child.query_in_quad(quad));
            }
        }

        points
    }

    /// Return a list of all points within `radius` of `centre`.
    pub fn query_in_radius(&self, centre: &Vector2<f64>, radius: f64) -> Vec<Vector2<f64>> {
        self.query_in_quad(&Quad::new(*centre, radius))
            .into_iter()
            .filter(|p| (p - centre).norm() <= radius)
            .collect()
    }

    /// Return the point in the tree closest to `target`, or `None` if the
    /// tree is empty.
    pub fn nearest(&self, target: &Vector2<f64>) -> Option<Vector2<f64>> {
        let mut best: Option<(Vector2<f64>, f64)> = None;
        self.nearest_inner(target, &mut best);
        best.map(|(p, _)| p)
    }

    /// Total number of points stored in the tree.
    pub fn len(&self) -> usize {
        let mut count = self.points.len();
        if let Some(ref children) = self.children {
            for child in children.iter() {
                count += child.len();
            }
        }
        count
    }

    /// True if the tree contains no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Branch and bound nearest neighbour search. Nodes whose boundary is
    /// further than the current best distance are pruned.
    fn nearest_inner(&self, target: &Vector2<f64>, best: &mut Option<(Vector2<f64>, f64)>) {
        if let Some((_, best_dist)) = best {
            if self.boundary.min_dist_to(target) > *best_dist {
                return;
            }
        }

        for point in self.points.iter() {
            let dist = (point - target).norm();
            match best {
                Some((_, best_dist)) if dist >= *best_dist => (),
                _ => *best = Some((*point, dist)),
            }
        }

        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.nearest_inner(target, best);
            }
        }
    }

    fn subdivide(&mut self) {
        let hw = self.boundary.half_width / 2.0;
        let c = self.boundary.centre;

        self.children = Some(Box::new([
            QuadTree::new(Quad::new(c + Vector2::new(-hw, hw), hw)),
            QuadTree::new(Quad::new(c + Vector2::new(hw, hw), hw)),
            QuadTree::new(Quad::new(c + Vector2::new(-hw, -hw), hw)),
            QuadTree::new(Quad::new(c + Vector2::new(hw, -hw), hw)),
        ]));
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn tree_with(points: &[(f64, f64)]) -> QuadTree {
        let mut tree = QuadTree::new(Quad::new(Vector2::new(0.0, 0.0), 100.0));
        for &(x, y) in points {
            tree.insert(Vector2::new(x, y)).unwrap();
        }
        tree
    }

    #[test]
    fn test_insert_and_query() {
        let tree = tree_with(&[(1.0, 1.0), (50.0, 50.0), (-50.0, -50.0), (2.0, 2.0), (3.0, 3.0)]);

        assert_eq!(tree.len(), 5);

        let near_origin = tree.query_in_quad(&Quad::new(Vector2::new(0.0, 0.0), 10.0));
        assert_eq!(near_origin.len(), 3);
    }

    #[test]
    fn test_insert_out_of_bounds() {
        let mut tree = QuadTree::new(Quad::new(Vector2::new(0.0, 0.0), 1.0));
        assert!(tree.insert(Vector2::new(10.0, 10.0)).is_err());
    }

    #[test]
    fn test_subdivision_keeps_centre_point() {
        // More points than CAPACITY, one exactly on the subdivision line
        let tree = tree_with(&[
            (0.0, 0.0),
            (10.0, 10.0),
            (-10.0, 10.0),
            (10.0, -10.0),
            (-10.0, -10.0),
            (20.0, 20.0),
        ]);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn test_query_in_radius() {
        let tree = tree_with(&[(0.0, 3.0), (4.0, 0.0), (5.0, 5.0)]);

        // (5, 5) is inside the bounding quad of the circle but outside the
        // circle itself
        let found = tree.query_in_radius(&Vector2::new(0.0, 0.0), 5.0);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_nearest() {
        let tree = tree_with(&[(10.0, 10.0), (-20.0, 5.0), (1.0, -1.0), (70.0, 70.0)]);

        let nearest = tree.nearest(&Vector2::new(0.0, 0.0)).unwrap();
        assert_eq!(nearest, Vector2::new(1.0, -1.0));

        let empty = QuadTree::new(Quad::new(Vector2::new(0.0, 0.0), 1.0));
        assert!(empty.nearest(&Vector2::new(0.0, 0.0)).is_none());
    }
}

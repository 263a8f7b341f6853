//! Lattice graph over raw corners.
//!
//! Every corner links to at most one partner per lattice step. A link needs
//! the two diagonals to cross at about 90° and the edge between the corners to
//! bisect each diagonal pair (about 45° off both). Components are then
//! labelled with integer lattice coordinates by breadth-first search.

use crate::corner::Corner;
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_4;

/// Lattice step, with `i` growing along image x and `j` along image y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    East,
    West,
    North,
    South,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::East, Step::West, Step::North, Step::South];

    /// The step an image-space edge most resembles.
    pub fn of(edge: &Vector2<f32>) -> Self {
        match (edge.x.abs() > edge.y.abs(), edge.x >= 0.0, edge.y >= 0.0) {
            (true, true, _) => Step::East,
            (true, false, _) => Step::West,
            (false, _, true) => Step::South,
            (false, _, false) => Step::North,
        }
    }

    pub fn offset(self) -> (i32, i32) {
        match self {
            Step::East => (1, 0),
            Step::West => (-1, 0),
            Step::North => (0, -1),
            Step::South => (0, 1),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    pub to: usize,
    pub step: Step,
    /// Edge length in pixels.
    pub length: f32,
    /// Summed angular deviations (radians); lower is better.
    pub cost: f32,
}

/// Angle between the undirected `axis` and the unit `edge`, minus 45°.
fn bisector_deviation(axis: &Vector2<f32>, edge: &Vector2<f32>) -> f32 {
    let along = axis.dot(edge).abs();
    let across = axis.perp(edge).abs();
    (across.atan2(along) - FRAC_PI_4).abs()
}

/// Cost of linking `from` to `to`, or `None` when the pair cannot be lattice
/// neighbours.
fn link_cost(from: &Corner, to: &Corner, params: &GridGraphParams) -> Option<(f32, f32)> {
    let tol = params.orientation_tolerance_deg.to_radians();
    let (a, b) = (from.axis(), to.axis());

    // |cos| of the crossing angle is the sine of its offset from 90°.
    let skew = a.dot(&b).abs().min(1.0).asin();
    if skew > tol {
        return None;
    }

    let delta = to.position - from.position;
    let length = delta.norm();
    if !(params.min_spacing_pix..=params.max_spacing_pix).contains(&length) {
        return None;
    }

    let edge = delta / length;
    let dev_from = bisector_deviation(&a, &edge);
    let dev_to = bisector_deviation(&b, &edge);
    if dev_from > tol || dev_to > tol {
        return None;
    }
    Some((length, skew + dev_from + dev_to))
}

/// Directed links per corner, one slot per [`Step`].
pub struct GridGraph {
    links: Vec<[Option<Link>; 4]>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        let points: Vec<[f32; 2]> = corners.iter().map(|c| [c.position.x, c.position.y]).collect();
        let tree: KdTree<f32, 2> = (&points).into();

        let links = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let mut slots: [Option<Link>; 4] = [None; 4];
                let nearest = tree.nearest_n::<SquaredEuclidean>(&points[i], params.k_neighbors);
                for j in nearest.into_iter().map(|nn| nn.item as usize) {
                    if j == i {
                        continue;
                    }
                    let Some((length, cost)) = link_cost(corner, &corners[j], params) else {
                        continue;
                    };
                    let step = Step::of(&(corners[j].position - corner.position));
                    let slot = &mut slots[step.slot()];
                    let better = slot.is_none_or(|cur| (cost, length) < (cur.cost, cur.length));
                    if better {
                        *slot = Some(Link {
                            to: j,
                            step,
                            length,
                            cost,
                        });
                    }
                }
                slots
            })
            .collect();

        Self { links }
    }

    pub fn links(&self, node: usize) -> impl Iterator<Item = &Link> {
        self.links[node].iter().flatten()
    }

    /// Nodes reachable along links, each with lattice coordinates `(node, i, j)`
    /// relative to the node the search started from. Every node lands in
    /// exactly one component, under the first coordinate it was reached with.
    pub fn lattice_components(&self) -> Vec<Vec<(usize, i32, i32)>> {
        let mut seen = vec![false; self.links.len()];
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..self.links.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            queue.push_back((start, 0, 0));
            let mut labelled = Vec::new();
            while let Some((node, i, j)) = queue.pop_front() {
                labelled.push((node, i, j));
                for link in self.links(node) {
                    if !seen[link.to] {
                        seen[link.to] = true;
                        let (di, dj) = link.step.offset();
                        queue.push_back((link.to, i + di, j + dj));
                    }
                }
            }
            components.push(labelled);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner {
            position: Point2::new(x, y),
            orientation,
            strength: 1.0,
        }
    }

    /// Checkerboard lattice: diagonals alternate between 45° and 135°.
    fn lattice(cols: usize, rows: usize, pitch: f32) -> Vec<Corner> {
        (0..rows)
            .flat_map(|j| {
                (0..cols).map(move |i| {
                    let orientation = if (i + j) % 2 == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
                    corner(i as f32 * pitch, j as f32 * pitch, orientation)
                })
            })
            .collect()
    }

    fn params(max_spacing_pix: f32, k_neighbors: usize) -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix,
            k_neighbors,
            ..Default::default()
        }
    }

    fn link(graph: &GridGraph, node: usize, step: Step) -> Option<Link> {
        graph.links(node).find(|l| l.step == step).copied()
    }

    #[test]
    fn interior_corner_links_in_four_steps() {
        let corners = lattice(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(15.0, 8));

        assert_eq!(graph.links(4).count(), 4);
        assert_eq!(link(&graph, 4, Step::West).map(|l| l.to), Some(3));
        assert_eq!(link(&graph, 4, Step::East).map(|l| l.to), Some(5));
        assert_eq!(link(&graph, 4, Step::North).map(|l| l.to), Some(1));
        assert_eq!(link(&graph, 4, Step::South).map(|l| l.to), Some(7));
        assert!(graph.links(4).all(|l| (l.length - 10.0).abs() < 1e-4 && l.cost < 1e-3));

        let steps: Vec<Step> = graph.links(0).map(|l| l.step).collect();
        assert_eq!(steps, vec![Step::East, Step::South]);
    }

    #[test]
    fn diagonal_and_parallel_pairs_do_not_link() {
        let p = params(20.0, 4);
        // Same diagonal on both sides.
        let parallel = [corner(0.0, 0.0, FRAC_PI_4), corner(10.0, 0.0, FRAC_PI_4)];
        assert!(GridGraph::new(&parallel, &p).links(0).next().is_none());

        // Crossing diagonals, but the edge runs along one of them.
        let along = [corner(0.0, 0.0, FRAC_PI_4), corner(8.0, 8.0, 3.0 * FRAC_PI_4)];
        assert!(GridGraph::new(&along, &p).links(0).next().is_none());

        let far = [corner(0.0, 0.0, FRAC_PI_4), corner(30.0, 0.0, 3.0 * FRAC_PI_4)];
        assert!(GridGraph::new(&far, &p).links(0).next().is_none());
    }

    #[test]
    fn cheapest_candidate_wins_a_step() {
        let corners = [
            corner(0.0, 0.0, FRAC_PI_4),
            corner(12.0, 0.0, 3.0 * FRAC_PI_4 + 0.1),
            corner(10.0, 0.0, 3.0 * FRAC_PI_4),
            corner(-10.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params(15.0, 4));
        assert_eq!(link(&graph, 0, Step::East).map(|l| l.to), Some(2));
        assert_eq!(link(&graph, 0, Step::West).map(|l| l.to), Some(3));
        assert_eq!(graph.links(0).count(), 2);
    }

    #[test]
    fn components_carry_lattice_coordinates() {
        let (cols, rows) = (4, 3);
        let mut corners = lattice(cols, rows, 10.0);
        corners.push(corner(500.0, 500.0, 0.0));
        let graph = GridGraph::new(&corners, &params(15.0, 8));

        let mut components = graph.lattice_components();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        assert_eq!(components.len(), 2);
        assert_eq!(components[1], vec![(cols * rows, 0, 0)]);

        let (root, _, _) = components[0][0];
        assert_eq!(components[0].len(), cols * rows);
        for &(node, i, j) in &components[0] {
            let di = (node % cols) as i32 - (root % cols) as i32;
            let dj = (node / cols) as i32 - (root / cols) as i32;
            assert_eq!((i, j), (di, dj), "node {node}");
        }
    }

    #[test]
    fn steps_follow_the_dominant_axis() {
        assert_eq!(Step::of(&Vector2::new(3.0, -1.0)), Step::East);
        assert_eq!(Step::of(&Vector2::new(-3.0, 2.9)), Step::West);
        assert_eq!(Step::of(&Vector2::new(1.0, -2.0)), Step::North);
        assert_eq!(Step::of(&Vector2::new(0.0, 0.5)), Step::South);
        assert!(Step::ALL.iter().all(|s| {
            let (di, dj) = s.offset();
            Step::of(&Vector2::new(di as f32, dj as f32)) == *s
        }));
    }
}

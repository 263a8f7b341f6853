//! From a cloud of raw corners to the ordered inner-corner grid of one board.

use crate::corner::Corner;
use crate::gridgraph::GridGraph;
use crate::params::GridGraphParams;
use nalgebra::Point2;
use std::collections::HashMap;

/// Ordered board corners before subpixel refinement.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardGrid {
    /// Row-major, `rows * cols` entries.
    pub points: Vec<Point2<f64>>,
    /// Mean neighbor distance in pixels.
    pub spacing: f64,
    /// The board appeared with its columns running down the image.
    pub transposed: bool,
}

/// Cell content keyed by BFS coordinate; `None` marks a coordinate claimed by
/// more than one corner.
type CellMap = HashMap<(i32, i32), Option<usize>>;

fn full_window(cells: &CellMap, i0: i32, j0: i32, w: i32, h: i32) -> bool {
    (0..h).all(|dj| (0..w).all(|di| matches!(cells.get(&(i0 + di, j0 + dj)), Some(Some(_)))))
}

/// The unique fully populated `w × h` window in a component, if any.
fn find_window(cells: &CellMap, w: i32, h: i32) -> Option<(i32, i32)> {
    let (mut min_i, mut max_i, mut min_j, mut max_j) = (i32::MAX, i32::MIN, i32::MAX, i32::MIN);
    for &(i, j) in cells.keys() {
        min_i = min_i.min(i);
        max_i = max_i.max(i);
        min_j = min_j.min(j);
        max_j = max_j.max(j);
    }
    let mut found = None;
    for j0 in min_j..=max_j - h + 1 {
        for i0 in min_i..=max_i - w + 1 {
            if full_window(cells, i0, j0, w, h) {
                if found.is_some() {
                    return None;
                }
                found = Some((i0, j0));
            }
        }
    }
    found
}

/// Assemble the `rows × cols` inner-corner grid from raw corners.
///
/// Components of the neighbor graph are tried largest first. A component is
/// accepted when exactly one fully populated window of the board's size (in
/// either orientation) exists in its BFS coordinates. Columns along image x
/// keep index 0 at the top-left corner; a transposed board is rotated by +90°
/// so the ordering stays right-handed.
pub fn assemble_board(
    corners: &[Corner],
    rows: usize,
    cols: usize,
    params: &GridGraphParams,
) -> Option<BoardGrid> {
    let needed = rows * cols;
    if corners.len() < needed || rows == 0 || cols == 0 {
        log::debug!("grid assembly: {} corners, need {}", corners.len(), needed);
        return None;
    }

    let graph = GridGraph::new(corners, params);
    let mut components = graph.lattice_components();
    components.retain(|c| c.len() >= needed);
    components.sort_by_key(|c| std::cmp::Reverse(c.len()));

    for component in &components {
        let mut cells = CellMap::new();
        for &(node, i, j) in component {
            cells
                .entry((i, j))
                .and_modify(|slot| *slot = None)
                .or_insert(Some(node));
        }

        let (r, c) = (rows as i32, cols as i32);
        let (origin, transposed) = match find_window(&cells, c, r) {
            Some(o) => (o, false),
            None if rows != cols => match find_window(&cells, r, c) {
                Some(o) => (o, true),
                None => continue,
            },
            None => continue,
        };

        let (i0, j0) = origin;
        let mut order = Vec::with_capacity(needed);
        for row in 0..r {
            for col in 0..c {
                let key = if transposed {
                    (i0 + (r - 1 - row), j0 + col)
                } else {
                    (i0 + col, j0 + row)
                };
                order.push(cells.get(&key).copied().flatten()?);
            }
        }

        let points = order
            .iter()
            .map(|&n| {
                let p = corners[n].position;
                Point2::new(p.x as f64, p.y as f64)
            })
            .collect();

        let (sum, count) = order
            .iter()
            .flat_map(|&n| graph.links(n))
            .fold((0.0f64, 0usize), |(s, k), link| (s + link.length as f64, k + 1));
        let spacing = if count > 0 { sum / count as f64 } else { 0.0 };

        log::debug!(
            "grid assembly: component of {} corners accepted{}",
            component.len(),
            if transposed { " (transposed)" } else { "" }
        );
        return Some(BoardGrid {
            points,
            spacing,
            transposed,
        });
    }

    log::debug!(
        "grid assembly: no component matches a {rows}x{cols} board ({} candidates)",
        components.len()
    );
    None
}

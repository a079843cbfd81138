//! Navigation grid and A* pathfinding
//!
//! The walkability grid is derived from the current wall layout at half the
//! entity radius per cell and memoized against the wall layout version:
//! rebuilding it is the dominant per-match CPU cost, so it happens once per
//! arena and is reused by every bot navigation tick until the arena changes.
//!
//! Search is 8-connected A* (cost 10 cardinal / 14 diagonal) with no corner
//! cutting, ring-search snapping for blocked endpoints, dynamic cell blocking
//! for live projectiles, and greedy string-pulling smoothing afterwards.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use super::arena::{Wall, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS};
use super::geometry;

/// Grid resolution: half the entity radius
pub const NAV_CELL: f32 = PLAYER_RADIUS * 0.5;

/// Maximum ring radius when snapping a blocked endpoint to a walkable cell
const SNAP_RADIUS: i32 = 6;

/// Cardinal / diagonal step costs (scaled by 10 to stay integral)
const COST_CARDINAL: u32 = 10;
const COST_DIAGONAL: u32 = 14;

/// Boolean walkability matrix derived from a wall layout
pub struct NavGrid {
    cols: i32,
    rows: i32,
    walkable: Vec<bool>,
    version: u64,
}

impl NavGrid {
    /// Build the grid for a wall layout. A cell is walkable iff its center
    /// keeps full body clearance from the playfield edges and from every wall.
    pub fn build(walls: &[Wall], version: u64) -> Self {
        let cols = (ARENA_WIDTH / NAV_CELL) as i32;
        let rows = (ARENA_HEIGHT / NAV_CELL) as i32;
        let mut walkable = vec![false; (cols * rows) as usize];

        for row in 0..rows {
            for col in 0..cols {
                let (x, y) = cell_center(col, row);
                let in_bounds = x >= PLAYER_RADIUS
                    && x <= ARENA_WIDTH - PLAYER_RADIUS
                    && y >= PLAYER_RADIUS
                    && y <= ARENA_HEIGHT - PLAYER_RADIUS;
                walkable[(row * cols + col) as usize] =
                    in_bounds && !geometry::circle_overlaps_any(x, y, PLAYER_RADIUS, walls);
            }
        }

        Self {
            cols,
            rows,
            walkable,
            version,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_walkable(&self, col: i32, row: i32) -> bool {
        col >= 0
            && row >= 0
            && col < self.cols
            && row < self.rows
            && self.walkable[(row * self.cols + col) as usize]
    }

    fn is_free(&self, col: i32, row: i32, blocked: &HashSet<(i32, i32)>) -> bool {
        self.is_walkable(col, row) && !blocked.contains(&(col, row))
    }
}

/// World position -> containing cell
pub fn cell_of(x: f32, y: f32) -> (i32, i32) {
    ((x / NAV_CELL) as i32, (y / NAV_CELL) as i32)
}

/// Cell -> world position of its center
pub fn cell_center(col: i32, row: i32) -> (f32, f32) {
    (
        col as f32 * NAV_CELL + NAV_CELL / 2.0,
        row as f32 * NAV_CELL + NAV_CELL / 2.0,
    )
}

/// Memoized grid, invalidated by the wall layout version tag
#[derive(Default)]
pub struct NavCache {
    grid: Option<NavGrid>,
}

impl NavCache {
    pub fn new() -> Self {
        Self { grid: None }
    }

    /// Get the grid for the current layout, rebuilding only when stale
    pub fn grid(&mut self, walls: &[Wall], version: u64) -> &NavGrid {
        let stale = self.grid.as_ref().map(|g| g.version() != version).unwrap_or(true);
        if stale {
            self.grid = Some(NavGrid::build(walls, version));
        }
        self.grid.as_ref().unwrap()
    }

    pub fn invalidate(&mut self) {
        self.grid = None;
    }
}

#[derive(Eq, PartialEq)]
struct OpenNode {
    f: u32,
    g: u32,
    idx: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f, tie-break on g
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a smoothed world-space path from `start` to `goal`.
///
/// `blocked` holds cells temporarily occupied by live projectile threats.
/// Returns `None` when no connecting walkable region exists or the grid is
/// pathologically small.
pub fn find_path(
    grid: &NavGrid,
    start: (f32, f32),
    goal: (f32, f32),
    blocked: &HashSet<(i32, i32)>,
) -> Option<Vec<(f32, f32)>> {
    if grid.cols < 2 || grid.rows < 2 {
        return None;
    }

    let start_cell = snap_to_free(grid, cell_of(start.0, start.1), blocked)?;
    let goal_cell = snap_to_free(grid, cell_of(goal.0, goal.1), blocked)?;

    if start_cell == goal_cell {
        return Some(vec![start, cell_center(goal_cell.0, goal_cell.1)]);
    }

    let cells = run_astar(grid, start_cell, goal_cell, blocked)?;
    let mut points: Vec<(f32, f32)> = Vec::with_capacity(cells.len() + 1);
    points.push(start);
    points.extend(cells.iter().map(|&(c, r)| cell_center(c, r)));

    Some(smooth(grid, &points))
}

/// Expanding ring search for the nearest free cell, bounded by `SNAP_RADIUS`
fn snap_to_free(
    grid: &NavGrid,
    cell: (i32, i32),
    blocked: &HashSet<(i32, i32)>,
) -> Option<(i32, i32)> {
    if grid.is_free(cell.0, cell.1, blocked) {
        return Some(cell);
    }

    for radius in 1..=SNAP_RADIUS {
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                if dr.abs() != radius && dc.abs() != radius {
                    continue; // ring perimeter only
                }
                let candidate = (cell.0 + dc, cell.1 + dr);
                if grid.is_free(candidate.0, candidate.1, blocked) {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

fn run_astar(
    grid: &NavGrid,
    start: (i32, i32),
    goal: (i32, i32),
    blocked: &HashSet<(i32, i32)>,
) -> Option<Vec<(i32, i32)>> {
    let size = (grid.cols * grid.rows) as usize;
    let idx = |c: i32, r: i32| (r * grid.cols + c) as usize;

    let mut g_score = vec![u32::MAX; size];
    let mut came_from = vec![usize::MAX; size];
    let mut closed = vec![false; size];
    let mut open = BinaryHeap::new();

    let start_idx = idx(start.0, start.1);
    g_score[start_idx] = 0;
    open.push(OpenNode {
        f: heuristic(start, goal),
        g: 0,
        idx: start_idx,
    });

    const NEIGHBORS: [(i32, i32); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];

    while let Some(node) = open.pop() {
        let col = node.idx as i32 % grid.cols;
        let row = node.idx as i32 / grid.cols;

        if (col, row) == goal {
            return Some(reconstruct(&came_from, node.idx, grid.cols));
        }

        if closed[node.idx] {
            continue;
        }
        closed[node.idx] = true;

        for (dc, dr) in NEIGHBORS {
            let nc = col + dc;
            let nr = row + dr;
            if !grid.is_free(nc, nr, blocked) {
                continue;
            }

            let diagonal = dc != 0 && dr != 0;
            if diagonal
                && (!grid.is_free(col + dc, row, blocked) || !grid.is_free(col, row + dr, blocked))
            {
                continue; // no corner cutting through walls
            }

            let step = if diagonal { COST_DIAGONAL } else { COST_CARDINAL };
            let tentative = node.g.saturating_add(step);
            let n_idx = idx(nc, nr);

            if tentative < g_score[n_idx] {
                g_score[n_idx] = tentative;
                came_from[n_idx] = node.idx;
                open.push(OpenNode {
                    f: tentative + heuristic((nc, nr), goal),
                    g: tentative,
                    idx: n_idx,
                });
            }
        }
    }

    None
}

/// Euclidean remaining distance in cell units, scaled to match step costs
fn heuristic(from: (i32, i32), to: (i32, i32)) -> u32 {
    let dx = (to.0 - from.0) as f32;
    let dy = (to.1 - from.1) as f32;
    ((dx * dx + dy * dy).sqrt() * COST_CARDINAL as f32) as u32
}

fn reconstruct(came_from: &[usize], mut idx: usize, cols: i32) -> Vec<(i32, i32)> {
    let mut cells = Vec::new();
    while idx != usize::MAX {
        cells.push((idx as i32 % cols, idx as i32 / cols));
        idx = came_from[idx];
    }
    cells.reverse();
    cells
}

/// Greedy string pulling: repeatedly connect the current anchor to the
/// farthest waypoint it can see, removing the grid staircasing.
fn smooth(grid: &NavGrid, points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut result = vec![points[0]];
    let mut anchor = 0usize;

    while anchor < points.len() - 1 {
        let mut farthest = anchor + 1;
        for candidate in (anchor + 2..points.len()).rev() {
            if walkable_line(grid, points[anchor], points[candidate]) {
                farthest = candidate;
                break;
            }
        }
        result.push(points[farthest]);
        anchor = farthest;
    }

    result
}

/// Check a straight segment against grid walkability at sub-cell resolution
pub fn walkable_line(grid: &NavGrid, from: (f32, f32), to: (f32, f32)) -> bool {
    let length = geometry::dist(from.0, from.1, to.0, to.1);
    let step = NAV_CELL / 4.0;
    let steps = (length / step).ceil().max(1.0) as usize;

    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        let (col, row) = cell_of(x, y);
        if !grid.is_walkable(col, row) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_blocks() -> HashSet<(i32, i32)> {
        HashSet::new()
    }

    #[test]
    fn open_field_path_is_direct() {
        let grid = NavGrid::build(&[], 1);
        let path = find_path(&grid, (100.0, 100.0), (700.0, 400.0), &no_blocks()).unwrap();
        // Smoothing should collapse an unobstructed path to its endpoints
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn path_routes_around_wall() {
        let wall = Wall {
            x: 400.0,
            y: 0.0,
            width: 40.0,
            height: 500.0,
        };
        let walls = vec![wall];
        let grid = NavGrid::build(&walls, 1);
        let path = find_path(&grid, (100.0, 250.0), (700.0, 250.0), &no_blocks()).unwrap();

        assert!(path.len() >= 3, "path should bend around the wall");
        // Post-smoothing invariant: every consecutive pair is wall-clear
        for pair in path.windows(2) {
            assert!(walkable_line(&grid, pair[0], pair[1]));
            assert!(!geometry::segment_intersects_rect(
                pair[0].0, pair[0].1, pair[1].0, pair[1].1, &walls[0]
            ));
        }
    }

    #[test]
    fn disconnected_region_returns_none() {
        // Full-height wall splits the arena in two
        let walls = vec![Wall {
            x: 440.0,
            y: 0.0,
            width: 40.0,
            height: ARENA_HEIGHT,
        }];
        let grid = NavGrid::build(&walls, 1);
        assert!(find_path(&grid, (100.0, 300.0), (800.0, 300.0), &no_blocks()).is_none());
    }

    #[test]
    fn blocked_start_snaps_to_nearby_cell() {
        let wall = Wall {
            x: 200.0,
            y: 200.0,
            width: 60.0,
            height: 60.0,
        };
        let grid = NavGrid::build(&[wall], 1);
        // Start sits inside the wall footprint; the ring search must recover
        let path = find_path(&grid, (230.0, 230.0), (700.0, 400.0), &no_blocks());
        assert!(path.is_some());
    }

    #[test]
    fn projectile_cells_divert_endpoint_snap() {
        let grid = NavGrid::build(&[], 1);
        let start_cell = cell_of(100.0, 100.0);
        let mut blocked = HashSet::new();
        blocked.insert(start_cell);

        let path = find_path(&grid, (100.0, 100.0), (400.0, 300.0), &blocked).unwrap();
        let first_cell = cell_of(path[1].0, path[1].1);
        assert_ne!(first_cell, start_cell);
    }

    #[test]
    fn cache_rebuilds_only_on_version_change() {
        let mut cache = NavCache::new();
        let walls = vec![];
        let first = cache.grid(&walls, 1) as *const NavGrid;
        let second = cache.grid(&walls, 1) as *const NavGrid;
        assert_eq!(first, second);
        let third = cache.grid(&walls, 2);
        assert_eq!(third.version(), 2);
    }
}

//! Walkability grid and A* search used by NPCs without line of sight

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::util::math::{Quat, Vec3};

/// Cost of a straight and a diagonal move, scaled to integers
const STRAIGHT_COST: i32 = 10;
const DIAGONAL_COST: i32 = 14;
/// Expansion budget per search
const MAX_SEARCH_STEPS: usize = 20_000;

type Cell = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavCell {
    pub walkable: bool,
    /// Ground height at the cell centre
    pub height: f32,
}

/// An oriented box used to derive blocked cells
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub position: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
}

impl Obstacle {
    /// Half extents of the world-aligned bounding box
    fn aabb_half_extents(&self) -> Vec3 {
        let m = self.rotation.to_rotation_matrix();
        let abs = m.matrix().abs();
        abs * self.half_extents
    }
}

#[derive(Debug, Clone)]
pub struct NavGrid {
    origin_x: f32,
    origin_z: f32,
    cell_size: f32,
    width: i32,
    depth: i32,
    cells: Vec<NavCell>,
}

fn octile(a: Cell, b: Cell) -> i32 {
    let dx = (a.0 - b.0).abs();
    let dz = (a.1 - b.1).abs();
    STRAIGHT_COST * (dx + dz) + (DIAGONAL_COST - 2 * STRAIGHT_COST) * dx.min(dz)
}

impl NavGrid {
    /// Flat, fully walkable grid
    pub fn flat(origin: Vec3, cell_size: f32, width: u32, depth: u32) -> Self {
        let width = width.max(1) as i32;
        let depth = depth.max(1) as i32;
        Self {
            origin_x: origin.x,
            origin_z: origin.z,
            cell_size: cell_size.max(0.1),
            width,
            depth,
            cells: vec![
                NavCell {
                    walkable: true,
                    height: origin.y,
                };
                (width * depth) as usize
            ],
        }
    }

    /// Derive walkability from box obstacles. A cell whose tallest covering box rises more
    /// than `max_step` above the base height is blocked; otherwise its height is that top.
    pub fn from_obstacles(
        origin: Vec3,
        cell_size: f32,
        width: u32,
        depth: u32,
        max_step: f32,
        obstacles: &[Obstacle],
    ) -> Self {
        let mut grid = Self::flat(origin, cell_size, width, depth);
        let base = origin.y;
        let mut tops: Vec<Option<f32>> = vec![None; grid.cells.len()];

        for obstacle in obstacles {
            let half = obstacle.aabb_half_extents();
            let min = obstacle.position - half;
            let max = obstacle.position + half;
            let top = max.y;
            let (Some(lo), Some(hi)) = (
                grid.world_to_grid_clamped(&min),
                grid.world_to_grid_clamped(&max),
            ) else {
                continue;
            };
            for z in lo.1..=hi.1 {
                for x in lo.0..=hi.0 {
                    let centre = grid.grid_to_world((x, z));
                    if centre.x < min.x || centre.x > max.x || centre.z < min.z || centre.z > max.z {
                        continue;
                    }
                    let idx = grid.index((x, z));
                    tops[idx] = Some(tops[idx].map_or(top, |t: f32| t.max(top)));
                }
            }
        }

        for (cell, top) in grid.cells.iter_mut().zip(tops) {
            if let Some(top) = top {
                if top - base > max_step {
                    cell.walkable = false;
                }
                cell.height = top;
            }
        }
        grid
    }

    fn index(&self, cell: Cell) -> usize {
        (cell.1 * self.width + cell.0) as usize
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.0 >= 0 && cell.1 >= 0 && cell.0 < self.width && cell.1 < self.depth
    }

    /// Cell containing a world position, if inside the grid
    pub fn world_to_grid(&self, p: &Vec3) -> Option<Cell> {
        let x = ((p.x - self.origin_x) / self.cell_size).floor();
        let z = ((p.z - self.origin_z) / self.cell_size).floor();
        if !x.is_finite() || !z.is_finite() {
            return None;
        }
        let cell = (x as i32, z as i32);
        self.in_bounds(cell).then_some(cell)
    }

    fn world_to_grid_clamped(&self, p: &Vec3) -> Option<Cell> {
        let x = ((p.x - self.origin_x) / self.cell_size).floor();
        let z = ((p.z - self.origin_z) / self.cell_size).floor();
        if !x.is_finite() || !z.is_finite() {
            return None;
        }
        Some((
            (x as i32).clamp(0, self.width - 1),
            (z as i32).clamp(0, self.depth - 1),
        ))
    }

    /// Centre of a cell at its ground height
    pub fn grid_to_world(&self, cell: Cell) -> Vec3 {
        let height = self.cell(cell).map_or(0.0, |c| c.height);
        Vec3::new(
            self.origin_x + (cell.0 as f32 + 0.5) * self.cell_size,
            height,
            self.origin_z + (cell.1 as f32 + 0.5) * self.cell_size,
        )
    }

    pub fn cell(&self, cell: Cell) -> Option<&NavCell> {
        self.in_bounds(cell).then(|| &self.cells[self.index(cell)])
    }

    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.cell(cell).is_some_and(|c| c.walkable)
    }

    #[cfg(test)]
    pub fn set_walkable(&mut self, cell: Cell, walkable: bool) {
        if self.in_bounds(cell) {
            let idx = self.index(cell);
            self.cells[idx].walkable = walkable;
        }
    }

    fn neighbours(&self, cell: Cell) -> impl Iterator<Item = (Cell, i32)> + '_ {
        const STEPS: [(i32, i32); 8] = [
            (1, 0),
            (-1, 0),
            (0, 1),
            (0, -1),
            (1, 1),
            (1, -1),
            (-1, 1),
            (-1, -1),
        ];
        STEPS.iter().filter_map(move |&(dx, dz)| {
            let next = (cell.0 + dx, cell.1 + dz);
            if !self.is_walkable(next) {
                return None;
            }
            if dx != 0 && dz != 0 {
                // no corner cutting: both orthogonal neighbours must be open
                if !self.is_walkable((cell.0 + dx, cell.1)) || !self.is_walkable((cell.0, cell.1 + dz)) {
                    return None;
                }
                return Some((next, DIAGONAL_COST));
            }
            Some((next, STRAIGHT_COST))
        })
    }

    /// Waypoints (cell centres) from `from` to `to`, excluding the start cell.
    /// `None` when either end lies off the grid, the goal is blocked, or no route exists.
    pub fn find_path(&self, from: &Vec3, to: &Vec3) -> Option<Vec<Vec3>> {
        let start = self.world_to_grid(from)?;
        let goal = self.world_to_grid(to)?;
        if !self.is_walkable(goal) {
            return None;
        }
        if start == goal {
            return Some(Vec::new());
        }

        let mut open = BinaryHeap::<(Reverse<i32>, Reverse<i32>, Cell)>::new();
        let mut g_scores = HashMap::<Cell, i32>::new();
        let mut came_from = HashMap::<Cell, Cell>::new();

        g_scores.insert(start, 0);
        open.push((Reverse(octile(start, goal)), Reverse(0), start));

        let mut steps = 0usize;
        while let Some((_, Reverse(g_cost), cell)) = open.pop() {
            if g_cost > g_scores.get(&cell).copied().unwrap_or(i32::MAX) {
                continue;
            }
            if cell == goal {
                return Some(self.reconstruct(start, goal, &came_from));
            }
            steps += 1;
            if steps > MAX_SEARCH_STEPS {
                break;
            }
            for (next, cost) in self.neighbours(cell) {
                let tentative = g_cost.saturating_add(cost);
                if tentative >= g_scores.get(&next).copied().unwrap_or(i32::MAX) {
                    continue;
                }
                came_from.insert(next, cell);
                g_scores.insert(next, tentative);
                open.push((
                    Reverse(tentative.saturating_add(octile(next, goal))),
                    Reverse(tentative),
                    next,
                ));
            }
        }
        None
    }

    fn reconstruct(&self, start: Cell, goal: Cell, came_from: &HashMap<Cell, Cell>) -> Vec<Vec3> {
        let mut cells = vec![goal];
        let mut current = goal;
        while let Some(&prev) = came_from.get(&current) {
            if prev == start {
                break;
            }
            cells.push(prev);
            current = prev;
        }
        cells.reverse();
        cells.into_iter().map(|c| self.grid_to_world(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> NavGrid {
        NavGrid::flat(Vec3::new(0.0, 0.0, 0.0), 1.0, 10, 10)
    }

    #[test]
    fn straight_line_on_open_grid() {
        let path = grid()
            .find_path(&Vec3::new(0.5, 0.0, 0.5), &Vec3::new(5.5, 0.0, 0.5))
            .unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.last().copied(), Some(Vec3::new(5.5, 0.0, 0.5)));
    }

    #[test]
    fn routes_around_a_wall_without_cutting_corners() {
        let mut grid = grid();
        for z in 0..9 {
            grid.set_walkable((5, z), false);
        }
        let path = grid
            .find_path(&Vec3::new(2.5, 0.0, 2.5), &Vec3::new(8.5, 0.0, 2.5))
            .unwrap();
        for p in &path {
            assert!(grid.is_walkable(grid.world_to_grid(p).unwrap()));
        }
        // must pass through the single gap at z = 9
        assert!(path.iter().any(|p| grid.world_to_grid(p) == Some((5, 9))));
        for pair in path.windows(2) {
            let a = grid.world_to_grid(&pair[0]).unwrap();
            let b = grid.world_to_grid(&pair[1]).unwrap();
            if a.0 != b.0 && a.1 != b.1 {
                assert!(grid.is_walkable((b.0, a.1)) && grid.is_walkable((a.0, b.1)));
            }
        }
    }

    #[test]
    fn blocked_or_off_grid_goal_has_no_path() {
        let mut grid = grid();
        grid.set_walkable((7, 7), false);
        assert!(grid
            .find_path(&Vec3::new(0.5, 0.0, 0.5), &Vec3::new(7.5, 0.0, 7.5))
            .is_none());
        assert!(grid
            .find_path(&Vec3::new(0.5, 0.0, 0.5), &Vec3::new(50.0, 0.0, 0.5))
            .is_none());
    }

    #[test]
    fn enclosed_goal_is_unreachable() {
        let mut grid = grid();
        for (x, z) in [(3, 4), (4, 3), (5, 4), (4, 5), (3, 3), (5, 5), (3, 5), (5, 3)] {
            grid.set_walkable((x, z), false);
        }
        assert!(grid
            .find_path(&Vec3::new(0.5, 0.0, 0.5), &Vec3::new(4.5, 0.0, 4.5))
            .is_none());
    }

    #[test]
    fn tall_boxes_block_and_low_boxes_raise_ground() {
        let obstacles = [
            Obstacle {
                position: Vec3::new(2.0, 1.0, 2.0),
                rotation: Quat::identity(),
                half_extents: Vec3::new(0.9, 1.0, 0.9),
            },
            Obstacle {
                position: Vec3::new(7.0, 0.1, 7.0),
                rotation: Quat::identity(),
                half_extents: Vec3::new(0.9, 0.1, 0.9),
            },
        ];
        let grid = NavGrid::from_obstacles(Vec3::zeros(), 1.0, 10, 10, 0.5, &obstacles);
        assert!(!grid.is_walkable((1, 1)));
        assert!(!grid.is_walkable((2, 2)));
        assert!(grid.is_walkable((6, 6)));
        assert!((grid.cell((7, 7)).unwrap().height - 0.2).abs() < 1e-5);
        assert_eq!(grid.cell((0, 9)).unwrap().height, 0.0);
    }
}

use rstar::{primitives::GeomWithData, Point, RTree};

use crate::{
    concurrency::par_iter_mut1, floating_type_mod::FT, simulation_parameters::NeighborhoodSearchAlgorithm, V, V3,
    V3I,
};

/// For every particle the (sorted) indices of all particles within the support radius, itself included.
///
/// Sorting makes the neighbor sums independent of the search algorithm.
pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn internal_lists(&self) -> &Vec<Vec<u32>> {
        &self.neighs
    }

    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = usize> + 'a {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighs.is_empty()
    }

    pub fn build_neighborhood_list_brute_force(&mut self, positions: &[V3], support_radius: FT) {
        let max_dist_sq = support_radius * support_radius;
        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();
            let xi = positions[i];
            for (j, xj) in positions.iter().enumerate() {
                if (xi - xj).norm_squared() <= max_dist_sq {
                    p_neighs.push(j as u32);
                }
            }
        });
    }

    pub fn build_neighborhood_list_rstar(&mut self, positions: &[V3], support_radius: FT) {
        #[derive(Debug, PartialEq, Clone, Copy)]
        struct CustomRTreePoint {
            p: V3,
        }
        impl Point for CustomRTreePoint {
            type Scalar = FT;

            const DIMENSIONS: usize = 3;

            fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
                CustomRTreePoint {
                    p: V3::from_iterator((0..3).map(|d| generator(d))),
                }
            }

            fn nth(&self, index: usize) -> Self::Scalar {
                self.p[index]
            }

            fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
                &mut self.p[index]
            }
        }
        impl From<V3> for CustomRTreePoint {
            fn from(p: V3) -> Self {
                CustomRTreePoint { p }
            }
        }

        type CustomRTreeElem = GeomWithData<CustomRTreePoint, usize>;

        let rtree_elems: Vec<_> = positions
            .iter()
            .enumerate()
            .map(|(idx, pos)| CustomRTreeElem::new(CustomRTreePoint::from(*pos), idx))
            .collect();

        let rtree = RTree::<CustomRTreeElem>::bulk_load(rtree_elems);

        let max_dist_sq = support_radius * support_radius;

        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();

            let this_particle_position = positions[i];

            for neigh_point in rtree.locate_within_distance(CustomRTreePoint::from(this_particle_position), max_dist_sq) {
                let j = neigh_point.data;
                // same predicate as the brute force search
                if (this_particle_position - positions[j]).norm_squared() <= max_dist_sq {
                    p_neighs.push(j as u32);
                }
            }

            p_neighs.sort_unstable();
        });
    }

    pub fn build_neighborhood_list_grid(&mut self, positions: &[V3], support_radius: FT) {
        fn particle_to_cell_pos(particle_pos: V3, cell_size: FT) -> V3I {
            particle_pos.map(|x| (x / cell_size).floor() as i32)
        }

        if positions.is_empty() {
            for p_neighborhood_list_indices in &mut self.neighs {
                p_neighborhood_list_indices.clear();
            }
            return;
        }

        let mut domain_min = positions[0];
        let mut domain_max = positions[0];
        for position in positions {
            for d in 0..3 {
                domain_min[d] = FT::min(domain_min[d], position[d]);
                domain_max[d] = FT::max(domain_max[d], position[d]);
            }
        }

        let cells_min = domain_min.map(|x| (x / support_radius).floor() as i32 - 1);
        let cells_max = domain_max.map(|x| (x / support_radius).floor() as i32 + 2);
        let grid_size: V<usize, 3> = (cells_max - cells_min).map(|x| x as usize);

        let mut grid = CellGrid::new(cells_min, grid_size);

        for (particle_id, position) in positions.iter().enumerate() {
            let cell_pos = particle_to_cell_pos(*position, support_radius);
            grid.get_mut(cell_pos).particle_ids.push(particle_id);
        }

        let max_dist_sq = support_radius * support_radius;

        par_iter_mut1(&mut self.neighs, |particle_id, p_neighs| {
            p_neighs.clear();

            let this_particle_position = positions[particle_id];

            let particle_cell_pos = particle_to_cell_pos(this_particle_position, support_radius);

            iterate_grid_neighbors(1, |offset| {
                let cell_pos = particle_cell_pos + offset;

                for d in 0..3 {
                    if cell_pos[d] < cells_min[d] || cell_pos[d] >= cells_max[d] {
                        return;
                    }
                }

                for &neigh_particle_id in &grid.get(cell_pos).particle_ids {
                    let neigh_particle_position = positions[neigh_particle_id];

                    if (neigh_particle_position - this_particle_position).norm_squared() > max_dist_sq {
                        continue;
                    }

                    p_neighs.push(neigh_particle_id as u32);
                }
            });

            p_neighs.sort_unstable();
        });
    }
}

fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(V3I)) {
    for z in -dist..=dist {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y, z].into());
            }
        }
    }
}

pub fn build_neighborhood_list(
    algorithm: NeighborhoodSearchAlgorithm,
    positions: &[V3],
    support_radius: FT,
    neighs: &mut NeighborhoodCache,
) {
    assert_eq!(positions.len(), neighs.len());
    match algorithm {
        NeighborhoodSearchAlgorithm::BruteForce => {
            neighs.build_neighborhood_list_brute_force(positions, support_radius)
        }
        NeighborhoodSearchAlgorithm::Grid => neighs.build_neighborhood_list_grid(positions, support_radius),
        NeighborhoodSearchAlgorithm::RStar => neighs.build_neighborhood_list_rstar(positions, support_radius),
    }
}

struct Cell {
    particle_ids: Vec<usize>,
}

impl Cell {
    fn new() -> Cell {
        Cell {
            particle_ids: Vec::new(),
        }
    }
}

struct CellGrid {
    grid_min: V3I,
    size: V<usize, 3>,
    cells: Vec<Cell>,
}

impl CellGrid {
    fn new(grid_min: V3I, grid_size: V<usize, 3>) -> CellGrid {
        let num_elements = grid_size.fold(1, |acc, x| acc * x);
        CellGrid {
            grid_min,
            size: grid_size,
            cells: (0..num_elements).map(|_| Cell::new()).collect(),
        }
    }

    fn pos_to_idx(&self, mut cell_pos: V3I) -> usize {
        cell_pos = cell_pos - self.grid_min;

        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..3 {
            assert!(0 <= cell_pos[d]);
            assert!((cell_pos[d] as usize) < self.size[d]);
            idx += multiplier * cell_pos[d] as usize;
            multiplier *= self.size[d];
        }
        idx
    }

    fn get(&self, cell_pos: V3I) -> &Cell {
        let idx = self.pos_to_idx(cell_pos);
        &self.cells[idx]
    }

    fn get_mut(&mut self, cell_pos: V3I) -> &mut Cell {
        let idx = self.pos_to_idx(cell_pos);
        &mut self.cells[idx]
    }
}

#[cfg(test)]
fn scattered_positions(n: usize) -> Vec<V3> {
    // deterministic low-discrepancy point set, some points outside the unit cube
    (0..n)
        .map(|i| {
            let t = i as FT;
            crate::vec3f(
                (t * 0.618_034).fract() * 1.2 - 0.1,
                (t * 0.414_214).fract() * 1.2 - 0.1,
                (t * 0.732_051).fract() * 1.2 - 0.1,
            )
        })
        .collect()
}

#[test]
fn accelerated_searches_match_brute_force() {
    let positions = scattered_positions(400);
    let support_radius = 0.17;

    let mut reference = NeighborhoodCache::new(positions.len());
    build_neighborhood_list(
        NeighborhoodSearchAlgorithm::BruteForce,
        &positions,
        support_radius,
        &mut reference,
    );

    for algorithm in [NeighborhoodSearchAlgorithm::Grid, NeighborhoodSearchAlgorithm::RStar] {
        let mut neighs = NeighborhoodCache::new(positions.len());
        build_neighborhood_list(algorithm, &positions, support_radius, &mut neighs);
        assert_eq!(
            neighs.internal_lists(),
            reference.internal_lists(),
            "{:?} differs from brute force",
            algorithm
        );
    }
}

#[test]
fn every_particle_is_its_own_neighbor() {
    let positions = scattered_positions(50);
    let mut neighs = NeighborhoodCache::new(positions.len());
    build_neighborhood_list(NeighborhoodSearchAlgorithm::Grid, &positions, 0.05, &mut neighs);
    for i in 0..positions.len() {
        assert!(neighs.iter(i).any(|j| j == i));
        assert!(neighs.neighbor_count(i) >= 1);
    }
}

#[test]
fn neighborhood_is_symmetric() {
    let positions = scattered_positions(200);
    let mut neighs = NeighborhoodCache::new(positions.len());
    build_neighborhood_list(NeighborhoodSearchAlgorithm::Grid, &positions, 0.2, &mut neighs);
    for i in 0..positions.len() {
        assert!(
            neighs.iter(i).all(|j| neighs.iter(j).any(|i2| i == i2)),
            "neighbor relation is not symmetric for particle {}",
            i
        );
    }
}

#[test]
fn support_radius_covering_everything_lists_all_particles() {
    let positions = scattered_positions(1500);
    for algorithm in [
        NeighborhoodSearchAlgorithm::BruteForce,
        NeighborhoodSearchAlgorithm::Grid,
        NeighborhoodSearchAlgorithm::RStar,
    ] {
        let mut neighs = NeighborhoodCache::new(positions.len());
        build_neighborhood_list(algorithm, &positions, 2.5, &mut neighs);
        for i in 0..positions.len() {
            assert_eq!(neighs.neighbor_count(i), positions.len(), "{:?}", algorithm);
            assert!(neighs.iter(i).eq(0..positions.len()));
        }
    }
}

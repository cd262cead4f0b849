//! Path queries over a navigation mesh
//!
//! [`NavMeshQuery::find_path`] runs A* across polygon links. Every polygon
//! maps to exactly one search node of the [`DtNodePool`]; when a cheaper route
//! to a queued node is found, the node is updated in place and re-sorted in
//! the [`DtNodeQueue`].

use glam::Vec3;

use super::node_pool::{DtNodePool, DtNodeQueue, NodeFlags, NodeIndex};
use super::{NavMesh, PolyRef, QueryFilter, Result, Status};

/// Default size of the search node pool
pub const DT_DEFAULT_MAX_NODES: usize = 2048;

/// Heuristic scale, keeps the estimate strictly below the true cost
const H_SCALE: f32 = 0.999;

/// Result of a path search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPath {
    /// Polygons from the start polygon to the last polygon reached
    pub polys: Vec<PolyRef>,
    /// The goal could not be reached, the path ends at the polygon closest to it
    pub partial: bool,
}

/// Query object for a navigation mesh
pub struct NavMeshQuery<'a> {
    nav_mesh: &'a NavMesh,
    node_pool: DtNodePool,
    open_list: DtNodeQueue,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query with room for `max_nodes` search nodes
    pub fn new(nav_mesh: &'a NavMesh, max_nodes: usize) -> Result<Self> {
        let queue_capacity = i32::try_from(max_nodes)
            .map_err(|_| Status::invalid_param(format!("max nodes {} too large", max_nodes)))?;
        let hash_size = (max_nodes / 4).next_power_of_two().max(1);

        Ok(Self {
            nav_mesh,
            node_pool: DtNodePool::new(max_nodes, hash_size)?,
            open_list: DtNodeQueue::new(queue_capacity)?,
        })
    }

    pub fn nav_mesh(&self) -> &NavMesh {
        self.nav_mesh
    }

    /// Search nodes of the last query
    pub fn node_pool(&self) -> &DtNodePool {
        &self.node_pool
    }

    /// Finds a polygon path from `start_ref` to `end_ref`
    ///
    /// When the goal cannot be reached, either because it is disconnected or
    /// because the node pool ran out, the path to the explored polygon closest
    /// to `end_pos` is returned with `partial` set.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
        filter: &QueryFilter,
    ) -> Result<QueryPath> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref) || !self.nav_mesh.is_valid_poly_ref(end_ref)
        {
            return Err(Status::invalid_param("start or end polygon is not valid"));
        }
        if !start_pos.is_finite() || !end_pos.is_finite() {
            return Err(Status::invalid_param("start and end positions must be finite"));
        }

        if start_ref == end_ref {
            return Ok(QueryPath {
                polys: vec![start_ref],
                partial: false,
            });
        }

        self.node_pool.clear();
        self.open_list.clear();

        let start_idx = self.node_pool.get_node(start_ref, 0)?;
        let start_total = start_pos.distance(end_pos) * H_SCALE;
        if let Some(start) = self.node_pool.node_mut(start_idx) {
            start.pos = start_pos;
            start.cost = 0.0;
            start.total = start_total;
            start.flags = NodeFlags::OPEN;
        }
        self.open_list.push(&self.node_pool, start_idx)?;

        let mut last_best = start_idx;
        let mut last_best_cost = start_total;
        let mut out_of_nodes = false;

        while let Ok(best_idx) = self.open_list.pop(&self.node_pool) {
            let (best_ref, best_pos, best_cost, parent_idx) = {
                let best = self
                    .node_pool
                    .node_mut(best_idx)
                    .ok_or(Status::NotFound)?;
                best.flags.remove(NodeFlags::OPEN);
                best.flags.insert(NodeFlags::CLOSED);
                (best.id, best.pos, best.cost, best.pidx)
            };

            if best_ref == end_ref {
                last_best = best_idx;
                break;
            }

            let parent_ref = parent_idx
                .and_then(|p| self.node_pool.node(p))
                .map(|p| p.id);
            let (best_tile, best_poly) = self.nav_mesh.get_tile_and_poly_by_ref(best_ref)?;

            for link in best_tile.poly_links(best_poly) {
                let nei_ref = link.reference;
                if nei_ref.is_null() || Some(nei_ref) == parent_ref {
                    continue;
                }
                let Ok((nei_tile, nei_poly)) = self.nav_mesh.get_tile_and_poly_by_ref(nei_ref)
                else {
                    continue;
                };
                if !filter.pass_filter(nei_poly) {
                    continue;
                }

                let nei_idx = match self.node_pool.get_node(nei_ref, 0) {
                    Ok(idx) => idx,
                    Err(err) if err.is_capacity_exceeded() => {
                        out_of_nodes = true;
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                let nei_flags = self.node_pool.node(nei_idx).map_or(NodeFlags::empty(), |n| n.flags);
                let nei_pos = if nei_flags.is_empty() {
                    nei_tile.poly_center(nei_ref.poly_index() as usize)
                } else {
                    self.node_pool.node(nei_idx).map_or(Vec3::ZERO, |n| n.pos)
                };

                let (cost, heuristic) = if nei_ref == end_ref {
                    let cost = best_cost
                        + filter.get_cost(best_pos, nei_pos, best_poly)
                        + filter.get_cost(nei_pos, end_pos, nei_poly);
                    (cost, 0.0)
                } else {
                    let cost = best_cost + filter.get_cost(best_pos, nei_pos, best_poly);
                    (cost, nei_pos.distance(end_pos) * H_SCALE)
                };
                let total = cost + heuristic;

                let already_total = self.node_pool.node(nei_idx).map_or(0.0, |n| n.total);
                if nei_flags.intersects(NodeFlags::OPEN | NodeFlags::CLOSED) && total >= already_total
                {
                    continue;
                }

                if let Some(nei) = self.node_pool.node_mut(nei_idx) {
                    nei.pos = nei_pos;
                    nei.pidx = Some(best_idx);
                    nei.flags.remove(NodeFlags::CLOSED);
                    nei.cost = cost;
                    nei.total = total;
                }

                if nei_flags.contains(NodeFlags::OPEN) {
                    self.open_list.modify(&self.node_pool, nei_idx)?;
                } else {
                    if let Some(nei) = self.node_pool.node_mut(nei_idx) {
                        nei.flags.insert(NodeFlags::OPEN);
                    }
                    self.open_list.push(&self.node_pool, nei_idx)?;
                }

                if heuristic < last_best_cost {
                    last_best_cost = heuristic;
                    last_best = nei_idx;
                }
            }
        }

        let polys = self.collect_path(last_best);
        let partial = polys.last() != Some(&end_ref);
        if partial {
            log::warn!(
                "Path from {} to {} is partial, ends at {}{}",
                start_ref,
                end_ref,
                polys.last().copied().unwrap_or_default(),
                if out_of_nodes { " (out of nodes)" } else { "" }
            );
        }

        Ok(QueryPath { polys, partial })
    }

    fn collect_path(&self, last: NodeIndex) -> Vec<PolyRef> {
        let mut polys = Vec::new();
        let mut current = Some(last);
        while let Some(idx) = current {
            let Some(node) = self.node_pool.node(idx) else {
                break;
            };
            polys.push(node.id);
            current = node.pidx;
        }
        polys.reverse();
        polys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{build_grid_tile, GridTileSpec};
    use crate::{PolyFlags, TileFlags, TileRef};

    fn mesh_with(spec: &GridTileSpec) -> (NavMesh, TileRef) {
        let mut mesh = NavMesh::new(GridTileSpec::default_params()).unwrap();
        let tile_ref = mesh.add_tile(&build_grid_tile(spec), TileFlags::FREE_DATA).unwrap();
        (mesh, tile_ref)
    }

    fn poly(tile_ref: TileRef, index: u32) -> PolyRef {
        PolyRef::encode(tile_ref.salt(), tile_ref.index(), index)
    }

    fn center(mesh: &NavMesh, reference: PolyRef) -> Vec3 {
        let tile = mesh.resolve(reference.tile_ref()).unwrap();
        tile.poly_center(reference.poly_index() as usize)
    }

    #[test]
    fn test_path_along_strip() {
        let (mesh, tile) = mesh_with(&GridTileSpec::new(0, 0).with_size(4, 1));
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();

        let start = poly(tile, 0);
        let end = poly(tile, 3);
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &QueryFilter::default())
            .unwrap();

        assert!(!path.partial);
        assert_eq!(path.polys, (0..4).map(|i| poly(tile, i)).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_start_and_end() {
        let (mesh, tile) = mesh_with(&GridTileSpec::new(0, 0));
        let mut query = NavMeshQuery::new(&mesh, 16).unwrap();
        let start = poly(tile, 0);

        let path = query
            .find_path(start, start, Vec3::ZERO, Vec3::ZERO, &QueryFilter::default())
            .unwrap();
        assert_eq!(path.polys, vec![start]);
        assert!(!path.partial);
    }

    #[test]
    fn test_avoids_expensive_area() {
        // 2x2 grid: 0 1 in the first row, 2 3 in the second
        let spec = GridTileSpec::new(0, 0).with_size(2, 2).with_poly_area(1, 5);
        let (mesh, tile) = mesh_with(&spec);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();

        let mut filter = QueryFilter::default();
        filter.area_cost[5] = 10.0;

        let start = poly(tile, 0);
        let end = poly(tile, 3);
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &filter)
            .unwrap();
        assert_eq!(path.polys, vec![start, poly(tile, 2), end]);

        // Each polygon maps to a single search node
        assert_eq!(query.node_pool().get_node_count(), 4);
        assert_eq!(query.node_pool().find_nodes(end, 4).len(), 1);
    }

    #[test]
    fn test_cheaper_route_updates_open_node() {
        // 3x2 grid: 0 1 2 in the first row, 3 4 5 in the second
        let spec = GridTileSpec::new(0, 0).with_size(3, 2).with_poly_area(1, 5);
        let (mesh, tile) = mesh_with(&spec);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();

        let mut filter = QueryFilter::default();
        filter.area_cost[5] = 10.0;

        // Polygon 4 is first queued through the costly polygon 1, then
        // reached for less through polygon 3
        let start = poly(tile, 0);
        let end = poly(tile, 2);
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &filter)
            .unwrap();
        assert!(!path.partial);
        assert_eq!(
            path.polys,
            [0, 3, 4, 5, 2].map(|i| poly(tile, i)).to_vec()
        );

        let pool = query.node_pool();
        assert_eq!(pool.get_node_count(), 6);
        for i in 0..6 {
            assert_eq!(pool.find_nodes(poly(tile, i), 4).len(), 1);
        }

        let via_three = center(&mesh, start).distance(center(&mesh, poly(tile, 3)))
            + center(&mesh, poly(tile, 3)).distance(center(&mesh, poly(tile, 4)));
        let improved = pool
            .node(pool.find_node(poly(tile, 4), 0).unwrap())
            .unwrap();
        assert!((improved.cost - via_three).abs() < 1e-4);
        assert_eq!(
            improved.pidx.and_then(|p| pool.node(p)).map(|n| n.id),
            Some(poly(tile, 3))
        );
    }

    #[test]
    fn test_excluded_polygon_gives_partial_path() {
        let spec = GridTileSpec::new(0, 0)
            .with_size(3, 1)
            .with_poly_flags(1, PolyFlags::WALK | PolyFlags::DISABLED);
        let (mesh, tile) = mesh_with(&spec);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();

        let filter = QueryFilter {
            exclude_flags: PolyFlags::DISABLED,
            ..QueryFilter::default()
        };
        let start = poly(tile, 0);
        let end = poly(tile, 2);
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &filter)
            .unwrap();

        assert!(path.partial);
        assert_eq!(path.polys, vec![start]);
    }

    #[test]
    fn test_out_of_nodes_gives_partial_path() {
        let (mesh, tile) = mesh_with(&GridTileSpec::new(0, 0).with_size(4, 1));
        let mut query = NavMeshQuery::new(&mesh, 2).unwrap();

        let start = poly(tile, 0);
        let end = poly(tile, 3);
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &QueryFilter::default())
            .unwrap();

        assert!(path.partial);
        assert_eq!(path.polys, vec![start, poly(tile, 1)]);
    }

    #[test]
    fn test_path_across_tiles() {
        let mut mesh = NavMesh::new(GridTileSpec::default_params()).unwrap();
        let left = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();
        let right = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(1, 0).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();

        let mut query = NavMeshQuery::new(&mesh, DT_DEFAULT_MAX_NODES).unwrap();
        let start = left.poly_base();
        let end = right.poly_base();
        let path = query
            .find_path(start, end, center(&mesh, start), center(&mesh, end), &QueryFilter::default())
            .unwrap();

        assert!(!path.partial);
        assert_eq!(path.polys, vec![start, end]);
    }

    #[test]
    fn test_invalid_input() {
        let (mut mesh, tile) = mesh_with(&GridTileSpec::new(0, 0).with_size(2, 1));
        {
            let mut query = NavMeshQuery::new(&mesh, 16).unwrap();
            let err = query
                .find_path(
                    poly(tile, 0),
                    poly(tile, 9),
                    Vec3::ZERO,
                    Vec3::ZERO,
                    &QueryFilter::default(),
                )
                .unwrap_err();
            assert!(err.is_contract_violation());

            let err = query
                .find_path(
                    poly(tile, 0),
                    poly(tile, 1),
                    Vec3::NAN,
                    Vec3::ZERO,
                    &QueryFilter::default(),
                )
                .unwrap_err();
            assert!(matches!(err, Status::InvalidParam(_)));
        }

        mesh.remove_tile(tile).unwrap();
        let mut query = NavMeshQuery::new(&mesh, 16).unwrap();
        assert!(query
            .find_path(
                poly(tile, 0),
                poly(tile, 1),
                Vec3::ZERO,
                Vec3::ZERO,
                &QueryFilter::default()
            )
            .is_err());
    }

    #[test]
    fn test_query_params() {
        let mesh = NavMesh::new(GridTileSpec::default_params()).unwrap();
        assert!(NavMeshQuery::new(&mesh, 0).is_err());
        let query = NavMeshQuery::new(&mesh, 100).unwrap();
        assert_eq!(query.node_pool().get_max_nodes(), 100);
        assert_eq!(query.node_pool().get_hash_size(), 32);
    }
}

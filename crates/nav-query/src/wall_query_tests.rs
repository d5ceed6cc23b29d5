//! Wall segment and wall distance tests

#[cfg(test)]
mod tests {
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::test_mesh_helpers::*;
    use crate::{DefaultQueryFilter, Error, PolyFlags, PolyRef};
    use nav_common::Result;

    #[test]
    fn test_wall_segments_corner_cell() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r0 = poly_ref_at(&mesh, 0, 0, 0);

        let walls = query.get_poly_wall_segments(r0, false, &filter)?;
        assert_eq!(walls.len(), 2);
        assert!(walls.iter().all(|s| s.is_wall()));

        let all = query.get_poly_wall_segments(r0, true, &filter)?;
        assert_eq!(all.len(), 4);
        let mut neighbours: Vec<PolyRef> = all
            .iter()
            .filter(|s| !s.is_wall())
            .map(|s| s.neighbour_ref)
            .collect();
        neighbours.sort_by_key(|r| r.id());
        let mut expected = vec![poly_ref_at(&mesh, 0, 0, 1), poly_ref_at(&mesh, 0, 0, 3)];
        expected.sort_by_key(|r| r.id());
        assert_eq!(neighbours, expected);
        Ok(())
    }

    #[test]
    fn test_wall_segments_isolated_polygon() -> Result<()> {
        let mesh = create_islands_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();

        for index in 0..2 {
            let r = poly_ref_at(&mesh, 0, 0, index);
            let (_, poly) = mesh.get_tile_and_poly_by_ref(r)?;
            let nv = poly.vert_count as usize;

            for store_portals in [false, true] {
                let segments = query.get_poly_wall_segments(r, store_portals, &filter)?;
                assert_eq!(segments.len(), nv);
                assert!(segments.iter().all(|s| s.is_wall()));
            }
        }
        Ok(())
    }

    #[test]
    fn test_wall_segments_filtered_neighbour_is_wall() -> Result<()> {
        let mut mesh = create_grid_mesh()?;
        let r1 = poly_ref_at(&mesh, 0, 0, 1);
        mesh.set_poly_flags(r1, PolyFlags::DISABLED)?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::new(PolyFlags::WALK, PolyFlags::DISABLED);

        let walls = query.get_poly_wall_segments(poly_ref_at(&mesh, 0, 0, 0), false, &filter)?;
        assert_eq!(walls.len(), 3);
        Ok(())
    }

    #[test]
    fn test_wall_segments_partial_tile_border() -> Result<()> {
        let mesh = create_offset_tiles_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let a = poly_ref_at(&mesh, 0, 0, 0);
        let b = poly_ref_at(&mesh, 1, 0, 0);

        let segments = query.get_poly_wall_segments(a, true, &filter)?;
        let portals: Vec<_> = segments.iter().filter(|s| !s.is_wall()).collect();
        assert_eq!(portals.len(), 1);
        assert_eq!(portals[0].neighbour_ref, b);
        assert_eq!(segments.iter().filter(|s| s.is_wall()).count(), 4);

        // The portal spans the upper half of the east edge
        let portal = portals[0];
        for p in [portal.start, portal.end] {
            assert!((p[0] - 10.0).abs() < 1e-5);
            assert!(p[2] > 4.9);
        }

        // Without portals the east edge still reports its uncovered part
        let walls = query.get_poly_wall_segments(a, false, &filter)?;
        assert_eq!(walls.len(), 4);
        Ok(())
    }

    #[test]
    fn test_distance_to_wall() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let wall = query.find_distance_to_wall(r4, &[1.2, 0.0, 1.5], 5.0, &filter)?;
        assert!((wall.distance - 1.2).abs() < 1e-5);
        assert_near(&wall.hit_pos, &[0.0, 0.0, 1.5], 1e-5);
        assert_near(&wall.hit_normal, &[1.0, 0.0, 0.0], 1e-5);
        Ok(())
    }

    #[test]
    fn test_distance_to_wall_beyond_radius() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let wall = query.find_distance_to_wall(r4, &[1.2, 0.0, 1.5], 0.5, &filter)?;
        assert_eq!(wall.distance, 0.5);
        assert_eq!(wall.hit_normal, [0.0; 3]);

        let err = query.find_distance_to_wall(r4, &[1.2, 0.0, 1.5], -1.0, &filter);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }

    #[test]
    fn test_distance_to_wall_across_tiles() -> Result<()> {
        let mesh = create_two_tile_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let a = poly_ref_at(&mesh, 0, 0, 0);

        // The shared tile border is not a wall; the closest one is z = 0
        let wall = query.find_distance_to_wall(a, &[9.5, 0.0, 4.0], 20.0, &filter)?;
        assert!((wall.distance - 4.0).abs() < 1e-5);
        assert_near(&wall.hit_pos, &[9.5, 0.0, 0.0], 1e-5);
        Ok(())
    }
}

//! Spatial query tests: nearest polygon, box queries and Dijkstra expansions

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::nav_mesh_query::NavMeshQuery;
    use crate::test_mesh_helpers::*;
    use crate::{CollectPolysQuery, DefaultQueryFilter, Error, PolyFlags, PolyRef};
    use nav_common::Result;

    fn grid_refs(mesh: &crate::NavMesh, indices: &[usize]) -> HashSet<PolyRef> {
        indices.iter().map(|&i| poly_ref_at(mesh, 0, 0, i)).collect()
    }

    #[test]
    fn test_find_nearest_poly_above_surface() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();

        let nearest = query.find_nearest_poly(&[1.5, 0.5, 1.5], &[0.5, 1.0, 0.5], &filter)?;
        assert_eq!(nearest.poly_ref, poly_ref_at(&mesh, 0, 0, 4));
        assert_near(&nearest.point, &[1.5, 0.0, 1.5], 1e-5);
        assert!(nearest.over_poly);
        Ok(())
    }

    #[test]
    fn test_find_nearest_poly_outside_surface() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();

        // Beside the grid, the closest point snaps to its border
        let nearest = query.find_nearest_poly(&[3.5, 0.0, 1.5], &[1.0, 1.0, 1.0], &filter)?;
        assert_eq!(nearest.poly_ref, poly_ref_at(&mesh, 0, 0, 5));
        assert_near(&nearest.point, &[3.0, 0.0, 1.5], 1e-5);
        assert!(!nearest.over_poly);

        // Nothing in the box is not an error
        let empty = query.find_nearest_poly(&[5.0, 0.0, 5.0], &[0.5, 1.0, 0.5], &filter)?;
        assert_eq!(empty.poly_ref, PolyRef::NULL);

        let err = query.find_nearest_poly(&[f32::NAN, 0.0, 0.0], &[0.5; 3], &filter);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }

    #[test]
    fn test_query_polygons_box() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();

        let mut collect = CollectPolysQuery::new(16);
        query.query_polygons(&[1.5, 0.0, 1.5], &[0.3, 1.0, 0.3], &filter, &mut collect)?;
        assert_eq!(collect.polys(), &[poly_ref_at(&mesh, 0, 0, 4)]);

        let mut collect = CollectPolysQuery::new(16);
        query.query_polygons(&[1.5, 0.0, 1.5], &[2.0, 1.0, 2.0], &filter, &mut collect)?;
        assert_eq!(collect.num_collected(), 9);
        assert!(!collect.overflow());

        let mut small = CollectPolysQuery::new(4);
        query.query_polygons(&[1.5, 0.0, 1.5], &[2.0, 1.0, 2.0], &filter, &mut small)?;
        assert_eq!(small.num_collected(), 4);
        assert!(small.overflow());
        Ok(())
    }

    #[test]
    fn test_query_polygons_applies_filter() -> Result<()> {
        let mut mesh = create_grid_mesh()?;
        let r4 = poly_ref_at(&mesh, 0, 0, 4);
        mesh.set_poly_flags(r4, PolyFlags::SWIM)?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::new(PolyFlags::WALK, PolyFlags::empty());

        let mut collect = CollectPolysQuery::new(16);
        query.query_polygons(&[1.5, 0.0, 1.5], &[2.0, 1.0, 2.0], &filter, &mut collect)?;
        assert_eq!(collect.num_collected(), 8);
        assert!(!collect.polys().contains(&r4));
        Ok(())
    }

    #[test]
    fn test_closest_point_and_height() -> Result<()> {
        let mesh = create_ramp_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let r = poly_ref_at(&mesh, 0, 0, 0);

        let h = query.get_poly_height(r, &[4.0, 100.0, 5.0])?;
        assert!((h - 2.0).abs() < 1e-4);
        assert!(query.get_poly_height(r, &[12.0, 0.0, 5.0]).is_err());

        let (point, over) = query.closest_point_on_poly(r, &[6.0, 10.0, 5.0])?;
        assert!(over);
        assert_near(&point, &[6.0, 3.0, 5.0], 1e-4);

        let (point, over) = query.closest_point_on_poly(r, &[5.0, 0.0, -3.0])?;
        assert!(!over);
        assert_near(&point, &[5.0, 2.5, 0.0], 1e-4);

        let inside = query.closest_point_on_poly_boundary(r, &[5.0, 9.0, 5.0])?;
        assert_eq!(inside, [5.0, 9.0, 5.0]);
        let outside = query.closest_point_on_poly_boundary(r, &[-2.0, 0.0, 5.0])?;
        assert_near(&outside, &[0.0, 0.0, 5.0], 1e-4);
        Ok(())
    }

    #[test]
    fn test_polys_around_circle_costs() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let result = query.find_polys_around_circle(r4, &[1.5, 0.0, 1.5], 0.6, &filter)?;
        assert!(result.status.is_success());
        assert_eq!(result.refs.len(), result.parents.len());
        assert_eq!(result.refs.len(), result.costs.len());
        assert_eq!(result.refs[0], r4);
        assert_eq!(result.parents[0], PolyRef::NULL);
        assert_eq!(result.costs[0], 0.0);

        let found: HashSet<PolyRef> = result.refs.iter().copied().collect();
        assert_eq!(found, grid_refs(&mesh, &[4, 1, 3, 5, 7]));
        for (i, &cost) in result.costs.iter().enumerate().skip(1) {
            assert!((cost - 0.5).abs() < 1e-5);
            assert_eq!(result.parents[i], r4);
        }
        Ok(())
    }

    #[test]
    fn test_polys_around_circle_dijkstra_path() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r0 = poly_ref_at(&mesh, 0, 0, 0);
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let result = query.find_polys_around_circle(r4, &[1.5, 0.0, 1.5], 1.0, &filter)?;
        assert_eq!(result.refs.len(), 9);
        // Ordered by cost
        assert!(result.costs.windows(2).all(|w| w[0] <= w[1]));

        assert!(query.is_in_closed_list(r0));
        let path = query.get_path_from_dijkstra_search(r0)?;
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], r4);
        assert_eq!(path[2], r0);
        Ok(())
    }

    #[test]
    fn test_polys_around_circle_invalid_input() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let err = query.find_polys_around_circle(r4, &[1.5, 0.0, 1.5], -1.0, &filter);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        let err = query.find_polys_around_circle(PolyRef::NULL, &[1.5, 0.0, 1.5], 1.0, &filter);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }

    #[test]
    fn test_polys_around_shape() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let shape = [
            1.2, 0.0, 1.2, //
            1.2, 0.0, 1.8, //
            2.8, 0.0, 1.8, //
            2.8, 0.0, 1.2,
        ];
        let result = query.find_polys_around_shape(r4, &shape, &filter)?;
        let found: HashSet<PolyRef> = result.refs.iter().copied().collect();
        assert_eq!(found, grid_refs(&mesh, &[4, 5]));

        let err = query.find_polys_around_shape(r4, &shape[..6], &filter);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }

    #[test]
    fn test_local_neighbourhood() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let near = query.find_local_neighbourhood(r4, &[1.5, 0.0, 1.5], 0.6, &filter)?;
        assert_eq!(near.refs.len(), 5);
        assert_eq!(near.refs[0], r4);
        assert_eq!(near.parents[0], PolyRef::NULL);
        assert!(near.parents[1..].iter().all(|&p| p == r4));

        let wide = query.find_local_neighbourhood(r4, &[1.5, 0.0, 1.5], 1.0, &filter)?;
        let found: HashSet<PolyRef> = wide.refs.iter().copied().collect();
        assert_eq!(found.len(), 9);
        Ok(())
    }

    #[test]
    fn test_is_valid_poly_ref_with_filter() -> Result<()> {
        let mut mesh = create_grid_mesh()?;
        let r2 = poly_ref_at(&mesh, 0, 0, 2);
        mesh.set_poly_flags(r2, PolyFlags::DISABLED)?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::new(PolyFlags::WALK, PolyFlags::DISABLED);

        assert!(query.is_valid_poly_ref(poly_ref_at(&mesh, 0, 0, 0), &filter));
        assert!(!query.is_valid_poly_ref(r2, &filter));
        assert!(!query.is_valid_poly_ref(PolyRef::NULL, &filter));
        Ok(())
    }
}

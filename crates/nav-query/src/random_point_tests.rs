//! Random point sampling tests

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::nav_mesh_query::NavMeshQuery;
    use crate::test_mesh_helpers::*;
    use crate::{
        DefaultQueryFilter, Error, NavMesh, NoOpConstraint, PolyFlags, PolyRef, StrictConstraint,
    };
    use nav_common::Result;

    fn inside_cell(p: &[f32; 3], x0: f32, z0: f32) -> bool {
        let eps = 1e-4;
        p[0] >= x0 - eps && p[0] <= x0 + 1.0 + eps && p[2] >= z0 - eps && p[2] <= z0 + 1.0 + eps
    }

    #[test]
    fn test_random_point_lies_on_chosen_polygon() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let mut rng = seeded_rng();

        for _ in 0..50 {
            let (poly_ref, point) = query.find_random_point(&filter, &mut rng)?;
            let index = (0..9)
                .find(|&i| poly_ref_at(&mesh, 0, 0, i) == poly_ref)
                .expect("known polygon");
            let (x0, z0) = ((index % 3) as f32, (index / 3) as f32);
            assert!(inside_cell(&point, x0, z0), "{point:?} outside polygon {index}");
            assert!(point[1].abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_random_point_with_fixed_source() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();

        // A zero source keeps replacing the reservoir pick, ending on the last polygon
        let (poly_ref, point) = query.find_random_point_with(&filter, || 0.0)?;
        assert_eq!(poly_ref, poly_ref_at(&mesh, 0, 0, 8));
        assert!(inside_cell(&point, 2.0, 2.0));
        Ok(())
    }

    #[test]
    fn test_random_point_nothing_to_pick() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let query = NavMeshQuery::new(&mesh);
        let swim_only = DefaultQueryFilter::new(PolyFlags::SWIM, PolyFlags::empty());
        let err = query.find_random_point(&swim_only, &mut seeded_rng());
        assert!(matches!(err, Err(Error::Failure(_))));

        let empty = NavMesh::new(grid_params(1))?;
        let query = NavMeshQuery::new(&empty);
        let err = query.find_random_point(&DefaultQueryFilter::default(), &mut seeded_rng());
        assert!(matches!(err, Err(Error::Failure(_))));
        Ok(())
    }

    #[test]
    fn test_random_point_never_on_connection() -> Result<()> {
        let mesh = create_off_mesh_mesh(true)?;
        let con = poly_ref_at(&mesh, 0, 0, 2);
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let mut rng = seeded_rng();

        for _ in 0..30 {
            let (poly_ref, _) = query.find_random_point(&filter, &mut rng)?;
            assert_ne!(poly_ref, con);
        }

        let start = poly_ref_at(&mesh, 0, 0, 0);
        for _ in 0..30 {
            let (poly_ref, _) = query.find_random_point_around_circle(
                start,
                &[0.5, 0.0, 0.5],
                5.0,
                &filter,
                &NoOpConstraint,
                &mut rng,
            )?;
            assert_ne!(poly_ref, con);
        }
        Ok(())
    }

    #[test]
    fn test_random_point_around_circle_stays_reachable() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);
        let allowed: HashSet<PolyRef> = [4, 1, 3, 5, 7]
            .iter()
            .map(|&i| poly_ref_at(&mesh, 0, 0, i))
            .collect();
        let mut rng = seeded_rng();

        for _ in 0..50 {
            let (poly_ref, _) = query.find_random_point_around_circle(
                r4,
                &[1.5, 0.0, 1.5],
                0.6,
                &filter,
                &NoOpConstraint,
                &mut rng,
            )?;
            assert!(allowed.contains(&poly_ref));
        }
        Ok(())
    }

    #[test]
    fn test_random_point_around_circle_strict() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let filter = DefaultQueryFilter::default();
        let r4 = poly_ref_at(&mesh, 0, 0, 4);
        let center = [1.5, 0.0, 1.5];
        let radius = 0.6;
        let mut rng = seeded_rng();

        for _ in 0..50 {
            let (_, point) = query.find_random_point_around_circle(
                r4,
                &center,
                radius,
                &filter,
                &StrictConstraint,
                &mut rng,
            )?;
            let dx = point[0] - center[0];
            let dz = point[2] - center[2];
            assert!((dx * dx + dz * dz).sqrt() <= radius + 1e-3, "{point:?}");
        }
        Ok(())
    }

    #[test]
    fn test_random_point_around_circle_invalid_input() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut query = NavMeshQuery::new(&mesh);
        let r4 = poly_ref_at(&mesh, 0, 0, 4);

        let err = query.find_random_point_around_circle(
            r4,
            &[1.5, 0.0, 1.5],
            -1.0,
            &DefaultQueryFilter::default(),
            &NoOpConstraint,
            &mut seeded_rng(),
        );
        assert!(matches!(err, Err(Error::InvalidParam(_))));

        let swim_only = DefaultQueryFilter::new(PolyFlags::SWIM, PolyFlags::empty());
        let err = query.find_random_point_around_circle(
            r4,
            &[1.5, 0.0, 1.5],
            1.0,
            &swim_only,
            &NoOpConstraint,
            &mut seeded_rng(),
        );
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }
}

//! Sliced path search tests, including meshes edited between updates

#[cfg(test)]
mod tests {
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::test_mesh_helpers::*;
    use crate::{
        DefaultQueryFilter, DefaultQueryHeuristic, Error, FindPathOptions, NavMesh, PolyRef,
        SlicedFindPath, SlicedPathState, Status,
    };
    use nav_common::Result;

    fn remove_tile_at(mesh: &mut NavMesh, tx: i32) -> Result<()> {
        let tile_ref = mesh
            .get_tile_at(tx, 0, 0)
            .map(|tile| mesh.get_tile_ref(tile))
            .unwrap_or(PolyRef::NULL);
        mesh.remove_tile(tile_ref)?;
        Ok(())
    }

    #[test]
    fn test_sliced_matches_find_path() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let filter = DefaultQueryFilter::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 0, 0, 8);
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [2.5, 0.0, 2.5];

        let mut query = NavMeshQuery::new(&mesh);
        let expected = query.find_path(start, end, &start_pos, &end_pos, &filter)?;

        let mut sliced = SlicedFindPath::new(256);
        let status = sliced.init(&mesh, start, end, &start_pos, &end_pos, &filter)?;
        assert!(status.is_in_progress());
        assert!(sliced.is_in_progress());

        let mut total = 0;
        while sliced.is_in_progress() {
            let (done, status) = sliced.update(&mesh, 1);
            assert!(done <= 1);
            total += done;
            assert!(!status.is_failure());
        }
        assert!(total > 0);
        assert_eq!(sliced.state(), SlicedPathState::Success);

        let result = sliced.finalize()?;
        assert_eq!(result.path, expected.path);
        assert!(!result.status.is_partial());
        assert_eq!(sliced.state(), SlicedPathState::Idle);
        Ok(())
    }

    #[test]
    fn test_sliced_any_angle() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let filter = DefaultQueryFilter::default();
        let heuristic = DefaultQueryHeuristic::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 0, 0, 8);

        let mut sliced = SlicedFindPath::default();
        sliced.init_with_options(
            &mesh,
            start,
            end,
            &[0.5, 0.0, 0.5],
            &[2.5, 0.0, 2.5],
            &filter,
            Some(&heuristic),
            FindPathOptions::ANY_ANGLE,
            f32::MAX,
        )?;
        let (_, status) = sliced.update(&mesh, 100);
        assert!(status.is_success());

        let result = sliced.finalize()?;
        assert_eq!(result.path.first(), Some(&start));
        assert_eq!(result.path.last(), Some(&end));
        Ok(())
    }

    #[test]
    fn test_sliced_unreachable_goal() -> Result<()> {
        let mesh = create_islands_mesh()?;
        let filter = DefaultQueryFilter::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 0, 0, 1);

        let mut sliced = SlicedFindPath::new(64);
        sliced.init(&mesh, start, end, &[0.5, 0.0, 0.5], &[3.5, 0.0, 0.5], &filter)?;
        let (_, status) = sliced.update(&mesh, 10);
        assert_eq!(sliced.state(), SlicedPathState::PartialPath);
        assert!(status.is_success());
        assert!(status.is_partial());

        let result = sliced.finalize()?;
        assert_eq!(result.path, vec![start]);
        assert!(result.status.is_partial());
        Ok(())
    }

    #[test]
    fn test_sliced_end_tile_removed() -> Result<()> {
        let mut mesh = create_tile_row_mesh(3)?;
        let filter = DefaultQueryFilter::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 2, 0, 0);

        let mut sliced = SlicedFindPath::new(64);
        sliced.init(&mesh, start, end, &[5.0, 0.0, 5.0], &[25.0, 0.0, 5.0], &filter)?;
        sliced.update(&mesh, 1);
        assert!(sliced.is_in_progress());

        remove_tile_at(&mut mesh, 2)?;
        let (done, status) = sliced.update(&mesh, 10);
        assert_eq!(done, 0);
        assert!(status.is_failure());
        assert_eq!(sliced.state(), SlicedPathState::Failed);
        assert!(sliced.finalize().is_err());
        Ok(())
    }

    #[test]
    fn test_sliced_middle_tile_removed() -> Result<()> {
        let mut mesh = create_tile_row_mesh(3)?;
        let filter = DefaultQueryFilter::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 2, 0, 0);

        let mut sliced = SlicedFindPath::new(64);
        sliced.init(&mesh, start, end, &[5.0, 0.0, 5.0], &[25.0, 0.0, 5.0], &filter)?;
        sliced.update(&mesh, 1);

        // The open node now points at a polygon that no longer exists
        remove_tile_at(&mut mesh, 1)?;
        let (_, status) = sliced.update(&mesh, 10);
        assert!(status.is_failure());
        assert_eq!(sliced.state(), SlicedPathState::Failed);
        Ok(())
    }

    #[test]
    fn test_sliced_finalize_partial() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let filter = DefaultQueryFilter::default();
        let start = poly_ref_at(&mesh, 0, 0, 0);
        let end = poly_ref_at(&mesh, 0, 0, 8);
        let r1 = poly_ref_at(&mesh, 0, 0, 1);

        let mut sliced = SlicedFindPath::new(64);
        sliced.init(&mesh, start, end, &[0.5, 0.0, 0.5], &[2.5, 0.0, 2.5], &filter)?;
        sliced.update(&mesh, 2);
        let result = sliced.finalize_partial(&[start, r1])?;
        assert_eq!(result.path, vec![start, r1]);
        assert!(result.status.is_success());
        assert!(!result.status.is_partial());

        // Nothing from the existing corridor was visited
        sliced.init(&mesh, start, end, &[0.5, 0.0, 0.5], &[2.5, 0.0, 2.5], &filter)?;
        sliced.update(&mesh, 1);
        let result = sliced.finalize_partial(&[end])?;
        assert!(result.status.is_partial());
        assert_eq!(result.path.first(), Some(&start));

        // An empty corridor is rejected without ending the search
        sliced.init(&mesh, start, end, &[0.5, 0.0, 0.5], &[2.5, 0.0, 2.5], &filter)?;
        assert!(matches!(sliced.finalize_partial(&[]), Err(Error::InvalidParam(_))));
        assert!(sliced.is_in_progress());
        let result = sliced.finalize_partial(&[start])?;
        assert_eq!(result.path, vec![start]);
        assert_eq!(sliced.state(), SlicedPathState::Idle);
        Ok(())
    }

    #[test]
    fn test_sliced_update_when_not_running() -> Result<()> {
        let mesh = create_grid_mesh()?;
        let mut sliced = SlicedFindPath::new(16);
        let (done, status) = sliced.update(&mesh, 10);
        assert_eq!(done, 0);
        assert_eq!(status, Status::default());
        Ok(())
    }
}

//! Incremental path search
//!
//! A [`SlicedFindPath`] session runs the same A* search as
//! [`NavMeshQuery::find_path`](super::NavMeshQuery::find_path) but spreads it
//! over several [`update`](SlicedFindPath::update) calls. The session owns its
//! node pool, so it does not tie up a query object between frames. The mesh is
//! passed to every call and may change in between; polygons that vanish make
//! the session fail instead of producing a stale path.

use std::fmt;

use nav_common::{Error, Result};

use super::nav_mesh_query::{
    get_path_to_node, raycast_limit_sqr, validate_path_request, PathResult, PathSearch,
    SearchProgress, SearchStep,
};
use super::{
    DefaultQueryHeuristic, FindPathOptions, NavMesh, NodePool, NodeQueue, PolyRef, QueryFilter,
    QueryHeuristic, Status, DEFAULT_MAX_NODES,
};

static DEFAULT_HEURISTIC: DefaultQueryHeuristic = DefaultQueryHeuristic {
    scale: DefaultQueryHeuristic::H_SCALE,
};

/// State of a sliced search session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlicedPathState {
    /// No search has been started, or the last one was finalized
    #[default]
    Idle,
    /// Search is in progress
    InProgress,
    /// The goal polygon was reached
    Success,
    /// The search failed and must be restarted
    Failed,
    /// The open list ran dry before reaching the goal
    PartialPath,
}

/// Caller-owned state of an incremental path search
pub struct SlicedFindPath<'f> {
    node_pool: NodePool,
    open_list: NodeQueue,
    state: SlicedPathState,
    status: Status,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: [f32; 3],
    end_pos: [f32; 3],
    filter: Option<&'f dyn QueryFilter>,
    heuristic: Option<&'f dyn QueryHeuristic>,
    options: FindPathOptions,
    raycast_limit_sqr: f32,
    progress: Option<SearchProgress>,
}

impl fmt::Debug for SlicedFindPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlicedFindPath")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("start_ref", &self.start_ref)
            .field("end_ref", &self.end_ref)
            .field("options", &self.options)
            .field("nodes", &self.node_pool.node_count())
            .finish()
    }
}

impl Default for SlicedFindPath<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl<'f> SlicedFindPath<'f> {
    /// Creates an idle session that visits at most `max_nodes` polygons per search
    pub fn new(max_nodes: usize) -> Self {
        Self {
            node_pool: NodePool::new(max_nodes),
            open_list: NodeQueue::new(max_nodes),
            state: SlicedPathState::Idle,
            status: Status::default(),
            start_ref: PolyRef::NULL,
            end_ref: PolyRef::NULL,
            start_pos: [0.0; 3],
            end_pos: [0.0; 3],
            filter: None,
            heuristic: None,
            options: FindPathOptions::empty(),
            raycast_limit_sqr: 0.0,
            progress: None,
        }
    }

    pub fn state(&self) -> SlicedPathState {
        self.state
    }

    /// Status of the last call
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == SlicedPathState::InProgress
    }

    /// Starts a search with the default heuristic and no options
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &mut self,
        nav_mesh: &NavMesh,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &'f dyn QueryFilter,
    ) -> Result<Status> {
        self.init_with_options(
            nav_mesh,
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            filter,
            None,
            FindPathOptions::empty(),
            0.0,
        )
    }

    /// Starts a search, discarding any previous one.
    ///
    /// Returns in-progress, or success straight away when start and end are
    /// the same polygon.
    #[allow(clippy::too_many_arguments)]
    pub fn init_with_options(
        &mut self,
        nav_mesh: &NavMesh,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &'f dyn QueryFilter,
        heuristic: Option<&'f dyn QueryHeuristic>,
        options: FindPathOptions,
        raycast_limit: f32,
    ) -> Result<Status> {
        self.reset();
        self.start_ref = start_ref;
        self.end_ref = end_ref;
        self.start_pos = *start_pos;
        self.end_pos = *end_pos;
        self.filter = Some(filter);
        self.heuristic = heuristic;
        self.options = options;

        let limit = validate_path_request(nav_mesh, start_ref, end_ref, start_pos, end_pos)
            .and_then(|_| raycast_limit_sqr(nav_mesh, start_ref, options, raycast_limit));
        self.raycast_limit_sqr = match limit {
            Ok(limit) => limit,
            Err(err) => {
                self.state = SlicedPathState::Failed;
                self.status = Status::failure().with_detail(Status::INVALID_PARAM);
                return Err(err);
            }
        };

        if start_ref == end_ref {
            self.state = SlicedPathState::Success;
            self.status = Status::success();
            return Ok(self.status);
        }

        let search = self.search(nav_mesh, filter);
        match search.seed(
            &mut self.node_pool,
            &mut self.open_list,
            start_ref,
            start_pos,
        ) {
            Ok(progress) => {
                self.progress = Some(progress);
                self.state = SlicedPathState::InProgress;
                self.status = Status::in_progress();
                Ok(self.status)
            }
            Err(err) => {
                self.fail();
                Err(err)
            }
        }
    }

    /// Runs up to `max_iter` expansions and returns how many were done along
    /// with the session status.
    ///
    /// Fails the session when the start or end polygon, or one the expansion
    /// depends on, no longer resolves in `nav_mesh`.
    pub fn update(&mut self, nav_mesh: &NavMesh, max_iter: usize) -> (usize, Status) {
        if self.state != SlicedPathState::InProgress {
            return (0, self.status);
        }
        let (Some(filter), Some(mut progress)) = (self.filter, self.progress) else {
            self.fail();
            return (0, self.status);
        };

        if !nav_mesh.is_valid_poly_ref(self.start_ref) || !nav_mesh.is_valid_poly_ref(self.end_ref)
        {
            log::debug!(
                "sliced search {} -> {} lost its start or end polygon",
                self.start_ref,
                self.end_ref
            );
            self.fail();
            return (0, self.status);
        }

        let search = self.search(nav_mesh, filter);
        let mut iter = 0;
        while iter < max_iter && !self.open_list.is_empty() {
            iter += 1;
            match search.step(&mut self.node_pool, &mut self.open_list, &mut progress) {
                Ok(SearchStep::Continue) => {}
                Ok(SearchStep::ReachedGoal) => {
                    self.progress = Some(progress);
                    self.state = SlicedPathState::Success;
                    self.status = Status::success();
                    return (iter, self.status);
                }
                Ok(SearchStep::Exhausted) => break,
                Err(err) => {
                    log::debug!("sliced search failed: {err}");
                    self.progress = Some(progress);
                    self.fail();
                    return (iter, self.status);
                }
            }
        }
        self.progress = Some(progress);

        if self.open_list.is_empty() {
            self.state = SlicedPathState::PartialPath;
            self.status = Status::success().with_detail(Status::PARTIAL_RESULT);
        }
        (iter, self.status)
    }

    /// Builds the path found so far and returns the session to idle.
    ///
    /// A search still in progress yields a partial path to the best polygon
    /// reached.
    pub fn finalize(&mut self) -> Result<PathResult> {
        let result = match self.state {
            SlicedPathState::Idle => Err(Error::failure("no search to finalize")),
            SlicedPathState::Failed => Err(Error::failure("sliced search failed")),
            _ if self.start_ref == self.end_ref => Ok(PathResult {
                path: vec![self.start_ref],
                status: Status::success(),
            }),
            _ => match self.progress {
                Some(progress) => Ok(PathResult {
                    path: get_path_to_node(&self.node_pool, progress.last_best_node),
                    status: progress.status(&self.node_pool, self.end_ref),
                }),
                None => Err(Error::failure("sliced search was not seeded")),
            },
        };
        self.reset();
        result
    }

    /// Builds a path ending at the furthest polygon of `existing` that the
    /// search visited, and returns the session to idle.
    ///
    /// Falls back to the best polygon reached when none of `existing` was
    /// visited; the result is then marked partial. An empty `existing` is
    /// rejected and leaves the session untouched.
    pub fn finalize_partial(&mut self, existing: &[PolyRef]) -> Result<PathResult> {
        if existing.is_empty() {
            return Err(Error::invalid_param("existing path is empty"));
        }

        let result = match self.state {
            SlicedPathState::Idle => Err(Error::failure("no search to finalize")),
            SlicedPathState::Failed => Err(Error::failure("sliced search failed")),
            _ if self.start_ref == self.end_ref => Ok(PathResult {
                path: vec![self.start_ref],
                status: Status::success(),
            }),
            _ => match self.progress {
                Some(progress) => {
                    let mut status = Status::success();
                    if progress.out_of_nodes {
                        status = status.with_detail(Status::OUT_OF_NODES);
                    }
                    if self.state == SlicedPathState::PartialPath {
                        status = status.with_detail(Status::PARTIAL_RESULT);
                    }
                    let node = existing
                        .iter()
                        .rev()
                        .find_map(|&r| self.node_pool.find_node(r, 0));
                    let node = match node {
                        Some(node) => node,
                        None => {
                            status = status.with_detail(Status::PARTIAL_RESULT);
                            progress.last_best_node
                        }
                    };
                    Ok(PathResult {
                        path: get_path_to_node(&self.node_pool, node),
                        status,
                    })
                }
                None => Err(Error::failure("sliced search was not seeded")),
            },
        };
        self.reset();
        result
    }

    fn search<'s>(&self, nav_mesh: &'s NavMesh, filter: &'s dyn QueryFilter) -> PathSearch<'s>
    where
        'f: 's,
    {
        PathSearch {
            nav_mesh,
            end_ref: self.end_ref,
            end_pos: self.end_pos,
            filter,
            heuristic: self.heuristic.unwrap_or(&DEFAULT_HEURISTIC),
            options: self.options,
            raycast_limit_sqr: self.raycast_limit_sqr,
        }
    }

    fn fail(&mut self) {
        self.state = SlicedPathState::Failed;
        self.status = Status::failure();
    }

    fn reset(&mut self) {
        self.state = SlicedPathState::Idle;
        self.status = Status::default();
        self.progress = None;
        self.filter = None;
        self.heuristic = None;
        self.options = FindPathOptions::empty();
        self.raycast_limit_sqr = 0.0;
    }
}

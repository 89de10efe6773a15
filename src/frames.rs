//! Transform tree between named coordinate frames.
//!
//! Each frame has at most one parent; an edge stores the child's pose in the
//! parent frame at the stamp it was recorded. Transforms between two frames
//! compose along the tree through their common root. Edges written without a
//! stamp are static (configured fixtures) and are available at any time.
//!
//! This is the only module that knows how frames relate; everything else
//! asks it to move poses and vectors around. The async [`Frames::wait`] is a
//! 10 Hz poll that yields to the runtime, so the setpoint stream keeps
//! flowing while a command handler waits for a transform to appear.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use nalgebra::{Isometry3, Point3, Translation3, Vector3};
use tokio::time::{sleep, Instant};

use crate::error::TransformError;
use crate::types::{Pose, Stamped};

const WAIT_POLL: Duration = Duration::from_millis(100);

/// Longest parent chain the tree will follow. Real frame graphs here are a
/// handful of levels deep; hitting this means a cycle was inserted.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
struct Edge {
    parent: String,
    iso: Isometry3<f64>,
    /// `None` marks a static edge.
    stamp: Option<Instant>,
}

/// Pure transform tree; see [`Frames`] for the shared, awaitable wrapper.
#[derive(Debug, Default)]
pub struct TransformTree {
    /// child frame -> edge to its parent
    edges: HashMap<String, Edge>,
}

impl TransformTree {
    /// Record `child`'s pose in `parent` at `stamp`, replacing any previous
    /// edge for `child`.
    pub fn insert(&mut self, parent: &str, child: &str, stamp: Instant, iso: Isometry3<f64>) {
        self.edges.insert(
            child.to_string(),
            Edge {
                parent: parent.to_string(),
                iso,
                stamp: Some(stamp),
            },
        );
    }

    /// Record a static edge, available at any stamp.
    pub fn insert_static(&mut self, parent: &str, child: &str, iso: Isometry3<f64>) {
        self.edges.insert(
            child.to_string(),
            Edge {
                parent: parent.to_string(),
                iso,
                stamp: None,
            },
        );
    }

    /// Walk to the root, composing the frame's pose in root coordinates.
    /// Fails with the name of the frame whose edge is too old.
    fn chain_to_root(
        &self,
        frame: &str,
        stamp: Instant,
        tolerance: Duration,
    ) -> Result<(String, Isometry3<f64>), TransformError> {
        let mut current = frame.to_string();
        let mut iso = Isometry3::identity();
        for _ in 0..MAX_DEPTH {
            let Some(edge) = self.edges.get(&current) else {
                return Ok((current, iso));
            };
            if let Some(edge_stamp) = edge.stamp {
                if stamp.saturating_duration_since(edge_stamp) > tolerance {
                    return Err(TransformError::TooOld {
                        from: current,
                        to: edge.parent.clone(),
                    });
                }
            }
            iso = edge.iso * iso;
            current = edge.parent.clone();
        }
        // only reachable through a cycle of inserts
        Err(TransformError::NoPath {
            from: frame.to_string(),
            to: current,
        })
    }

    /// Transform taking coordinates in `source` to coordinates in `target`,
    /// valid at `stamp` within `tolerance`.
    pub fn lookup(
        &self,
        target: &str,
        source: &str,
        stamp: Instant,
        tolerance: Duration,
    ) -> Result<Isometry3<f64>, TransformError> {
        if target == source {
            return Ok(Isometry3::identity());
        }
        let no_path = || TransformError::NoPath {
            from: source.to_string(),
            to: target.to_string(),
        };
        let (source_root, root_from_source) = self
            .chain_to_root(source, stamp, tolerance)
            .map_err(|e| match e {
                TransformError::NoPath { .. } => no_path(),
                stale => stale,
            })?;
        let (target_root, root_from_target) = self
            .chain_to_root(target, stamp, tolerance)
            .map_err(|e| match e {
                TransformError::NoPath { .. } => no_path(),
                stale => stale,
            })?;
        if source_root != target_root {
            return Err(no_path());
        }
        Ok(root_from_target.inverse() * root_from_source)
    }

    pub fn can_transform(&self, target: &str, source: &str, stamp: Instant) -> bool {
        self.lookup(target, source, stamp, Duration::ZERO).is_ok()
    }
}

/// Shared transform tree plus the polling wait.
#[derive(Debug, Default)]
pub struct Frames {
    tree: RwLock<TransformTree>,
}

impl Frames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, parent: &str, child: &str, stamp: Instant, iso: Isometry3<f64>) {
        self.tree.write().unwrap().insert(parent, child, stamp, iso);
    }

    pub fn insert_static(&self, parent: &str, child: &str, iso: Isometry3<f64>) {
        self.tree.write().unwrap().insert_static(parent, child, iso);
    }

    pub fn can_transform(&self, target: &str, source: &str, stamp: Instant) -> bool {
        self.tree.read().unwrap().can_transform(target, source, stamp)
    }

    pub fn lookup(
        &self,
        target: &str,
        source: &str,
        stamp: Instant,
        tolerance: Duration,
    ) -> Result<Isometry3<f64>, TransformError> {
        self.tree.read().unwrap().lookup(target, source, stamp, tolerance)
    }

    /// Poll at 10 Hz until the transform is available at `stamp` or
    /// `timeout` elapses. Never blocks the runtime.
    pub async fn wait(&self, target: &str, source: &str, stamp: Instant, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.can_transform(target, source, stamp) {
                return true;
            }
            if Instant::now().saturating_duration_since(start) > timeout {
                return false;
            }
            sleep(WAIT_POLL).await;
        }
    }

    /// Re-express a pose in `target`, keeping its stamp.
    pub fn transform_pose(
        &self,
        pose: &Stamped<Pose>,
        target: &str,
        tolerance: Duration,
    ) -> Result<Stamped<Pose>, TransformError> {
        let iso = self.lookup(target, &pose.frame_id, pose.stamp, tolerance)?;
        let position = iso.transform_point(&Point3::from(pose.value.position)).coords;
        Ok(Stamped::new(
            target,
            pose.stamp,
            Pose::new(position, iso.rotation * pose.value.orientation),
        ))
    }

    /// Re-express a free vector in `target`; vectors rotate but do not
    /// translate.
    pub fn transform_vector(
        &self,
        vector: &Stamped<Vector3<f64>>,
        target: &str,
        tolerance: Duration,
    ) -> Result<Stamped<Vector3<f64>>, TransformError> {
        let iso = self.lookup(target, &vector.frame_id, vector.stamp, tolerance)?;
        Ok(Stamped::new(target, vector.stamp, iso.rotation * vector.value))
    }
}

/// Isometry placing `pose` (position + orientation) in its parent frame.
pub fn pose_to_isometry(pose: &Pose) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::from(pose.position), pose.orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quat_from_rpy;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn translation(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::translation(x, y, z)
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_for_same_frame() {
        let tree = TransformTree::default();
        let iso = tree
            .lookup("map", "map", Instant::now(), Duration::ZERO)
            .unwrap();
        assert_relative_eq!(iso.translation.vector.norm(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_composition() {
        let now = Instant::now();
        let mut tree = TransformTree::default();
        tree.insert("map", "base_link", now, translation(10.0, 0.0, 2.0));
        tree.insert("base_link", "camera", now, translation(0.5, 0.0, -0.1));

        let iso = tree.lookup("map", "camera", now, Duration::ZERO).unwrap();
        let p = iso * nalgebra::Point3::origin();
        assert_relative_eq!(p.x, 10.5, epsilon = 1e-12);
        assert_relative_eq!(p.z, 1.9, epsilon = 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inverse_direction() {
        let now = Instant::now();
        let mut tree = TransformTree::default();
        tree.insert("map", "base_link", now, translation(3.0, -4.0, 0.0));

        let iso = tree.lookup("base_link", "map", now, Duration::ZERO).unwrap();
        let p = iso * nalgebra::Point3::new(3.0, -4.0, 0.0);
        assert_relative_eq!(p.coords.norm(), 0.0, epsilon = 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_applies_to_vectors() {
        let now = Instant::now();
        let frames = Frames::new();
        let iso = Isometry3::from_parts(
            Translation3::new(100.0, 0.0, 0.0),
            quat_from_rpy(0.0, 0.0, FRAC_PI_2),
        );
        frames.insert("map", "body", now, iso);

        // unit x in body maps to unit y in map; translation must not leak in
        let v = Stamped::new("body", now, Vector3::new(1.0, 0.0, 0.0));
        let out = frames.transform_vector(&v, "map", Duration::ZERO).unwrap();
        assert_relative_eq!(out.value.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(out.value.y, 1.0, epsilon = 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_frames_err() {
        let now = Instant::now();
        let mut tree = TransformTree::default();
        tree.insert("map", "base_link", now, translation(1.0, 0.0, 0.0));

        let err = tree
            .lookup("map", "island", now, Duration::ZERO)
            .unwrap_err();
        match err {
            TransformError::NoPath { from, to } => {
                assert_eq!(from, "island");
                assert_eq!(to, "map");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_edge_rejected_within_tolerance_ok() {
        let start = Instant::now();
        let mut tree = TransformTree::default();
        tree.insert("map", "base_link", start, translation(1.0, 0.0, 0.0));

        let later = start + Duration::from_millis(40);
        assert!(tree
            .lookup("map", "base_link", later, Duration::from_millis(50))
            .is_ok());
        let much_later = start + Duration::from_millis(200);
        assert!(matches!(
            tree.lookup("map", "base_link", much_later, Duration::from_millis(50)),
            Err(TransformError::TooOld { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_edge_always_available() {
        let mut tree = TransformTree::default();
        tree.insert_static("map", "launchpad", translation(5.0, 5.0, 0.0));

        let far_future = Instant::now() + Duration::from_secs(3600);
        assert!(tree.can_transform("map", "launchpad", far_future));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let frames = Frames::new();
        let ok = frames
            .wait("map", "nowhere", Instant::now(), Duration::from_millis(300))
            .await;
        assert!(!ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_late_insert() {
        let frames = std::sync::Arc::new(Frames::new());
        let stamp = Instant::now();

        let writer = frames.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            writer.insert(
                "map",
                "base_link",
                Instant::now(),
                Isometry3::identity(),
            );
        });

        let ok = frames
            .wait("map", "base_link", stamp, Duration::from_secs(1))
            .await;
        assert!(ok);
    }
}

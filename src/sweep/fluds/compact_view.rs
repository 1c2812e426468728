//! Compact cell views: the description of outgoing faces a rank sends to a
//! downstream rank during negotiation.
//!
//! Stream layout (one `i64` per element):
//!
//! ```text
//! [num_face_dofs, num_cells,
//!  -(cell_global_id + 1), face_slot, vertex_id, vertex_id, ...,   // face
//!  -(cell_global_id + 1), face_slot, vertex_id, ...,              // next face
//!  ...]
//! ```
//!
//! The negative marker opens every face and is repeated for each face of the
//! same cell; a change of marker value starts a new cell. Vertex ids and
//! slots are non-negative, so markers are unambiguous.

use crate::sweep_error::SweepError;
use crate::topology::GlobalCellId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactFaceView {
    /// Dof offset of the face in the sender's outgoing buffer.
    pub slot: usize,
    pub vertex_ids: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactCellView {
    pub global_id: GlobalCellId,
    pub faces: Vec<CompactFaceView>,
}

impl CompactCellView {
    /// Face whose vertex set equals `vertex_ids`.
    pub fn find_face(&self, vertex_ids: &[u64]) -> Option<&CompactFaceView> {
        self.faces.iter().find(|f| {
            f.vertex_ids.len() == vertex_ids.len()
                && vertex_ids.iter().all(|v| f.vertex_ids.contains(v))
        })
    }
}

fn malformed(msg: impl Into<String>) -> SweepError {
    SweepError::MalformedCellViews(msg.into())
}

fn non_negative(value: u64, what: &str) -> Result<i64, SweepError> {
    i64::try_from(value).map_err(|_| malformed(format!("{what} {value} does not fit the stream")))
}

fn marker(global_id: GlobalCellId) -> Result<i64, SweepError> {
    Ok(-non_negative(global_id, "cell id")? - 1)
}

/// Flatten `views` into the compact stream. Ids and slots must fit an
/// `i64`.
pub fn serialize_cell_views(
    views: &[CompactCellView],
    num_face_dofs: usize,
) -> Result<Vec<i64>, SweepError> {
    let mut out = vec![
        non_negative(num_face_dofs as u64, "face dof count")?,
        non_negative(views.len() as u64, "cell count")?,
    ];
    for view in views {
        let m = marker(view.global_id)?;
        for face in &view.faces {
            out.push(m);
            out.push(non_negative(face.slot as u64, "face slot")?);
            for &v in &face.vertex_ids {
                out.push(non_negative(v, "vertex id")?);
            }
        }
    }
    Ok(out)
}

/// Parse a compact stream; returns `(num_face_dofs, views)`.
pub fn deserialize_cell_views(raw: &[i64]) -> Result<(usize, Vec<CompactCellView>), SweepError> {
    let [num_face_dofs, num_cells, body @ ..] = raw else {
        return Err(malformed(format!("stream of {} elements has no header", raw.len())));
    };
    if *num_face_dofs < 0 || *num_cells < 0 {
        return Err(malformed("negative header field"));
    }

    // every cell takes at least two elements
    let capacity = (*num_cells as usize).min(body.len() / 2);
    let mut views: Vec<CompactCellView> = Vec::with_capacity(capacity);
    let mut last_marker = None;
    let mut i = 0usize;
    while i < body.len() {
        let m = body[i];
        if m >= 0 {
            return Err(malformed(format!("expected a cell marker at element {}", i + 2)));
        }
        let slot = *body
            .get(i + 1)
            .ok_or_else(|| malformed("face marker without a slot"))?;
        if slot < 0 {
            return Err(malformed(format!("negative face slot at element {}", i + 3)));
        }
        let end = body[i + 2..]
            .iter()
            .position(|&v| v < 0)
            .map_or(body.len(), |p| i + 2 + p);
        let face = CompactFaceView {
            slot: slot as usize,
            vertex_ids: body[i + 2..end].iter().map(|&v| v as u64).collect(),
        };
        if last_marker != Some(m) {
            views.push(CompactCellView {
                global_id: (-(m + 1)) as u64,
                faces: Vec::new(),
            });
            last_marker = Some(m);
        }
        if let Some(view) = views.last_mut() {
            view.faces.push(face);
        }
        i = end;
    }

    if views.len() != *num_cells as usize {
        return Err(malformed(format!(
            "header announces {num_cells} cells, stream holds {}",
            views.len()
        )));
    }
    Ok((*num_face_dofs as usize, views))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(gid: u64, faces: &[(usize, &[u64])]) -> CompactCellView {
        CompactCellView {
            global_id: gid,
            faces: faces
                .iter()
                .map(|(slot, v)| CompactFaceView {
                    slot: *slot,
                    vertex_ids: v.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn layout_repeats_marker_per_face() {
        let v = vec![view(0, &[(0, &[3, 4]), (2, &[4, 5])])];
        assert_eq!(
            serialize_cell_views(&v, 4).unwrap(),
            vec![4, 1, -1, 0, 3, 4, -1, 2, 4, 5]
        );
    }

    #[test]
    fn round_trip_two_cells() {
        let v = vec![view(7, &[(0, &[1, 2, 3])]), view(12, &[(3, &[9]), (4, &[])])];
        let raw = serialize_cell_views(&v, 5).unwrap();
        assert_eq!(deserialize_cell_views(&raw).unwrap(), (5, v));
    }

    #[test]
    fn empty_stream_round_trips() {
        let raw = serialize_cell_views(&[], 0).unwrap();
        assert_eq!(raw, vec![0, 0]);
        assert_eq!(deserialize_cell_views(&raw).unwrap(), (0, vec![]));
    }

    #[test]
    fn malformed_streams_rejected() {
        assert!(deserialize_cell_views(&[3]).is_err());
        assert!(deserialize_cell_views(&[2, 1, 5, 0, 1]).is_err());
        assert!(deserialize_cell_views(&[2, 2, -1, 0, 1, 2]).is_err());
        assert!(deserialize_cell_views(&[2, 1, -1]).is_err());
    }

    #[test]
    fn huge_cell_count_is_an_error() {
        let err = deserialize_cell_views(&[4, i64::MAX, -1, 0, 3]).unwrap_err();
        assert!(matches!(err, SweepError::MalformedCellViews(_)));
        assert!(deserialize_cell_views(&[0, i64::MAX]).is_err());
    }

    #[test]
    fn ids_beyond_i64_are_rejected() {
        let too_big = vec![view(1 << 63, &[(0, &[1])])];
        assert!(matches!(
            serialize_cell_views(&too_big, 1),
            Err(SweepError::MalformedCellViews(_))
        ));
        let largest = vec![view(i64::MAX as u64 - 1, &[(0, &[1])])];
        let raw = serialize_cell_views(&largest, 1).unwrap();
        assert_eq!(raw[2], i64::MIN + 1);
        assert_eq!(deserialize_cell_views(&raw).unwrap().1, largest);

        let wide_vertex = vec![view(0, &[(0, &[u64::MAX])])];
        assert!(serialize_cell_views(&wide_vertex, 1).is_err());
    }

    #[test]
    fn find_face_ignores_vertex_order() {
        let v = view(1, &[(0, &[1, 2]), (2, &[2, 3])]);
        assert_eq!(v.find_face(&[3, 2]).map(|f| f.slot), Some(2));
        assert!(v.find_face(&[1, 3]).is_none());
    }
}

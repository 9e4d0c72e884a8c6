//! Distributed material-cluster analysis.
//!
//! Two reduction tiers: a fork-join pass over contiguous element ranges
//! producing per-worker `LabelValuesMap`s that are merged pairwise, then —
//! when more than one rank is active — a gather-to-root reduction that
//! builds the global map, records which ranks reported each label, and sends
//! every non-root rank the sub-table of only the labels it reported.

use std::collections::BTreeMap;

use crate::cluster::barycenter::LabelValuesMap;
use crate::config::ClusterOptions;
use crate::data::{Association, AttributeArray, AttributeSet, Column, ImageData, Table};
use crate::error::VsError;
use crate::parallel::{pieces_hint, reduce_ranges, Comm, Progress};

/// Elements between progress reports from the designated first worker.
const PROGRESS_STRIDE: usize = 1024;

/// Which ranks reported each label; built only on the reduction root and
/// used to fan sub-tables back out to interested ranks only.
pub type LabelRanksMap = BTreeMap<i64, Vec<usize>>;

/// Result of one analysis run.
#[derive(Clone, Debug)]
pub struct ClusterOutput {
    /// Copy of the input with the per-element "Volume" array and the
    /// per-cluster "Label"/"Volume"/"Center" field data attached.
    pub image: ImageData,
    /// Compact per-cluster table with columns "Volume", "Label".
    pub table: Table,
    /// This rank's final label map: the global map on the root, the
    /// filtered sub-map elsewhere.
    pub map: LabelValuesMap,
    /// Ranks whose gathered payload was malformed and therefore skipped.
    pub dropped_ranks: Vec<usize>,
}

/// The cluster-analysis engine.
pub struct ClusterAnalysis {
    pub options: ClusterOptions,
    progress: Option<Progress>,
}

impl ClusterAnalysis {
    pub fn new(options: ClusterOptions) -> Self {
        ClusterAnalysis { options, progress: None }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Analyze the clusters of the integer label array `array` attached to
    /// `image` with the given association.
    pub fn run<C: Comm>(
        &self,
        comm: &C,
        image: &ImageData,
        array: &str,
        association: Association,
    ) -> Result<ClusterOutput, VsError> {
        let atts = image
            .attributes(association)
            .ok_or(VsError::Unsupported("cluster analysis needs point or cell labels"))?;
        let labels = atts
            .get(array)
            .ok_or_else(|| VsError::MissingArray(array.to_string()))?
            .as_int()
            .ok_or_else(|| VsError::LabelTypeMismatch(array.to_string()))?;
        let n = image.element_count(association);
        if labels.len() != n {
            return Err(VsError::MalformedTable(format!(
                "label array {} has {} tuples, dataset has {} elements",
                array,
                labels.len(),
                n
            )));
        }

        let local = self.local_pass(image, atts, labels, association);
        let (map, dropped_ranks) = reduce_across_ranks(comm, local)?;
        Ok(assemble_output(image, atts, labels, association, map, dropped_ranks))
    }

    /// Fork-join pass over contiguous element ranges; each worker owns a
    /// private map, merged pairwise afterwards.
    fn local_pass(
        &self,
        image: &ImageData,
        atts: &AttributeSet,
        labels: &[i64],
        association: Association,
    ) -> LabelValuesMap {
        let rockfill = self.options.rockfill_label;
        let progress = self.progress.clone();
        let n = labels.len();
        reduce_ranges(
            n,
            pieces_hint(),
            |range| {
                // only the worker holding global index 0 reports progress
                let reporting = range.start == 0;
                let span = range.len();
                let mut map = LabelValuesMap::new();
                for (done, i) in range.enumerate() {
                    if reporting && done % PROGRESS_STRIDE == 0 {
                        if let Some(cb) = &progress {
                            cb(done as f64 / span as f64);
                        }
                    }
                    if atts.is_ghost(i) {
                        continue;
                    }
                    let label = labels[i];
                    if label == rockfill {
                        continue;
                    }
                    let p = match association {
                        Association::Point => image.point_position(i),
                        Association::Cell => image.cell_center(i),
                        Association::Row => continue,
                    };
                    map.fold_point(label, p);
                }
                map
            },
            |a, b| a.merge(b),
        )
        .unwrap_or_default()
    }
}

/// Gather per-rank maps on the root, merge them into the global map while
/// recording which ranks reported each label, and send every other rank the
/// sub-table of its own labels. A rank whose payload fails to unpack is
/// skipped, not fatal.
fn reduce_across_ranks<C: Comm>(
    comm: &C,
    local: LabelValuesMap,
) -> Result<(LabelValuesMap, Vec<usize>), VsError> {
    if comm.size() <= 1 {
        return Ok((local, Vec::new()));
    }
    match comm.gather_varied(&local.to_rows(), 0) {
        Some(per_rank) => {
            let mut global = LabelValuesMap::new();
            let mut ranks: LabelRanksMap = LabelRanksMap::new();
            let mut dropped = Vec::new();
            for (rank, payload) in per_rank.iter().enumerate() {
                match LabelValuesMap::from_rows(payload) {
                    Ok(part) => {
                        for label in part.labels() {
                            ranks.entry(label).or_default().push(rank);
                        }
                        global = global.merge(part);
                    }
                    Err(_) => dropped.push(rank),
                }
            }
            for dest in 1..comm.size() {
                let sub = global
                    .filtered(|label| ranks.get(&label).is_some_and(|r| r.contains(&dest)));
                comm.send(&sub.to_rows(), dest);
            }
            Ok((global, dropped))
        }
        None => {
            let rows = comm.recv(0);
            Ok((LabelValuesMap::from_rows(&rows)?, Vec::new()))
        }
    }
}

fn assemble_output(
    image: &ImageData,
    atts: &AttributeSet,
    labels: &[i64],
    association: Association,
    map: LabelValuesMap,
    dropped_ranks: Vec<usize>,
) -> ClusterOutput {
    let volumes: Vec<i64> = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            if atts.is_ghost(i) {
                0
            } else {
                map.get(label).map(|m| m.weight as i64).unwrap_or(0)
            }
        })
        .collect();

    let label_col: Vec<i64> = map.labels().collect();
    let volume_col: Vec<i64> = map.iter().map(|(_, m)| m.weight as i64).collect();
    let center_col: Vec<[f64; 3]> = map.iter().map(|(_, m)| m.center).collect();

    let mut out = image.clone();
    if let Some(set) = out.attributes_mut(association) {
        set.insert(AttributeArray::int("Volume", 1, volumes));
    }
    out.field_data.set_column("Label", Column::Int(label_col.clone()));
    out.field_data.set_column("Volume", Column::Int(volume_col.clone()));
    out.field_data.set_column("Center", Column::Vec3(center_col));

    let mut table = Table::new();
    table.set_column("Volume", Column::Int(volume_col));
    table.set_column("Label", Column::Int(label_col));

    ClusterOutput { image: out, table, map, dropped_ranks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalComm;
    use approx::assert_abs_diff_eq;

    /// 3×3×1 points, labels on points: left column 1, right column 2,
    /// middle column rockfill.
    fn fixture() -> ImageData {
        let mut img = ImageData::new([3, 3, 1], [0.0; 3], [1.0; 3]);
        img.point_data.insert(AttributeArray::int(
            "MaterialId",
            1,
            vec![1, 0, 2, 1, 0, 2, 1, 0, 2],
        ));
        img
    }

    #[test]
    fn counts_and_barycenters() {
        let comm = LocalComm::solo();
        let engine = ClusterAnalysis::new(ClusterOptions::default());
        let out = engine
            .run(&comm, &fixture(), "MaterialId", Association::Point)
            .unwrap();
        assert_eq!(out.map.len(), 2);
        let left = out.map.get(1).unwrap();
        assert_eq!(left.weight, 3);
        assert_abs_diff_eq!(left.center[0], 0.0);
        assert_abs_diff_eq!(left.center[1], 1.0);
        let right = out.map.get(2).unwrap();
        assert_abs_diff_eq!(right.center[0], 2.0);
        assert!(out.dropped_ranks.is_empty());
    }

    #[test]
    fn rockfill_never_appears() {
        let comm = LocalComm::solo();
        let engine = ClusterAnalysis::new(ClusterOptions::default());
        let out = engine
            .run(&comm, &fixture(), "MaterialId", Association::Point)
            .unwrap();
        assert!(!out.table.int_column("Label").unwrap().contains(&0));
        // rockfill points carry zero volume
        let volumes = out
            .image
            .point_data
            .get("Volume")
            .unwrap()
            .as_int()
            .unwrap()
            .to_vec();
        assert_eq!(volumes, vec![3, 0, 3, 3, 0, 3, 3, 0, 3]);
    }

    #[test]
    fn ghost_points_do_not_contribute() {
        let comm = LocalComm::solo();
        let mut img = fixture();
        img.point_data.ghost = Some(vec![0, 0, 0, 0, 0, 0, 1, 1, 1]);
        let engine = ClusterAnalysis::new(ClusterOptions::default());
        let out = engine
            .run(&comm, &img, "MaterialId", Association::Point)
            .unwrap();
        assert_eq!(out.map.get(1).unwrap().weight, 2);
        assert_abs_diff_eq!(out.map.get(1).unwrap().center[1], 0.5);
    }

    #[test]
    fn table_columns_are_volume_then_label() {
        let comm = LocalComm::solo();
        let engine = ClusterAnalysis::new(ClusterOptions::default());
        let out = engine
            .run(&comm, &fixture(), "MaterialId", Association::Point)
            .unwrap();
        let names: Vec<&str> = out.table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Volume", "Label"]);
        assert_eq!(out.table.int_column("Volume").unwrap(), &[3, 3]);
    }

    #[test]
    fn progress_comes_from_a_single_worker() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let comm = LocalComm::solo();
        let engine = ClusterAnalysis::new(ClusterOptions::default()).with_progress(Arc::new(
            move |fraction: f64| {
                assert!((0.0..=1.0).contains(&fraction));
                seen.fetch_add(1, Ordering::Relaxed);
            },
        ));
        engine
            .run(&comm, &fixture(), "MaterialId", Association::Point)
            .unwrap();
        // the fixture fits one progress stride: exactly the initial report
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_array_is_reported() {
        let comm = LocalComm::solo();
        let engine = ClusterAnalysis::new(ClusterOptions::default());
        let err = engine
            .run(&comm, &fixture(), "NoSuchArray", Association::Point)
            .unwrap_err();
        assert!(matches!(err, VsError::MissingArray(_)));
    }
}

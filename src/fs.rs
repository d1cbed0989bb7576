use crate::newtypes::{NodeId, Position};
use crate::tables::{TableCollection, TablesError};
use crate::trees::{TreeFlags, TreeSequence, TreeSequenceFlags, TreesError};
use indexmap::IndexMap;
use streaming_iterator::StreamingIterator;
use thiserror::Error;

/// Error type related to [``fs``].
#[derive(Error, Debug)]
pub enum FsError {
    /// Returned when the list of sample groups is empty.
    #[error("empty list of sample groups")]
    EmptySamples,
    /// Returned when a sample group has fewer than two nodes.
    #[error("sample groups require at least two nodes")]
    SampleListTooSmall,
    /// Returned when a sample node is null or out of range.
    #[error("invalid sample node")]
    InvalidSampleNode,
    /// Returned when a node occurs more than once in a group.
    #[error("duplicate sample node")]
    DuplicateSampleNode,
    /// Returned when a node occurs in more than one group.
    #[error("sample node present in multiple groups")]
    SampleNodeInMultipleGroups,
    /// Returned when an explicit window list is empty.
    #[error("empty window list")]
    EmptyWindows,
    /// Returned when windows are not sorted by left end.
    #[error("windows must be sorted")]
    UnsortedWindows,
    /// Returned when a window is not a valid sub-interval
    /// of `[0, genome_length]`.
    #[error("invalid window: {found:?}")]
    InvalidWindow {
        /// The invalid `(left, right)`.
        found: (Position, Position),
    },
    /// Returned when windows overlap.
    #[error("windows overlap")]
    OverlappingWindows,
    /// Returned when both neutral and selected mutations
    /// are excluded.
    #[error("excluding neutral and selected variants is invalid")]
    NoVariantsIncluded,
    /// Returned when spectra of different shapes are combined.
    #[error("shape mismatch")]
    ShapeMismatch,
    #[error("{0:?}")]
    TablesError(#[from] TablesError),
    #[error("{0:?}")]
    TreesError(#[from] TreesError),
    /// An error propagated from a [`Simplify`] implementation.
    #[error("{0}")]
    SimplifyError(Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for frequency spectrum operations.
pub type FsResult<T> = Result<T, FsError>;

/// Table simplification, provided by client code.
///
/// Implementations take a table collection and a list of
/// sample nodes and return a new table collection whose
/// genealogy is reduced to the history of those samples,
/// along with a mapping from input node ids to output
/// node ids.  The mapping must be indexable by every
/// input sample id.
pub trait Simplify {
    /// Simplify `tables` with respect to `samples`.
    fn simplify(
        &self,
        tables: &TableCollection,
        samples: &[NodeId],
    ) -> Result<(TableCollection, Vec<NodeId>), Box<dyn std::error::Error + Send + Sync>>;
}

/// Options for [`fs`].
pub struct FsOptions {
    /// Count neutral mutations.
    pub include_neutral: bool,
    /// Count selected mutations.
    pub include_selected: bool,
    /// Return one spectrum per window instead of
    /// summing over windows.
    pub separate_windows: bool,
    /// For multiple sample groups, return the marginal
    /// spectrum of each group instead of the joint spectrum.
    /// Ignored for a single group.
    pub marginalize: bool,
    /// Genomic windows to tabulate over.
    /// `None` means a single window spanning the genome.
    pub windows: Option<Vec<(Position, Position)>>,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            include_neutral: true,
            include_selected: true,
            separate_windows: false,
            marginalize: false,
            windows: None,
        }
    }
}

/// A one-dimensional frequency spectrum.
///
/// For `n` samples there are `n + 1` bins.  Bins `0`
/// and `n` (mutations absent from, or fixed in, the
/// sample set) are masked: they are tabulated but
/// excluded from [`MaskedSpectrum::sum`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskedSpectrum {
    counts: Vec<u64>,
    mask: Vec<bool>,
}

impl MaskedSpectrum {
    pub(crate) fn zeros(num_samples: usize) -> Self {
        let mut mask = vec![false; num_samples + 1];
        mask[0] = true;
        mask[num_samples] = true;
        Self {
            counts: vec![0; num_samples + 1],
            mask,
        }
    }

    /// The per-bin counts, including masked bins.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// `true` for bins excluded from [`MaskedSpectrum::sum`].
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// The count in bin `i`.
    pub fn count(&self, i: usize) -> u64 {
        self.counts[i]
    }

    /// The number of bins, `num_samples + 1`.
    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// The sum over unmasked bins.
    pub fn sum(&self) -> u64 {
        self.counts
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, m)| !**m)
            .map(|(c, _)| *c)
            .sum()
    }

    fn merge(&mut self, other: &MaskedSpectrum) -> FsResult<()> {
        if self.counts.len() != other.counts.len() {
            return Err(FsError::ShapeMismatch);
        }
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
        Ok(())
    }
}

/// A joint frequency spectrum over two or more sample groups.
///
/// The spectrum is stored sparsely: only non-zero cells
/// are kept.  A cell's coordinates are the number of
/// carriers in each group.  The corner cells where a
/// mutation is absent from, or fixed in, every group are
/// masked, analogous to bins `0` and `n` of a
/// [`MaskedSpectrum`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointSpectrum {
    shape: Vec<usize>,
    cells: IndexMap<Box<[u32]>, u64>,
}

impl JointSpectrum {
    pub(crate) fn zeros(shape: Vec<usize>) -> Self {
        Self {
            shape,
            cells: IndexMap::new(),
        }
    }

    /// The number of bins along each axis,
    /// `num_samples + 1` per group.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Iterate over the non-zero cells.
    pub fn cells(&self) -> impl Iterator<Item = (&[u32], u64)> + '_ {
        self.cells.iter().map(|(k, v)| (k.as_ref(), *v))
    }

    /// The count in the cell at `coords`, zero if absent.
    pub fn count(&self, coords: &[u32]) -> u64 {
        self.cells.get(coords).copied().unwrap_or(0)
    }

    fn is_masked(&self, coords: &[u32]) -> bool {
        coords.iter().all(|c| *c == 0)
            || coords
                .iter()
                .zip(self.shape.iter())
                .all(|(c, s)| (*c as usize) == *s - 1)
    }

    /// The sum over unmasked cells.
    pub fn sum(&self) -> u64 {
        self.cells
            .iter()
            .filter(|(k, _)| !self.is_masked(k))
            .map(|(_, v)| *v)
            .sum()
    }

    fn add_one(&mut self, coords: &[u32]) {
        if let Some(v) = self.cells.get_mut(coords) {
            *v += 1;
        } else {
            self.cells.insert(coords.to_vec().into_boxed_slice(), 1);
        }
    }

    fn merge(&mut self, other: &JointSpectrum) -> FsResult<()> {
        if self.shape != other.shape {
            return Err(FsError::ShapeMismatch);
        }
        for (k, v) in other.cells.iter() {
            if let Some(c) = self.cells.get_mut(k.as_ref()) {
                *c += v;
            } else {
                self.cells.insert(k.clone(), *v);
            }
        }
        Ok(())
    }

    /// Sum out all axes but one, for each axis in turn.
    ///
    /// The result has one [`MaskedSpectrum`] per group.
    pub fn marginalize(&self) -> Vec<MaskedSpectrum> {
        let mut rv: Vec<MaskedSpectrum> = self
            .shape
            .iter()
            .map(|s| MaskedSpectrum::zeros(s - 1))
            .collect();
        for (coords, count) in self.cells.iter() {
            for (axis, c) in coords.iter().enumerate() {
                rv[axis].counts[*c as usize] += count;
            }
        }
        rv
    }
}

/// The frequency spectrum of one genomic window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowSpectrum {
    /// Spectrum of a single sample group.
    OneDim(MaskedSpectrum),
    /// Joint spectrum of two or more sample groups.
    Joint(JointSpectrum),
    /// Marginal spectra, one per sample group.
    Marginal(Vec<MaskedSpectrum>),
}

impl WindowSpectrum {
    fn merge(&mut self, other: &WindowSpectrum) -> FsResult<()> {
        match (self, other) {
            (WindowSpectrum::OneDim(a), WindowSpectrum::OneDim(b)) => a.merge(b),
            (WindowSpectrum::Joint(a), WindowSpectrum::Joint(b)) => a.merge(b),
            (WindowSpectrum::Marginal(a), WindowSpectrum::Marginal(b)) => {
                if a.len() != b.len() {
                    return Err(FsError::ShapeMismatch);
                }
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    x.merge(y)?;
                }
                Ok(())
            }
            _ => Err(FsError::ShapeMismatch),
        }
    }
}

// Builds the group membership lookup, rejecting invalid input.
fn validate_sample_groups(num_nodes: usize, samples: &[Vec<NodeId>]) -> FsResult<Vec<i32>> {
    if samples.is_empty() {
        return Err(FsError::EmptySamples);
    }
    let mut groups = vec![-1_i32; num_nodes];
    for (gi, group) in samples.iter().enumerate() {
        if group.len() < 2 {
            return Err(FsError::SampleListTooSmall);
        }
        for s in group.iter() {
            if *s == NodeId::NULL || (s.0 as usize) >= num_nodes {
                return Err(FsError::InvalidSampleNode);
            }
            if groups[s.0 as usize] == gi as i32 {
                return Err(FsError::DuplicateSampleNode);
            }
            if groups[s.0 as usize] >= 0 {
                return Err(FsError::SampleNodeInMultipleGroups);
            }
            groups[s.0 as usize] = gi as i32;
        }
    }
    Ok(groups)
}

fn validate_windows(windows: &[(Position, Position)], genome_length: Position) -> FsResult<()> {
    if windows.is_empty() {
        return Err(FsError::EmptyWindows);
    }
    for w in windows.iter() {
        if !w.0.is_valid_coordinate()
            || !w.1.is_valid_coordinate()
            || w.0 >= w.1
            || w.1 > genome_length
        {
            return Err(FsError::InvalidWindow { found: *w });
        }
    }
    for pair in windows.windows(2) {
        if pair[1].0 < pair[0].0 {
            return Err(FsError::UnsortedWindows);
        }
        if pair[1].0 < pair[0].1 {
            return Err(FsError::OverlappingWindows);
        }
    }
    Ok(())
}

fn one_dim_spectra(
    treeseq: &TreeSequence,
    windows: &[(Position, Position)],
    options: &FsOptions,
    num_samples: usize,
) -> FsResult<Vec<MaskedSpectrum>> {
    let mut spectra: Vec<MaskedSpectrum> = windows
        .iter()
        .map(|_| MaskedSpectrum::zeros(num_samples))
        .collect();
    let mut windex = 0_usize;
    let mut tree_iter = treeseq.tree_iterator(TreeFlags::empty());
    'trees: while let Some(tree) = tree_iter.next() {
        for m in tree.mutations() {
            let pos = treeseq.tables().site(m.site).position;
            // A mutation exactly at a window boundary belongs
            // to the window starting there.
            while windex < windows.len() && windows[windex].1 <= pos {
                windex += 1;
            }
            if windex == windows.len() {
                break 'trees;
            }
            if pos < windows[windex].0 {
                continue;
            }
            if !((m.neutral && options.include_neutral)
                || (!m.neutral && options.include_selected))
            {
                continue;
            }
            let c = tree.leaf_counts(m.node)?;
            if c > 0 {
                spectra[windex].counts[c as usize] += 1;
            }
        }
    }
    Ok(spectra)
}

fn joint_spectra(
    treeseq: &TreeSequence,
    windows: &[(Position, Position)],
    options: &FsOptions,
    groups: &[i32],
    shape: &[usize],
) -> FsResult<Vec<JointSpectrum>> {
    let mut spectra: Vec<JointSpectrum> = windows
        .iter()
        .map(|_| JointSpectrum::zeros(shape.to_vec()))
        .collect();
    let num_groups = shape.len();
    let mut windex = 0_usize;
    let mut below: Vec<NodeId> = vec![];
    let mut coords: Vec<u32> = vec![0; num_groups];
    let mut tree_iter = treeseq.tree_iterator(TreeFlags::TRACK_SAMPLES);
    'trees: while let Some(tree) = tree_iter.next() {
        for m in tree.mutations() {
            let pos = treeseq.tables().site(m.site).position;
            while windex < windows.len() && windows[windex].1 <= pos {
                windex += 1;
            }
            if windex == windows.len() {
                break 'trees;
            }
            if pos < windows[windex].0 {
                continue;
            }
            if !((m.neutral && options.include_neutral)
                || (!m.neutral && options.include_selected))
            {
                continue;
            }
            tree.samples_below_into(m.node, false, &mut below)?;
            if below.is_empty() {
                continue;
            }
            coords.iter_mut().for_each(|c| *c = 0);
            for s in below.iter() {
                let g = groups[s.0 as usize];
                if g >= 0 {
                    coords[g as usize] += 1;
                }
            }
            spectra[windex].add_one(&coords);
        }
    }
    Ok(spectra)
}

/// Compute frequency spectra from a table collection.
///
/// # Parameters
///
/// * `tables`: the tables to tabulate from.
/// * `samples`: one or more groups of sample nodes.
///   One group yields [`WindowSpectrum::OneDim`]; several
///   groups yield [`WindowSpectrum::Joint`] (or
///   [`WindowSpectrum::Marginal`] with
///   [`FsOptions::marginalize`]).
/// * `options`: see [`FsOptions`].
/// * `simplifier`: when present, the tables are first
///   simplified with respect to the union of all sample
///   groups and the spectra are computed on the result.
///
/// # Returns
///
/// One [`WindowSpectrum`] per window if
/// [`FsOptions::separate_windows`] is set, otherwise a
/// single spectrum summed over all windows.
///
/// # Errors
///
/// [`FsError`] if the samples, windows, or option
/// combination is invalid, or if a collaborator fails.
pub fn fs(
    tables: &TableCollection,
    samples: &[Vec<NodeId>],
    options: &FsOptions,
    simplifier: Option<&dyn Simplify>,
) -> FsResult<Vec<WindowSpectrum>> {
    if !options.include_neutral && !options.include_selected {
        return Err(FsError::NoVariantsIncluded);
    }
    validate_sample_groups(tables.num_nodes(), samples)?;

    let windows = match &options.windows {
        Some(w) => w.clone(),
        None => vec![(Position(0.0), tables.genome_length())],
    };
    validate_windows(&windows, tables.genome_length())?;

    // Flatten the groups; group order is preserved.
    let mut flat: Vec<NodeId> = vec![];
    for group in samples.iter() {
        flat.extend_from_slice(group);
    }

    let (mut working, remapped) = match simplifier {
        Some(s) => {
            let (simplified, id_map) = s
                .simplify(tables, &flat)
                .map_err(FsError::SimplifyError)?;
            let mut remapped = Vec::with_capacity(flat.len());
            for s in flat.iter() {
                let mapped = id_map
                    .get(s.0 as usize)
                    .copied()
                    .unwrap_or(NodeId::NULL);
                if mapped == NodeId::NULL {
                    return Err(FsError::InvalidSampleNode);
                }
                remapped.push(mapped);
            }
            (simplified, remapped)
        }
        None => (tables.clone(), flat),
    };
    if !working.is_indexed() {
        working.build_indexes(crate::IndexTablesFlags::default())?;
    }

    // Group membership by post-simplification node id.
    let mut groups = vec![-1_i32; working.num_nodes()];
    let mut offset = 0_usize;
    for (gi, group) in samples.iter().enumerate() {
        for s in remapped[offset..offset + group.len()].iter() {
            groups[s.0 as usize] = gi as i32;
        }
        offset += group.len();
    }

    let treeseq =
        TreeSequence::new_with_samples(working, &remapped, TreeSequenceFlags::NO_TABLE_VALIDATION)?;

    let mut per_window: Vec<WindowSpectrum> = if samples.len() == 1 {
        one_dim_spectra(&treeseq, &windows, options, samples[0].len())?
            .into_iter()
            .map(WindowSpectrum::OneDim)
            .collect()
    } else {
        let shape: Vec<usize> = samples.iter().map(|g| g.len() + 1).collect();
        let spectra = joint_spectra(&treeseq, &windows, options, &groups, &shape)?;
        if options.marginalize {
            spectra
                .into_iter()
                .map(|s| WindowSpectrum::Marginal(s.marginalize()))
                .collect()
        } else {
            spectra.into_iter().map(WindowSpectrum::Joint).collect()
        }
    };

    if options.separate_windows {
        Ok(per_window)
    } else {
        let mut merged = per_window.remove(0);
        for s in per_window.iter() {
            merged.merge(s)?;
        }
        Ok(vec![merged])
    }
}

#[cfg(test)]
mod test_fs {
    use super::*;
    use crate::NodeFlags;

    // Two trees over [0, 1000) with samples 2..=5 and
    // mutations at 250, 600, 750, 750, 900.
    fn make_tables() -> TableCollection {
        let mut tables = TableCollection::new(1000.0).unwrap();
        tables.add_node(2., 0).unwrap();
        tables.add_node(1., 0).unwrap();
        for _ in 0..4 {
            tables
                .add_node_with_flags(0., 0, NodeFlags::IS_SAMPLE.bits())
                .unwrap();
        }
        tables.add_edge(500.0, 1000.0, 0, 1).unwrap();
        tables.add_edge(0.0, 500.0, 0, 2).unwrap();
        tables.add_edge(0.0, 1000.0, 0, 3).unwrap();
        tables.add_edge(500.0, 1000.0, 1, 2).unwrap();
        tables.add_edge(0.0, 1000.0, 1, 4).unwrap();
        tables.add_edge(0.0, 1000.0, 1, 5).unwrap();

        let s0 = tables.add_site(250.0, None).unwrap();
        let s1 = tables.add_site(600.0, None).unwrap();
        let s2 = tables.add_site(750.0, None).unwrap();
        let s3 = tables.add_site(900.0, None).unwrap();
        tables.add_mutation(2, None, s0, None, true).unwrap();
        tables.add_mutation(1, None, s1, None, false).unwrap();
        tables.add_mutation(4, None, s2, None, true).unwrap();
        tables.add_mutation(5, None, s2, None, false).unwrap();
        tables.add_mutation(0, None, s3, None, true).unwrap();

        tables
            .validate(crate::TableValidationFlags::VALIDATE_ALL)
            .unwrap();
        tables
            .build_indexes(crate::IndexTablesFlags::empty())
            .unwrap();
        tables
    }

    fn all_samples() -> Vec<Vec<NodeId>> {
        vec![(2..6).map(NodeId::from).collect()]
    }

    fn two_groups() -> Vec<Vec<NodeId>> {
        vec![
            vec![NodeId::from(2), NodeId::from(3)],
            vec![NodeId::from(4), NodeId::from(5)],
        ]
    }

    #[test]
    fn test_one_dim() {
        let tables = make_tables();
        let rv = fs(&tables, &all_samples(), &FsOptions::default(), None).unwrap();
        assert_eq!(rv.len(), 1);
        match &rv[0] {
            WindowSpectrum::OneDim(spectrum) => {
                assert_eq!(spectrum.counts(), &[0, 3, 0, 1, 1]);
                // the mutation fixed in the sample set is masked
                assert_eq!(spectrum.sum(), 4);
            }
            _ => panic!("expected a one-dimensional spectrum"),
        }
    }

    #[test]
    fn test_one_dim_neutral_only() {
        let tables = make_tables();
        let options = FsOptions {
            include_selected: false,
            ..Default::default()
        };
        let rv = fs(&tables, &all_samples(), &options, None).unwrap();
        match &rv[0] {
            WindowSpectrum::OneDim(spectrum) => {
                assert_eq!(spectrum.counts(), &[0, 2, 0, 0, 1]);
                assert_eq!(spectrum.sum(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_exclude_everything_is_an_error() {
        let tables = make_tables();
        let options = FsOptions {
            include_neutral: false,
            include_selected: false,
            ..Default::default()
        };
        assert!(matches!(
            fs(&tables, &all_samples(), &options, None),
            Err(FsError::NoVariantsIncluded)
        ));
    }

    #[test]
    fn test_separate_windows_partition_the_total() {
        let tables = make_tables();
        let options = FsOptions {
            separate_windows: true,
            windows: Some(vec![
                (Position(0.0), Position(500.0)),
                (Position(500.0), Position(1000.0)),
            ]),
            ..Default::default()
        };
        let rv = fs(&tables, &all_samples(), &options, None).unwrap();
        assert_eq!(rv.len(), 2);
        let sums: Vec<u64> = rv
            .iter()
            .map(|w| match w {
                WindowSpectrum::OneDim(s) => s.sum(),
                _ => panic!(),
            })
            .collect();
        assert_eq!(sums, vec![1, 3]);

        // summing over windows reproduces the whole-genome spectrum
        let merged = fs(
            &tables,
            &all_samples(),
            &FsOptions {
                windows: options.windows.clone(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let whole = fs(&tables, &all_samples(), &FsOptions::default(), None).unwrap();
        assert_eq!(merged, whole);
    }

    #[test]
    fn test_boundary_mutation_goes_to_next_window() {
        let tables = make_tables();
        let options = FsOptions {
            separate_windows: true,
            windows: Some(vec![
                (Position(0.0), Position(250.0)),
                (Position(250.0), Position(1000.0)),
            ]),
            ..Default::default()
        };
        let rv = fs(&tables, &all_samples(), &options, None).unwrap();
        match (&rv[0], &rv[1]) {
            (WindowSpectrum::OneDim(a), WindowSpectrum::OneDim(b)) => {
                assert_eq!(a.sum(), 0);
                assert_eq!(b.sum(), 4);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_mutations_in_window_gaps_are_skipped() {
        let tables = make_tables();
        let options = FsOptions {
            // excludes the sites at 600 and 900
            windows: Some(vec![
                (Position(0.0), Position(500.0)),
                (Position(700.0), Position(800.0)),
            ]),
            ..Default::default()
        };
        let rv = fs(&tables, &all_samples(), &options, None).unwrap();
        match &rv[0] {
            WindowSpectrum::OneDim(s) => assert_eq!(s.sum(), 3),
            _ => panic!(),
        }
    }

    #[test]
    fn test_joint_two_groups() {
        let tables = make_tables();
        let rv = fs(&tables, &two_groups(), &FsOptions::default(), None).unwrap();
        match &rv[0] {
            WindowSpectrum::Joint(joint) => {
                assert_eq!(joint.shape(), &[3, 3]);
                assert_eq!(joint.count(&[1, 0]), 1);
                assert_eq!(joint.count(&[1, 2]), 1);
                assert_eq!(joint.count(&[0, 1]), 2);
                assert_eq!(joint.count(&[2, 2]), 1);
                // [2, 2] is a masked corner
                assert_eq!(joint.sum(), 4);
            }
            _ => panic!("expected a joint spectrum"),
        }
    }

    #[test]
    fn test_no_mutations_yields_empty_spectra() {
        let mut tables = TableCollection::new(1000.0).unwrap();
        tables.add_node(1., 0).unwrap();
        for _ in 0..2 {
            tables
                .add_node_with_flags(0., 0, NodeFlags::IS_SAMPLE.bits())
                .unwrap();
        }
        tables.add_edge(0.0, 1000.0, 0, 1).unwrap();
        tables.add_edge(0.0, 1000.0, 0, 2).unwrap();
        tables
            .build_indexes(crate::IndexTablesFlags::empty())
            .unwrap();

        let samples = vec![vec![NodeId::from(1), NodeId::from(2)]];
        let rv = fs(&tables, &samples, &FsOptions::default(), None).unwrap();
        match &rv[0] {
            WindowSpectrum::OneDim(s) => {
                assert_eq!(s.counts(), &[0, 0, 0]);
                assert_eq!(s.sum(), 0);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_joint_unequal_group_sizes() {
        // One tree: root 0, internal 1 with children 4, 5, 6,
        // samples 2 and 3 attached to the root.
        let mut tables = TableCollection::new(100.0).unwrap();
        tables.add_node(2., 0).unwrap();
        tables.add_node(1., 0).unwrap();
        for _ in 0..5 {
            tables
                .add_node_with_flags(0., 0, NodeFlags::IS_SAMPLE.bits())
                .unwrap();
        }
        tables.add_edge(0.0, 100.0, 0, 1).unwrap();
        tables.add_edge(0.0, 100.0, 0, 2).unwrap();
        tables.add_edge(0.0, 100.0, 0, 3).unwrap();
        tables.add_edge(0.0, 100.0, 1, 4).unwrap();
        tables.add_edge(0.0, 100.0, 1, 5).unwrap();
        tables.add_edge(0.0, 100.0, 1, 6).unwrap();
        let s0 = tables.add_site(10.0, None).unwrap();
        let s1 = tables.add_site(20.0, None).unwrap();
        let s2 = tables.add_site(30.0, None).unwrap();
        let s3 = tables.add_site(40.0, None).unwrap();
        tables.add_mutation(2, None, s0, None, true).unwrap();
        tables.add_mutation(1, None, s1, None, false).unwrap();
        tables.add_mutation(4, None, s2, None, true).unwrap();
        tables.add_mutation(0, None, s3, None, true).unwrap();
        tables
            .build_indexes(crate::IndexTablesFlags::empty())
            .unwrap();

        let groups = vec![
            vec![NodeId::from(2), NodeId::from(3)],
            vec![NodeId::from(4), NodeId::from(5), NodeId::from(6)],
        ];
        let rv = fs(&tables, &groups, &FsOptions::default(), None).unwrap();
        match &rv[0] {
            WindowSpectrum::Joint(joint) => {
                assert_eq!(joint.shape(), &[3, 4]);
                assert_eq!(joint.count(&[1, 0]), 1);
                assert_eq!(joint.count(&[0, 3]), 1);
                assert_eq!(joint.count(&[0, 1]), 1);
                assert_eq!(joint.count(&[2, 3]), 1);
                assert_eq!(joint.sum(), 3);
            }
            _ => panic!("expected a joint spectrum"),
        }
    }

    #[test]
    fn test_joint_single_segregating_cell() {
        // Groups of four and six samples.  One mutation on
        // node 1, below which sit two samples of the first
        // group and three of the second, so the only
        // populated cell is (2, 3).
        let mut tables = TableCollection::new(100.0).unwrap();
        tables.add_node(3., 0).unwrap();
        tables.add_node(1., 0).unwrap();
        for _ in 0..10 {
            tables
                .add_node_with_flags(0., 0, NodeFlags::IS_SAMPLE.bits())
                .unwrap();
        }
        tables.add_edge(0.0, 100.0, 0, 1).unwrap();
        for c in [2, 3, 6, 7, 8] {
            tables.add_edge(0.0, 100.0, 1, c).unwrap();
        }
        for c in [4, 5, 9, 10, 11] {
            tables.add_edge(0.0, 100.0, 0, c).unwrap();
        }
        let s0 = tables.add_site(50.0, None).unwrap();
        tables.add_mutation(1, None, s0, None, true).unwrap();
        tables
            .build_indexes(crate::IndexTablesFlags::empty())
            .unwrap();

        let groups = vec![
            (2..6).map(NodeId::from).collect::<Vec<_>>(),
            (6..12).map(NodeId::from).collect::<Vec<_>>(),
        ];
        let rv = fs(&tables, &groups, &FsOptions::default(), None).unwrap();
        match &rv[0] {
            WindowSpectrum::Joint(joint) => {
                assert_eq!(joint.shape(), &[5, 7]);
                assert_eq!(joint.count(&[2, 3]), 1);
                assert_eq!(joint.sum(), 1);

                let marginals = joint.marginalize();
                assert_eq!(marginals[0].counts(), &[0, 0, 1, 0, 0]);
                assert!(marginals[0].mask()[0] && marginals[0].mask()[4]);
                assert_eq!(marginals[0].sum(), 1);
                assert_eq!(marginals[1].counts(), &[0, 0, 0, 1, 0, 0, 0]);
                assert!(marginals[1].mask()[0] && marginals[1].mask()[6]);
                assert_eq!(marginals[1].sum(), 1);
            }
            _ => panic!("expected a joint spectrum"),
        }
    }

    #[test]
    fn test_marginalized_two_groups() {
        let tables = make_tables();
        let options = FsOptions {
            marginalize: true,
            ..Default::default()
        };
        let rv = fs(&tables, &two_groups(), &options, None).unwrap();
        match &rv[0] {
            WindowSpectrum::Marginal(marginals) => {
                assert_eq!(marginals.len(), 2);
                assert_eq!(marginals[0].counts(), &[2, 2, 1]);
                assert_eq!(marginals[0].sum(), 2);
                assert_eq!(marginals[1].counts(), &[1, 2, 2]);
                assert_eq!(marginals[1].sum(), 2);
            }
            _ => panic!("expected marginal spectra"),
        }
    }

    #[test]
    fn test_marginals_match_joint() {
        let tables = make_tables();
        let joint = fs(&tables, &two_groups(), &FsOptions::default(), None).unwrap();
        let marginal = fs(
            &tables,
            &two_groups(),
            &FsOptions {
                marginalize: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();
        match (&joint[0], &marginal[0]) {
            (WindowSpectrum::Joint(j), WindowSpectrum::Marginal(m)) => {
                assert_eq!(&j.marginalize(), m);
            }
            _ => panic!(),
        }
    }

    struct IdentitySimplify {}

    impl Simplify for IdentitySimplify {
        fn simplify(
            &self,
            tables: &TableCollection,
            _samples: &[NodeId],
        ) -> Result<(TableCollection, Vec<NodeId>), Box<dyn std::error::Error + Send + Sync>>
        {
            let id_map = (0..tables.num_nodes()).map(NodeId::from).collect();
            Ok((tables.clone(), id_map))
        }
    }

    struct FailingSimplify {}

    impl Simplify for FailingSimplify {
        fn simplify(
            &self,
            _tables: &TableCollection,
            _samples: &[NodeId],
        ) -> Result<(TableCollection, Vec<NodeId>), Box<dyn std::error::Error + Send + Sync>>
        {
            Err("not today".into())
        }
    }

    #[test]
    fn test_identity_simplification_changes_nothing() {
        let tables = make_tables();
        let simplifier = IdentitySimplify {};
        let with = fs(
            &tables,
            &all_samples(),
            &FsOptions::default(),
            Some(&simplifier),
        )
        .unwrap();
        let without = fs(&tables, &all_samples(), &FsOptions::default(), None).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_simplify_errors_propagate() {
        let tables = make_tables();
        let simplifier = FailingSimplify {};
        assert!(matches!(
            fs(
                &tables,
                &all_samples(),
                &FsOptions::default(),
                Some(&simplifier)
            ),
            Err(FsError::SimplifyError(_))
        ));
    }

    #[test]
    fn test_bad_sample_groups() {
        let tables = make_tables();
        assert!(matches!(
            fs(&tables, &[], &FsOptions::default(), None),
            Err(FsError::EmptySamples)
        ));
        assert!(matches!(
            fs(
                &tables,
                &[vec![NodeId::from(2)]],
                &FsOptions::default(),
                None
            ),
            Err(FsError::SampleListTooSmall)
        ));
        assert!(matches!(
            fs(
                &tables,
                &[vec![NodeId::from(2), NodeId::from(2)]],
                &FsOptions::default(),
                None
            ),
            Err(FsError::DuplicateSampleNode)
        ));
        assert!(matches!(
            fs(
                &tables,
                &[
                    vec![NodeId::from(2), NodeId::from(3)],
                    vec![NodeId::from(3), NodeId::from(4)]
                ],
                &FsOptions::default(),
                None
            ),
            Err(FsError::SampleNodeInMultipleGroups)
        ));
        assert!(matches!(
            fs(
                &tables,
                &[vec![NodeId::from(2), NodeId::from(100)]],
                &FsOptions::default(),
                None
            ),
            Err(FsError::InvalidSampleNode)
        ));
    }

    #[test]
    fn test_empty_window_list_is_an_error() {
        let tables = make_tables();
        let options = FsOptions {
            windows: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(
            fs(&tables, &all_samples(), &options, None),
            Err(FsError::EmptyWindows)
        ));

        let options = FsOptions {
            windows: Some(vec![]),
            separate_windows: true,
            ..Default::default()
        };
        assert!(matches!(
            fs(&tables, &all_samples(), &options, None),
            Err(FsError::EmptyWindows)
        ));
    }

    #[test]
    fn test_bad_windows() {
        let tables = make_tables();
        let mk = |windows| FsOptions {
            windows: Some(windows),
            ..Default::default()
        };
        assert!(matches!(
            fs(
                &tables,
                &all_samples(),
                &mk(vec![(Position(500.0), Position(100.0))]),
                None
            ),
            Err(FsError::InvalidWindow { .. })
        ));
        assert!(matches!(
            fs(
                &tables,
                &all_samples(),
                &mk(vec![(Position(0.0), Position(2000.0))]),
                None
            ),
            Err(FsError::InvalidWindow { .. })
        ));
        assert!(matches!(
            fs(
                &tables,
                &all_samples(),
                &mk(vec![
                    (Position(500.0), Position(1000.0)),
                    (Position(0.0), Position(500.0))
                ]),
                None
            ),
            Err(FsError::UnsortedWindows)
        ));
        assert!(matches!(
            fs(
                &tables,
                &all_samples(),
                &mk(vec![
                    (Position(0.0), Position(600.0)),
                    (Position(400.0), Position(1000.0))
                ]),
                None
            ),
            Err(FsError::OverlappingWindows)
        ));
    }
}

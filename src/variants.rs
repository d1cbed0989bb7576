use crate::newtypes::{MutationId, Position, SiteId};
use crate::trees::{Tree, TreeFlags, TreeSequence, TreesError};
use streaming_iterator::StreamingIterator;
use thiserror::Error;

/// Error type related to [``VariantIterator``].
#[derive(Error, Debug, PartialEq)]
pub enum VariantsError {
    /// A [`TreesError`] occurred during iteration setup.
    #[error("{0:?}")]
    TreesError(#[from] TreesError),
    /// Returned when both neutral and selected variants
    /// are excluded.
    #[error("excluding neutral and selected variants is invalid")]
    NoVariantsIncluded,
}

/// Result type for variant iteration.
pub type VariantsResult<T> = Result<T, VariantsError>;

/// A streaming iterator over the variants of a [`TreeSequence`].
///
/// A variant is a [`Site`](crate::Site) together with the
/// genotypes of all sample nodes at that site.  Sites where
/// no included mutation is carried by any sample are skipped.
///
/// The iteration visits sites in increasing order of position.
pub struct VariantIterator<'treeseq> {
    treeseq: &'treeseq TreeSequence,
    tree: Tree<'treeseq>,
    include_neutral: bool,
    include_selected: bool,
    // Genotypes of the current variant, one entry per
    // sample node, in sample list order.
    genotypes: Vec<i8>,
    records: Vec<MutationId>,
    position: Position,
    site: SiteId,
    have_tree: bool,
    site_index: usize,
    mutation_index: usize,
    advanced: bool,
}

impl<'treeseq> VariantIterator<'treeseq> {
    /// Create a new iterator over all variants.
    ///
    /// # Parameters
    ///
    /// * `treeseq`: the tree sequence to iterate.
    /// * `include_neutral`: include variants due to neutral mutations.
    /// * `include_selected`: include variants due to selected mutations.
    ///
    /// # Errors
    ///
    /// [`VariantsError::NoVariantsIncluded`] if both `include_neutral`
    /// and `include_selected` are `false`.
    pub fn new(
        treeseq: &'treeseq TreeSequence,
        include_neutral: bool,
        include_selected: bool,
    ) -> VariantsResult<Self> {
        let begin = Position(0.0);
        let end = treeseq.tables().genome_length();
        Self::new_range(treeseq, include_neutral, include_selected, begin, end)
    }

    /// Create a new iterator over the variants in `[begin, end)`.
    ///
    /// # Errors
    ///
    /// [`VariantsError::NoVariantsIncluded`] if both include flags
    /// are `false`.
    ///
    /// [`TreesError::InvalidRange`] if the interval is invalid.
    pub fn new_range<B: Into<Position>, E: Into<Position>>(
        treeseq: &'treeseq TreeSequence,
        include_neutral: bool,
        include_selected: bool,
        begin: B,
        end: E,
    ) -> VariantsResult<Self> {
        if !include_neutral && !include_selected {
            return Err(VariantsError::NoVariantsIncluded);
        }
        let tree = treeseq.tree_iterator_range(TreeFlags::TRACK_SAMPLES, begin, end)?;
        Ok(Self {
            treeseq,
            tree,
            include_neutral,
            include_selected,
            genotypes: vec![0; treeseq.num_samples()],
            records: vec![],
            position: Position(0.0),
            site: SiteId::NULL,
            have_tree: false,
            site_index: 0,
            mutation_index: 0,
            advanced: false,
        })
    }

    /// Genotypes of the current variant, one entry per sample,
    /// in the order of [`TreeSequence::sample_nodes`].
    /// `1` means the sample carries an included mutation at the
    /// current site.
    pub fn genotypes(&self) -> &[i8] {
        &self.genotypes
    }

    /// The included mutations at the current site.
    pub fn records(&self) -> &[MutationId] {
        &self.records
    }

    /// Position of the current variant.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Site of the current variant.
    pub fn site(&self) -> SiteId {
        self.site
    }

    fn included(&self, neutral: bool) -> bool {
        (neutral && self.include_neutral) || (!neutral && self.include_selected)
    }
}

impl<'treeseq> StreamingIterator for VariantIterator<'treeseq> {
    type Item = VariantIterator<'treeseq>;

    fn advance(&mut self) {
        let mutations = self.treeseq.tables().mutations();
        loop {
            if !self.have_tree {
                self.tree.advance();
                if self.tree.get().is_none() {
                    self.advanced = false;
                    return;
                }
                self.have_tree = true;
                self.site_index = self.tree.site_range().0;
                self.mutation_index = self.tree.mutation_range().0;
            }
            if self.site_index >= self.tree.site_range().1 {
                self.have_tree = false;
                continue;
            }
            let site = SiteId::from(self.site_index);
            self.site_index += 1;

            // Mutations are sorted by site.
            let mutation_end = self.tree.mutation_range().1;
            while self.mutation_index < mutation_end && mutations[self.mutation_index].site < site {
                self.mutation_index += 1;
            }
            let first = self.mutation_index;
            while self.mutation_index < mutation_end && mutations[self.mutation_index].site == site
            {
                self.mutation_index += 1;
            }

            self.records.clear();
            for g in self.genotypes.iter_mut() {
                *g = 0;
            }
            let mut num_carriers = 0;
            for m in first..self.mutation_index {
                if !self.included(mutations[m].neutral) {
                    continue;
                }
                self.records.push(MutationId::from(m));
                for s in self.tree.samples(mutations[m].node).unwrap() {
                    let idx = usize::from(self.tree.sample_index(s));
                    if self.genotypes[idx] == 0 {
                        self.genotypes[idx] = 1;
                        num_carriers += 1;
                    }
                }
            }
            if !self.records.is_empty() && num_carriers > 0 {
                self.position = self.treeseq.tables().site(site).position;
                self.site = site;
                self.advanced = true;
                return;
            }
        }
    }

    fn get(&self) -> Option<&Self::Item> {
        match self.advanced {
            true => Some(self),
            false => None,
        }
    }
}

use crate::newtypes::{min_position, NodeId, Position, SiteId, Time};
use crate::tables::{MutationRecord, Site, TablesError};
use bitflags::bitflags;

bitflags! {
    /// Modify the behavior of [`TreeSequence::tree_iterator`].
    #[derive(Default)]
    pub struct TreeFlags: u32 {
        /// Keep track of which sample nodes descend from
        /// each node.  This tracking is relatively expensive.
        const TRACK_SAMPLES = 1 << 0;
    }
}

/// Data describing the toplological relationship
/// between [`NodeId`] in a [`Tree`].
///
/// For a [`TreeSequence`] whose tables have `n`
/// nodes, there are `n` instances of this
/// struct.
///
/// For a given instance, the fields provide
/// the id of other nodes of specific relationships
/// in the same tree.
///
/// Some fields may be equal to [`NodeId::NULL`],
/// indicating that the current instance is a root
/// or leaf node, for example.
#[derive(Copy, Clone)]
struct TopologyData {
    parent: NodeId,
    left_child: NodeId,
    right_child: NodeId,
    left_sib: NodeId,
    right_sib: NodeId,
    left_sample: NodeId,
    right_sample: NodeId,
    next_sample: NodeId,
    leaf_counts: i32,
    preserved_leaf_counts: i32,
}

impl Default for TopologyData {
    fn default() -> Self {
        Self {
            parent: NodeId::NULL,
            left_child: NodeId::NULL,
            right_child: NodeId::NULL,
            left_sib: NodeId::NULL,
            right_sib: NodeId::NULL,
            left_sample: NodeId::NULL,
            right_sample: NodeId::NULL,
            next_sample: NodeId::NULL,
            leaf_counts: 0,
            preserved_leaf_counts: 0,
        }
    }
}

trait NodeIterator {
    fn next_node(&mut self);
    fn current_node(&mut self) -> Option<NodeId>;
}

/// Specify the traversal order used by
/// [`Tree::traverse_nodes`].
pub enum NodeTraversalOrder {
    ///Preorder traversal, starting at the root(s) of a [`Tree`].
    ///For trees with multiple roots, start at the left root,
    ///traverse to tips, proceeed to the next root, etc..
    Preorder,
}

struct PreorderNodeIterator<'a> {
    node_stack: Vec<NodeId>,
    tree: &'a Tree<'a>,
    current_node_: Option<NodeId>,
}

impl<'a> PreorderNodeIterator<'a> {
    fn new(tree: &'a Tree) -> Self {
        let mut rv = PreorderNodeIterator {
            node_stack: tree.roots_to_vec(),
            tree,
            current_node_: None,
        };
        rv.node_stack.reverse();
        rv
    }
}

impl NodeIterator for PreorderNodeIterator<'_> {
    fn next_node(&mut self) {
        self.current_node_ = self.node_stack.pop();
        if let Some(u) = self.current_node_ {
            let mut c = self.tree.right_child(u).unwrap();
            while c != NodeId::NULL {
                self.node_stack.push(c);
                c = self.tree.left_sib(c).unwrap();
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node_
    }
}

iterator_for_nodeiterator!(PreorderNodeIterator<'_>);

struct RootIterator<'a> {
    current_root: Option<NodeId>,
    next_root: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> RootIterator<'a> {
    fn new(tree: &'a Tree) -> Self {
        RootIterator {
            current_root: None,
            next_root: tree.left_root,
            tree,
        }
    }
}

impl NodeIterator for RootIterator<'_> {
    fn next_node(&mut self) {
        self.current_root = match self.next_root {
            NodeId::NULL => None,
            r => {
                assert!(r >= 0);
                let cr = Some(r);
                self.next_root = self.tree.right_sib(r).unwrap();
                cr
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_root
    }
}

iterator_for_nodeiterator!(RootIterator<'_>);

struct ChildIterator<'a> {
    current_child: Option<NodeId>,
    next_child: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> ChildIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        let c = tree.left_child(u).unwrap();

        ChildIterator {
            current_child: None,
            next_child: c,
            tree,
        }
    }
}

impl NodeIterator for ChildIterator<'_> {
    fn next_node(&mut self) {
        self.current_child = match self.next_child {
            NodeId::NULL => None,
            r => {
                assert!(r >= 0);
                let cr = Some(r);
                self.next_child = self.tree.right_sib(r).unwrap();
                cr
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_child
    }
}

iterator_for_nodeiterator!(ChildIterator<'_>);

struct ParentsIterator<'a> {
    current_node: Option<NodeId>,
    next_node: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> ParentsIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        ParentsIterator {
            current_node: None,
            next_node: u,
            tree,
        }
    }
}

impl NodeIterator for ParentsIterator<'_> {
    fn next_node(&mut self) {
        self.current_node = match self.next_node {
            NodeId::NULL => None,
            r => {
                assert!(r >= 0);
                let cr = Some(r);
                self.next_node = self.tree.parent(r).unwrap();
                cr
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node
    }
}

iterator_for_nodeiterator!(ParentsIterator<'_>);

struct SamplesIterator<'a> {
    current_node: Option<NodeId>,
    next_sample_index: NodeId,
    last_sample_index: NodeId,
    tree: &'a Tree<'a>,
}

impl<'a> SamplesIterator<'a> {
    fn new(tree: &'a Tree, u: NodeId) -> Self {
        SamplesIterator {
            current_node: None,
            next_sample_index: tree.left_sample(u).unwrap(),
            last_sample_index: tree.right_sample(u).unwrap(),
            tree,
        }
    }
}

impl NodeIterator for SamplesIterator<'_> {
    fn next_node(&mut self) {
        self.current_node = match self.next_sample_index {
            NodeId::NULL => None,
            r => {
                if r == self.last_sample_index {
                    let cr = Some(self.tree.samples[r.0 as usize]);
                    self.next_sample_index = NodeId::NULL;
                    cr
                } else {
                    assert!(r >= 0);
                    let cr = Some(self.tree.samples[r.0 as usize]);
                    self.next_sample_index = self.tree.topology[r.0 as usize].next_sample;
                    cr
                }
            }
        };
    }

    fn current_node(&mut self) -> Option<NodeId> {
        self.current_node
    }
}

iterator_for_nodeiterator!(SamplesIterator<'_>);

/// A tree is the genealogy of a non-recombining
/// segment of a genome.  A [`TreeSequence`] contains
/// the information needed to efficiently build trees
/// and iterate over each tree in a genome.
pub struct Tree<'treeseq> {
    topology: Vec<TopologyData>,
    left_root: NodeId,
    above_sample: Vec<i8>,
    left: Position,
    right: Position,
    samples: &'treeseq [NodeId],
    sample_index_map: Vec<NodeId>, // TODO: decide if this is better as usize.
    flags: TreeFlags,
    treeseq: &'treeseq TreeSequence,
    // Genomic interval this iteration is restricted to.
    begin: Position,
    end: Position,
    // Half-open ranges into the site/mutation tables for
    // the current tree.
    site_range: (usize, usize),
    mutation_range: (usize, usize),
    site_cursor: usize,
    mutation_cursor: usize,
    // The following help implement StreamingIterator
    input_edge_index: usize,
    output_edge_index: usize,
    x: Position,
    advanced: bool,
}

impl<'treeseq> Tree<'treeseq> {
    fn new_internal(
        treeseq: &'treeseq TreeSequence,
        flags: TreeFlags,
        begin: Position,
        end: Position,
    ) -> Self {
        Self {
            topology: vec![TopologyData::default(); treeseq.tables.num_nodes()],
            left_root: NodeId::NULL,
            above_sample: vec![0; treeseq.tables.num_nodes()],
            left: Position::MIN,
            right: Position::MIN,
            samples: treeseq.samples.as_slice(),
            sample_index_map: vec![NodeId::NULL; treeseq.tables.num_nodes()],
            flags,
            treeseq,
            begin,
            end,
            site_range: (0, 0),
            mutation_range: (0, 0),
            site_cursor: 0,
            mutation_cursor: 0,
            input_edge_index: 0,
            output_edge_index: 0,
            x: Position(0.0),
            advanced: false,
        }
    }

    fn init_samples(&mut self) {
        for (i, s) in self.samples.iter().enumerate() {
            if self.sample_index_map[s.0 as usize] != NodeId::NULL {
                panic!("Duplicate samples passed to Tree!");
            }
            self.sample_index_map[s.0 as usize] = NodeId::from(i);
            if let Some(row) = self.topology.get_mut(s.0 as usize) {
                row.left_sample = self.sample_index_map[s.0 as usize];
                row.right_sample = self.sample_index_map[s.0 as usize];
                row.leaf_counts = 1;
                self.above_sample[s.0 as usize] = 1;

                // Initialize roots
                if i < self.samples.len() - 1 {
                    row.right_sib = *unsafe { self.samples.get_unchecked(i + 1) };
                }
                if i > 0 {
                    row.left_sib = *unsafe { self.samples.get_unchecked(i - 1) };
                }
            } else {
                panic!("expected Some(mut row)");
            }
        }
    }

    fn init_ancient_samples(&mut self, ancient_samples: &[NodeId]) {
        for a in ancient_samples {
            self.topology[a.0 as usize].preserved_leaf_counts = 1;
        }
    }

    fn update_incoming_leaf_count(&mut self, parent: NodeId, child: NodeId) {
        let mut u = parent;
        let lc = self.topology[child.0 as usize].leaf_counts;
        let pc = self.topology[child.0 as usize].preserved_leaf_counts;
        if lc == 0 && pc == 0 {
            return;
        }
        while u != NodeId::NULL {
            self.topology[u.0 as usize].leaf_counts += lc;
            self.topology[u.0 as usize].preserved_leaf_counts += pc;
            u = self.topology[u.0 as usize].parent;
        }
    }

    fn update_incoming_roots(&mut self, parent: NodeId, child: NodeId, lsib: NodeId, rsib: NodeId) {
        if self.above_sample[child.0 as usize] > 0 {
            let mut x = parent;
            let mut root = x;
            let mut above_sample = false;

            while x != NodeId::NULL && !above_sample {
                above_sample = self.above_sample[x.0 as usize] > 0;
                // c is above_sample and p is c's parent.
                // Thus, all parents to p are above_sample, too.
                self.above_sample[x.0 as usize] = 1;
                root = x;
                x = self.topology[x.0 as usize].parent;
            }

            if !above_sample {
                // If we are here, then the above loop terminated
                // by encountering a NULL node, because above_sample[x]
                // must have been 0 for all x. However, because c is
                // above sample, all nodes encountered have been update
                // to be above_sample as well. Thus, the new value of root
                // replaces c in the root list.

                if lsib != NodeId::NULL {
                    self.topology[lsib.0 as usize].right_sib = root;
                }
                if rsib != NodeId::NULL {
                    self.topology[rsib.0 as usize].left_sib = root;
                }
                self.topology[root.0 as usize].left_sib = lsib;
                self.topology[root.0 as usize].right_sib = rsib;
                self.left_root = root;
            } else {
                // If we are here, then we encountered a node
                // ancestral to c where above_sample == 1.
                // Thus, c can no longer be a root.  If the current
                // p is also a c in a later call to this function, then
                // it may also be removed, etc..
                self.left_root = NodeId::NULL;
                if lsib != NodeId::NULL {
                    self.topology[lsib.0 as usize].right_sib = rsib;
                    self.left_root = lsib;
                }
                if rsib != NodeId::NULL {
                    self.topology[rsib.0 as usize].left_sib = lsib;
                    self.left_root = rsib;
                }
            }
        }
    }

    fn update_outgoing_leaf_count(&mut self, parent: NodeId, child: NodeId) {
        let mut u = parent;
        let lc = self.topology[child.0 as usize].leaf_counts;
        let pc = self.topology[child.0 as usize].preserved_leaf_counts;
        if lc == 0 && pc == 0 {
            return;
        }
        while u != NodeId::NULL {
            self.topology[u.0 as usize].leaf_counts -= lc;
            self.topology[u.0 as usize].preserved_leaf_counts -= pc;
            u = self.topology[u.0 as usize].parent;
        }
    }

    fn update_outgoing_roots(&mut self, parent: NodeId, child: NodeId) {
        if self.above_sample[child.0 as usize] == 1 {
            let mut x = parent;
            let mut root = x;
            let mut above_sample = false;

            while x != NodeId::NULL && !above_sample {
                above_sample = self.sample_index_map[x.0 as usize] != NodeId::NULL;
                let mut lc = self.topology[x.0 as usize].left_child;
                while lc != NodeId::NULL && !above_sample {
                    above_sample = above_sample || self.above_sample[lc.0 as usize] > 0;
                    lc = self.topology[lc.0 as usize].left_sib;
                }
                if above_sample {
                    self.above_sample[x.0 as usize] = 1;
                }
                root = x;
                x = self.topology[x.0 as usize].parent;
            }

            // Now, root refers to the most ancient
            // ancestor of parent found in the above loop
            if !above_sample {
                // remove root from list of roots
                let lroot = self.topology[root.0 as usize].left_sib;
                let rroot = self.topology[root.0 as usize].right_sib;
                self.left_root = NodeId::NULL;
                if lroot != NodeId::NULL {
                    self.topology[lroot.0 as usize].right_sib = rroot;
                    self.left_root = lroot;
                }
                if rroot != NodeId::NULL {
                    self.topology[rroot.0 as usize].left_sib = lroot;
                    self.left_root = rroot;
                }
                self.topology[root.0 as usize].left_sib = NodeId::NULL;
                self.topology[root.0 as usize].right_sib = NodeId::NULL;
            }
            if self.left_root != NodeId::NULL {
                let lroot = self.topology[self.left_root.0 as usize].left_sib;
                if lroot != NodeId::NULL {
                    self.topology[lroot.0 as usize].right_sib = child;
                }
                self.topology[child.0 as usize].left_sib = lroot;
                self.topology[self.left_root.0 as usize].left_sib = child;
            }
            self.topology[child.0 as usize].right_sib = self.left_root;
            self.left_root = child;
        }
    }

    fn update_samples_list(&mut self, node: NodeId) {
        assert!(self.flags.contains(TreeFlags::TRACK_SAMPLES));

        let sample_map = self.sample_index_map.as_slice();
        let topo = self.topology.as_mut_slice();
        let mut n = node;

        while n != NodeId::NULL {
            let sample_index = sample_map[n.0 as usize];
            if sample_index != NodeId::NULL {
                topo[n.0 as usize].right_sample = topo[n.0 as usize].left_sample;
            } else {
                topo[n.0 as usize].left_sample = NodeId::NULL;
                topo[n.0 as usize].right_sample = NodeId::NULL;
            }

            let mut v = topo[n.0 as usize].left_child;
            while v != NodeId::NULL {
                if topo[v.0 as usize].left_sample != NodeId::NULL {
                    assert!(topo[v.0 as usize].right_sample != NodeId::NULL);
                    if topo[n.0 as usize].left_sample == NodeId::NULL {
                        topo[n.0 as usize].left_sample = topo[v.0 as usize].left_sample;
                    } else {
                        let nright = topo[n.0 as usize].right_sample.0 as usize;
                        let vleft = topo[v.0 as usize].left_sample;
                        topo[nright].next_sample = vleft;
                    }
                    topo[n.0 as usize].right_sample = topo[v.0 as usize].right_sample;
                }
                v = topo[v.0 as usize].right_sib;
            }
            n = topo[n.0 as usize].parent;
        }
    }

    // The cursors only ever move right, so the cost over a full
    // iteration is linear in the table sizes.
    fn update_site_ranges(&mut self) {
        let sites = self.treeseq.tables.sites_.as_slice();
        let mutations = self.treeseq.tables.mutations_.as_slice();
        while self.site_cursor < sites.len() && sites[self.site_cursor].position < self.left {
            self.site_cursor += 1;
        }
        let mut site_end = self.site_cursor;
        while site_end < sites.len() && sites[site_end].position < self.right {
            site_end += 1;
        }
        self.site_range = (self.site_cursor, site_end);

        // Mutations are sorted by site, so the site range
        // determines the mutation range.
        while self.mutation_cursor < mutations.len()
            && (mutations[self.mutation_cursor].site.0 as usize) < self.site_range.0
        {
            self.mutation_cursor += 1;
        }
        let mut mutation_end = self.mutation_cursor;
        while mutation_end < mutations.len()
            && (mutations[mutation_end].site.0 as usize) < self.site_range.1
        {
            mutation_end += 1;
        }
        self.mutation_range = (self.mutation_cursor, mutation_end);
    }

    fn id_in_range<N: Into<NodeId>>(&self, u: N) -> TreesResult<()> {
        let n = u.into();
        if n < 0 || (n.0 as usize) >= self.num_nodes() {
            Err(TreesError::NodeIdOutOfRange)
        } else {
            Ok(())
        }
    }

    fn new(treeseq: &'treeseq TreeSequence, flags: TreeFlags) -> Self {
        Self::new_range(treeseq, flags, Position(0.0), treeseq.tables.genome_length())
    }

    fn new_range(
        treeseq: &'treeseq TreeSequence,
        flags: TreeFlags,
        begin: Position,
        end: Position,
    ) -> Self {
        let mut rv = Self::new_internal(treeseq, flags, begin, end);
        rv.init_samples();
        rv.left_root = rv.samples[0];
        rv
    }

    /// Return an [`Iterator`] over all nodes in the tree.
    ///
    /// # Parameters
    ///
    /// * `order`: A value from [`NodeTraversalOrder`] specifying the
    ///   iteration order.
    // Return value is dyn for later addition of other traversal orders
    pub fn traverse_nodes(
        &self,
        order: NodeTraversalOrder,
    ) -> Box<dyn Iterator<Item = NodeId> + '_> {
        match order {
            NodeTraversalOrder::Preorder => Box::new(PreorderNodeIterator::new(self)),
        }
    }

    /// Return the length of this tree along the genome.
    pub fn span(&self) -> Position {
        self.right - self.left
    }

    /// Return the `[left, right)` [`Position`] for
    /// which this tree is the genealogy.
    ///
    /// For iteration restricted to a genomic interval,
    /// the values are clamped to that interval.
    pub fn range(&self) -> (Position, Position) {
        (self.left, self.right)
    }

    /// Calculate the total length of the tree via a preorder traversal.
    ///
    /// # Parameters
    ///
    /// * `by_span`: if `true`, multiply the return value by [`Tree::span`].
    pub fn total_branch_length(&self, by_span: bool) -> Result<Time, TreesError> {
        let nt = self.treeseq.tables.nodes_.as_slice();
        let mut b: Time = Time(0.);
        for n in self.traverse_nodes(NodeTraversalOrder::Preorder) {
            let p = self.parent(n)?;
            if p != NodeId::NULL {
                // parents are older than children
                b.0 += nt[p.0 as usize].time.0 - nt[n.0 as usize].time.0;
            }
        }

        match by_span {
            true => Ok(Time(b.0 * f64::from(self.span()))),
            false => Ok(b),
        }
    }

    /// Return an [`Iterator`] from the node `u` to the root of the tree,
    /// travering all parent nodes.
    ///
    /// # Errors
    ///
    /// [`TreesError::NodeIdOutOfRange`] if `u` is out of range.
    pub fn parents<N: Into<NodeId> + Copy>(
        &self,
        u: N,
    ) -> Result<impl Iterator<Item = NodeId> + '_, TreesError> {
        self.id_in_range(u)?;
        Ok(ParentsIterator::new(self, u.into()))
    }

    /// Return an [`Iterator`] over the children of node `u`.
    ///
    /// # Errors
    ///
    /// [`TreesError::NodeIdOutOfRange`] if `u` is out of range.
    pub fn children<N: Into<NodeId> + Copy>(
        &self,
        u: N,
    ) -> Result<impl Iterator<Item = NodeId> + '_, TreesError> {
        self.id_in_range(u)?;
        Ok(ChildIterator::new(self, u.into()))
    }

    /// Return an [`Iterator`] over the roots of the tree.
    ///
    /// # Note
    ///
    /// For a tree with multiple roots, the iteration starts
    /// at the left root.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        RootIterator::new(self)
    }

    /// Return all roots as a vector.
    pub fn roots_to_vec(&self) -> Vec<NodeId> {
        let mut v = vec![];

        for r in self.roots() {
            v.push(r);
        }

        v
    }

    /// Return a slice of the samples in this tree.
    pub fn sample_nodes(&self) -> &[NodeId] {
        self.samples
    }

    /// Return an [`Iterator`] over the sample nodes descending from node `u`.
    ///
    ///
    /// # Note
    ///
    /// If `u` is itself a sample, then it is included in the values returned.
    ///
    /// # Errors
    ///
    /// [`TreesError::NodeIdOutOfRange`] if `u` is out of range.
    ///
    /// [`TreesError::NotTrackingSamples`] if [`TreeFlags::TRACK_SAMPLES`] was not used
    /// to initialize `self`.
    pub fn samples<N: Into<NodeId> + Copy>(
        &self,
        u: N,
    ) -> Result<impl Iterator<Item = NodeId> + '_, TreesError> {
        if !self.flags.contains(TreeFlags::TRACK_SAMPLES) {
            Err(TreesError::NotTrackingSamples)
        } else {
            Ok(SamplesIterator::new(self, u.into()))
        }
    }

    /// Collect the sample nodes descending from `u` into `buf`.
    ///
    /// The buffer is cleared first, allowing it to be reused
    /// across trees without reallocation.
    ///
    /// # Parameters
    ///
    /// * `sort`: if `true`, sort the buffer by node id.
    ///   Otherwise the nodes appear in sample-list order.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Tree::samples`].
    pub fn samples_below_into<N: Into<NodeId> + Copy>(
        &self,
        u: N,
        sort: bool,
        buf: &mut Vec<NodeId>,
    ) -> TreesResult<()> {
        buf.clear();
        for s in self.samples(u)? {
            buf.push(s);
        }
        if sort {
            buf.sort_unstable();
        }
        Ok(())
    }

    /// The number of nodes in the tree sequence.
    pub fn num_nodes(&self) -> usize {
        assert_eq!(self.topology.len(), self.treeseq.tables.num_nodes());
        self.treeseq.tables.num_nodes()
    }

    /// The number of samples below node `u`.
    pub fn leaf_counts<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<i32> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.leaf_counts)
    }

    /// The number of ancient samples below node `u`.
    ///
    /// Always zero unless the tree came from
    /// [`TreeSequence::tree_iterator_with_ancient_samples`].
    pub fn preserved_leaf_counts<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<i32> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.preserved_leaf_counts)
    }

    /// The total number of samples, current plus ancient,
    /// below node `u`.
    pub fn sum_of_leaf_counts<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<i32> {
        let n = u.into();
        Ok(self.leaf_counts(n)? + self.preserved_leaf_counts(n)?)
    }

    /// Return an [`Iterator`] over the [`Site`]s whose
    /// positions fall in the current tree's interval.
    pub fn sites(&self) -> impl Iterator<Item = (SiteId, &Site)> + '_ {
        let sites = self.treeseq.tables.sites_.as_slice();
        (self.site_range.0..self.site_range.1).map(move |i| (SiteId::from(i), &sites[i]))
    }

    /// Return the [`MutationRecord`]s whose sites fall in
    /// the current tree's interval.
    pub fn mutations(&self) -> &[MutationRecord] {
        &self.treeseq.tables.mutations_[self.mutation_range.0..self.mutation_range.1]
    }

    pub(crate) fn sample_index(&self, u: NodeId) -> NodeId {
        self.sample_index_map[u.0 as usize]
    }

    pub(crate) fn site_range(&self) -> (usize, usize) {
        self.site_range
    }

    pub(crate) fn mutation_range(&self) -> (usize, usize) {
        self.mutation_range
    }

    /// Return the parent of node `u`.
    pub fn parent<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.parent)
    }

    /// Return the left child of node `u`.
    pub fn left_child<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.left_child)
    }

    /// Return the right child of node `u`.
    pub fn right_child<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.right_child)
    }

    /// Return the left sibling of node `u`.
    pub fn left_sib<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.left_sib)
    }

    /// Return the right sibling of node `u`.
    pub fn right_sib<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.right_sib)
    }

    /// Return the left sample of node `u`.
    pub fn left_sample<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        if !self.flags.contains(TreeFlags::TRACK_SAMPLES) {
            return Err(TreesError::NotTrackingSamples);
        }
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.left_sample)
    }

    /// Return the next sample after node `u`.
    pub fn next_sample<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        if !self.flags.contains(TreeFlags::TRACK_SAMPLES) {
            return Err(TreesError::NotTrackingSamples);
        }
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.next_sample)
    }

    /// Return the right sample of node `u`.
    pub fn right_sample<N: Into<NodeId> + Copy>(&self, u: N) -> TreesResult<NodeId> {
        if !self.flags.contains(TreeFlags::TRACK_SAMPLES) {
            return Err(TreesError::NotTrackingSamples);
        }
        self.id_in_range(u)?;
        // SAFETY: just checked the range.
        Ok(unsafe { self.topology.get_unchecked(u.into().0 as usize) }.right_sample)
    }
}

/// Left-to-right iteration of trees.
impl<'treeseq> streaming_iterator::StreamingIterator for Tree<'treeseq> {
    type Item = Tree<'treeseq>;

    fn advance(&mut self) {
        let tables = &self.treeseq.tables;
        let edge_table = self.treeseq.tables.edges_.as_slice();
        let edge_input_order = tables.edge_input_order.as_slice();
        let edge_output_order = tables.edge_output_order.as_slice();
        loop {
            if self.input_edge_index < edge_input_order.len() || self.x < tables.genome_length() {
                for edge_index in edge_output_order[self.output_edge_index..].iter() {
                    let current_edge = edge_table[*edge_index];
                    if current_edge.right != self.x {
                        break;
                    }
                    let lsib = self.topology[current_edge.child.0 as usize].left_sib;
                    let rsib = self.topology[current_edge.child.0 as usize].right_sib;

                    if lsib == NodeId::NULL {
                        self.topology[current_edge.parent.0 as usize].left_child = rsib;
                    } else {
                        self.topology[lsib.0 as usize].right_sib = rsib;
                    }
                    if rsib == NodeId::NULL {
                        self.topology[current_edge.parent.0 as usize].right_child = lsib;
                    } else {
                        self.topology[rsib.0 as usize].left_sib = lsib;
                    }
                    let child_topo = &mut self.topology[current_edge.child.0 as usize];
                    child_topo.parent = NodeId::NULL;
                    child_topo.left_sib = NodeId::NULL;
                    child_topo.right_sib = NodeId::NULL;

                    self.update_outgoing_leaf_count(current_edge.parent, current_edge.child);

                    if self.flags.contains(TreeFlags::TRACK_SAMPLES) {
                        self.update_samples_list(current_edge.parent);
                    }
                    self.update_outgoing_roots(current_edge.parent, current_edge.child);
                    self.output_edge_index += 1;
                }
                for edge_index in edge_input_order[self.input_edge_index..].iter() {
                    let current_edge = edge_table[*edge_index];
                    if current_edge.left != self.x {
                        break;
                    }
                    let rchild = self.topology[current_edge.parent.0 as usize].right_child;
                    let lsib = self.topology[current_edge.child.0 as usize].left_sib;
                    let rsib = self.topology[current_edge.child.0 as usize].right_sib;

                    if rchild == NodeId::NULL {
                        self.topology[current_edge.parent.0 as usize].left_child =
                            current_edge.child;
                        self.topology[current_edge.child.0 as usize].left_sib = NodeId::NULL;
                    } else {
                        self.topology[rchild.0 as usize].right_sib = current_edge.child;
                        self.topology[current_edge.child.0 as usize].left_sib = rchild;
                    }
                    self.topology[current_edge.child.0 as usize].right_sib = NodeId::NULL;
                    self.topology[current_edge.child.0 as usize].parent = current_edge.parent;
                    self.topology[current_edge.parent.0 as usize].right_child = current_edge.child;

                    self.update_incoming_leaf_count(current_edge.parent, current_edge.child);
                    if self.flags.contains(TreeFlags::TRACK_SAMPLES) {
                        self.update_samples_list(current_edge.parent);
                    }
                    self.update_incoming_roots(current_edge.parent, current_edge.child, lsib, rsib);
                    self.input_edge_index += 1;
                }

                // This is a big "gotcha".
                // The root tracking functions will sometimes
                // result in left_root not actually being the left_root.
                // We loop through the left_sibs to fix that.
                if self.left_root != NodeId::NULL {
                    while self.topology[self.left_root.0 as usize].left_sib != NodeId::NULL {
                        self.left_root = self.topology[self.left_root.0 as usize].left_sib;
                    }
                }

                let mut right = tables.genome_length();
                if self.input_edge_index < edge_input_order.len() {
                    right = min_position(
                        right,
                        edge_table[edge_input_order[self.input_edge_index]].left,
                    );
                }
                if self.output_edge_index < edge_output_order.len() {
                    right = min_position(
                        right,
                        edge_table[edge_output_order[self.output_edge_index]].right,
                    );
                }
                let left = self.x;
                self.x = right;

                // Trees entirely before the requested interval
                // are built but not emitted.
                if right <= self.begin {
                    continue;
                }
                if left >= self.end {
                    self.advanced = false;
                    return;
                }
                self.left = if left < self.begin { self.begin } else { left };
                self.right = min_position(right, self.end);
                self.update_site_ranges();
                self.advanced = true;
                return;
            } else {
                self.advanced = false;
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

/// Error type related to [``TreeSequence``] and [``Tree``].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TreesError {
    /// A [`TablesError`] occurred during tree sequence
    /// construction or traversal.
    #[error("{0:?}")]
    TablesError(#[from] TablesError),
    /// Returned when a [`NodeId`] is not
    /// present in a [`Tree`] or [`TreeSequence`].
    #[error("Node ID out of range")]
    NodeIdOutOfRange,
    /// Returned if a tree sequence is
    /// initialized with no samples.
    #[error("No samples found.")]
    NoSamples,
    /// Returned when there are problems with sample lists.
    #[error("Invalid samples.")]
    InvalidSamples,
    /// Returned if sample lists contain duplicate [`NodeId`].
    #[error("Duplicate samples.")]
    DuplicateSamples,
    /// Returned when information about samples descending
    /// from a node is requested, yet
    /// [`TreeFlags::TRACK_SAMPLES`] is not set.
    #[error("Not tracking samples.")]
    NotTrackingSamples,
    /// Returned when a genomic interval is not a valid
    /// sub-interval of `[0, genome_length)`.
    #[error("Invalid genomic interval: {found:?}")]
    InvalidRange {
        /// The invalid `(begin, end)`.
        found: (Position, Position),
    },
}

/// A tree sequence.
///
/// This is a lightweight wrapper around a
/// [`TableCollection`](crate::TableCollection)
/// and a list of sample nodes.
pub struct TreeSequence {
    tables: crate::TableCollection,
    samples: Vec<NodeId>,
    num_trees: u32,
}

/// Result type for operations on trees and tree sequences.
pub type TreesResult<T> = Result<T, TreesError>;

bitflags! {
    /// Bit flags modifying the behavior of [`TreeSequence`]
    /// initialization.
    pub struct TreeSequenceFlags: u32 {
        /// Do not validate tables when creating a [`TreeSequence`]
        const NO_TABLE_VALIDATION = 1 << 0;
    }
}

impl TreeSequence {
    fn new_from_tables(tables: crate::TableCollection) -> TreesResult<Self> {
        if !tables.is_indexed() {
            return Err(TablesError::TablesNotIndexed.into());
        }
        let mut samples = vec![];
        for (i, n) in tables.nodes_.iter().enumerate() {
            if n.flags & crate::NodeFlags::IS_SAMPLE.bits() > 0 {
                samples.push(NodeId::from(i));
            }
        }
        if samples.is_empty() {
            Err(TreesError::NoSamples)
        } else {
            let num_trees = tables.count_trees()?;
            Ok(Self {
                tables,
                samples,
                num_trees,
            })
        }
    }

    fn validate_samples(tables: &crate::TableCollection, samples: &[NodeId]) -> TreesResult<()> {
        if samples.is_empty() {
            return Err(TreesError::NoSamples);
        }
        let mut seen = vec![0; tables.nodes_.len()];
        for s in samples {
            if *s == NodeId::NULL || (s.0 as usize) >= tables.nodes_.len() {
                return Err(TreesError::InvalidSamples);
            }
            if seen[s.0 as usize] != 0 {
                return Err(TreesError::DuplicateSamples);
            }
            seen[s.0 as usize] = 1;
        }
        Ok(())
    }

    /// Create a new tree sequence from a [`TableCollection`](crate::TableCollection).
    ///
    /// The input tables are consumed, owned by the tree sequence.
    ///
    /// By default, the tables will be validated.
    ///
    /// To disable validation, `flags` should contain
    /// [`TreeSequenceFlags::NO_TABLE_VALIDATION`].
    ///
    /// The list of samples will be populated from the [`node flags`](crate::Node::flags).
    /// Any `flag` containing [`IS_SAMPLE`](crate::NodeFlags::IS_SAMPLE) will be
    /// in the list.
    ///
    /// # Errors
    ///
    /// [`TablesNotIndexed`](crate::TablesError::TablesNotIndexed) if
    /// [`build_indexes`](crate::TableCollection::build_indexes) has not been called.
    ///
    /// [`TablesError`](crate::TablesError) if table validation fails.
    pub fn new(tables: crate::TableCollection, flags: TreeSequenceFlags) -> TreesResult<Self> {
        if !tables.is_indexed() {
            return Err(TablesError::TablesNotIndexed.into());
        }
        if !flags.contains(TreeSequenceFlags::NO_TABLE_VALIDATION) {
            tables.validate(crate::TableValidationFlags::default())?;
        }
        Self::new_from_tables(tables)
    }

    /// Create a new tree sequence from a table collection
    /// and a list of samples.
    ///
    /// Unlike [`TreeSequence::new`], this function ignores node flags and uses the samples
    /// list instead.
    ///
    /// # Errors
    ///
    /// [`TreesError`] if the samples list is invalid.
    pub fn new_with_samples(
        tables: crate::TableCollection,
        samples: &[NodeId],
        flags: TreeSequenceFlags,
    ) -> TreesResult<Self> {
        if !tables.is_indexed() {
            return Err(TablesError::TablesNotIndexed.into());
        }
        if !flags.contains(TreeSequenceFlags::NO_TABLE_VALIDATION) {
            tables.validate(crate::TableValidationFlags::default())?;
        }
        Self::validate_samples(&tables, samples)?;
        let num_trees = tables.count_trees()?;
        Ok(Self {
            tables,
            samples: samples.to_vec(),
            num_trees,
        })
    }

    /// Get a reference to the underlying
    /// [`TableCollection`](crate::TableCollection).
    pub fn tables(&self) -> &crate::TableCollection {
        &self.tables
    }

    /// Move the underlying [`TableCollection`](crate::TableCollection),
    /// consuming `self`.
    pub fn into_tables(self) -> crate::TableCollection {
        self.tables
    }

    /// Get a clone of the underlying [`TableCollection`](crate::TableCollection).
    pub fn tables_copy(&self) -> crate::TableCollection {
        self.tables.clone()
    }

    /// Return a streaming iterator over all [`Tree`]
    /// objects in the tree sequence.
    pub fn tree_iterator(&self, flags: TreeFlags) -> Tree<'_> {
        Tree::new(self, flags)
    }

    /// Return a streaming iterator over the [`Tree`]
    /// objects overlapping `[begin, end)`.
    ///
    /// The emitted `left`/`right` values are clamped
    /// to the requested interval.
    ///
    /// # Errors
    ///
    /// [`TreesError::InvalidRange`] if the interval is not a
    /// valid sub-interval of `[0, genome_length)`.
    pub fn tree_iterator_range<B: Into<Position>, E: Into<Position>>(
        &self,
        flags: TreeFlags,
        begin: B,
        end: E,
    ) -> TreesResult<Tree<'_>> {
        let b = begin.into();
        let e = end.into();
        if !b.is_valid_coordinate()
            || !e.is_valid_coordinate()
            || b >= e
            || e > self.tables.genome_length()
        {
            return Err(TreesError::InvalidRange { found: (b, e) });
        }
        Ok(Tree::new_range(self, flags, b, e))
    }

    /// Return a streaming iterator over all [`Tree`] objects,
    /// additionally tracking the number of ancient samples
    /// below each node.
    ///
    /// Ancient samples do not affect roots, leaf counts of
    /// current samples, nor the output of [`Tree::samples`].
    /// Their counts are available via
    /// [`Tree::preserved_leaf_counts`].
    ///
    /// # Errors
    ///
    /// [`TreesError`] if the ancient samples list contains
    /// invalid or duplicate nodes.
    pub fn tree_iterator_with_ancient_samples(
        &self,
        flags: TreeFlags,
        ancient_samples: &[NodeId],
    ) -> TreesResult<Tree<'_>> {
        let mut seen = vec![0; self.tables.num_nodes()];
        for a in ancient_samples {
            if *a == NodeId::NULL || (a.0 as usize) >= self.tables.num_nodes() {
                return Err(TreesError::InvalidSamples);
            }
            if seen[a.0 as usize] != 0 {
                return Err(TreesError::DuplicateSamples);
            }
            seen[a.0 as usize] = 1;
        }
        let mut tree = Tree::new(self, flags);
        tree.init_ancient_samples(ancient_samples);
        Ok(tree)
    }

    /// The sample nodes.
    pub fn sample_nodes(&self) -> &[NodeId] {
        &self.samples
    }

    /// The number of sample nodes.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// The number of trees in the tree sequence
    pub fn num_trees(&self) -> u32 {
        self.num_trees
    }

    /// The sum of `(parent time - child time) * edge span`
    /// over all edges.
    ///
    /// Equivalent to summing
    /// [`Tree::total_branch_length`]`(true)` over all trees.
    pub fn total_time(&self) -> Time {
        let nodes = self.tables.nodes_.as_slice();
        let mut total = 0.0;
        for e in self.tables.edges_.iter() {
            let dt = nodes[e.parent.0 as usize].time.0 - nodes[e.child.0 as usize].time.0;
            total += dt * (e.right.0 - e.left.0);
        }
        Time(total)
    }
}

use crate::newtypes::{min_position, DemeId, EdgeId, MutationId, NodeId, Position, SiteId, Time};
use bitflags::bitflags;
use std::cmp::Ordering;
use thiserror::Error;

/// Error type related to [``TableCollection``]
#[derive(Error, Debug, PartialEq)]
pub enum TablesError {
    /// Returned by [``TableCollection::new``].
    #[error("Invalid genome length")]
    InvalidGenomeLength,
    /// Returned when invalid node `ID`s are encountered.
    #[error("Invalid node: {found:?}")]
    InvalidNodeValue {
        /// The invalid `ID`
        found: NodeId,
    },
    /// Returned when invalid positions are encountered.
    #[error("Invalid value for position: {found:?}")]
    InvalidPosition {
        /// The invalid position
        found: Position,
    },
    /// Returned when invalid times are encountered.
    #[error("Invalid value for time: {found:?}")]
    InvalidTime {
        /// The invalid time
        found: Time,
    },
    #[error("Invalid value for deme: {found:?}")]
    /// Returned when a deme's `ID` is invalid.
    InvalidDeme {
        /// The invalid deme `ID`
        found: DemeId,
    },
    /// Returned when an [``Edge``]'s left/right
    /// values are invalid.
    #[error("Invalid position range: {found:?}")]
    InvalidLeftRight {
        /// The invalid `(left, right)`.
        found: (Position, Position),
    },
    /// Returned when table validation detects duplicate positions
    /// in a site table.
    #[error("Duplicated site positions found")]
    DuplicatedSitePosition,
    /// Returned when site tables are not sorted by position.
    #[error("Site positions are unsorted")]
    UnsortedSitePosition,
    #[error("Site ID out of bounds")]
    /// Returned when a [``MutationRecord``]'s [`SiteId`] is out of bounds.
    SiteOutOfBounds,
    /// Returned when mutations are not sorted by site.
    #[error("Mutations not sorted by site")]
    UnsortedMutations,
    #[error("Parent is NULL")]
    /// Can be returned by [``validate_edge_table``]
    NullParent,
    #[error("Child is NULL")]
    /// Can be returned by [``validate_edge_table``]
    NullChild,
    #[error("Node is out of bounds")]
    /// Can be returned by [``validate_edge_table``]
    NodeOutOfBounds,
    #[error("Node time order violation")]
    /// Can be returned by [``validate_edge_table``]
    NodeTimesUnordered,
    #[error("Duplicate edges")]
    /// Can be returned by [``validate_edge_table``]
    DuplicateEdges,
    /// Returned when a child inherits from more than
    /// one parent at the same position.
    #[error("Child intervals overlap")]
    OverlappingChildIntervals,
    /// Returned when a [``Node``]'s time field is not finite.
    #[error("Invalid node time")]
    InvalidNodeTime,
    /// Returned when traversal is attempted without
    /// valid table indexes.
    #[error("Tables not indexed")]
    TablesNotIndexed,
}

/// Result type for operations on tables
pub type TablesResult<T> = std::result::Result<T, TablesError>;

/// A Node of a tree sequence
#[derive(Copy, Clone)]
pub struct Node {
    /// Birth time, in generations.
    /// Time increases from leaves to roots:
    /// a parent is strictly older than each
    /// of its children.
    pub time: Time,
    /// Population (deme) of node
    pub deme: DemeId,
    /// Bit flags
    pub flags: u32,
}

/// An Edge is a transmission event
///
/// An edge is a record of transmission of
/// a half-open chunk of genome `[left, right)`
/// from `parent` to `child`.
#[derive(Copy, Clone)]
pub struct Edge {
    /// Left end
    pub left: Position,
    /// Right end
    pub right: Position,
    /// Index of parent in a [NodeTable](type.NodeTable.html)
    pub parent: NodeId,
    /// Index of child in a [NodeTable](type.NodeTable.html)
    pub child: NodeId,
}

/// A Site is the location and
/// ancestral state of a [``MutationRecord``].
#[derive(Clone)]
pub struct Site {
    /// Position of the site
    pub position: Position,
    /// The ancestral state.
    /// [``None``] implies client code
    /// will apply a default.
    pub ancestral_state: Option<Vec<u8>>,
}

/// A MutationRecord is the minimal information
/// needed about a mutation to track it
/// on a tree sequence.
#[derive(Clone)]
pub struct MutationRecord {
    /// The node where the mutation maps
    pub node: NodeId,
    /// Reference to mutation metadata kept
    /// outside of the tables.
    pub key: Option<usize>,
    /// The index of the corresponding [``Site``].
    pub site: SiteId,
    /// The derived state.
    /// [``None``] implies client code
    /// will apply a default.
    pub derived_state: Option<Vec<u8>>,
    /// [``true``] if the mutation does not affect fitness,
    /// [``false``] otherwise.
    pub neutral: bool,
}

/// A node table
pub type NodeTable = Vec<Node>;
/// An edge table
pub type EdgeTable = Vec<Edge>;
/// A site table
pub type SiteTable = Vec<Site>;
/// A Mutation table
pub type MutationTable = Vec<MutationRecord>;

fn position_valid(x: Position) -> TablesResult<()> {
    if !x.is_valid_coordinate() {
        Err(TablesError::InvalidPosition { found: x })
    } else {
        Ok(())
    }
}

fn node_non_negative(x: NodeId) -> TablesResult<()> {
    if x < 0 {
        Err(TablesError::InvalidNodeValue { found: x })
    } else {
        Ok(())
    }
}

fn edge_table_add_row(
    edges: &mut EdgeTable,
    left: Position,
    right: Position,
    parent: NodeId,
    child: NodeId,
) -> TablesResult<EdgeId> {
    position_valid(left)?;
    position_valid(right)?;
    if right <= left {
        return Err(TablesError::InvalidLeftRight {
            found: (left, right),
        });
    }
    node_non_negative(parent)?;
    node_non_negative(child)?;

    edges.push(Edge {
        left,
        right,
        parent,
        child,
    });

    Ok(EdgeId::from(edges.len() - 1))
}

fn node_table_add_row(
    nodes: &mut NodeTable,
    time: Time,
    deme: DemeId,
    flags: u32,
) -> TablesResult<NodeId> {
    if !f64::from(time).is_finite() || f64::from(time) < 0.0 {
        return Err(TablesError::InvalidTime { found: time });
    }
    if deme < 0 {
        return Err(TablesError::InvalidDeme { found: deme });
    }
    nodes.push(Node { time, deme, flags });

    Ok(NodeId::from(nodes.len() - 1))
}

fn site_table_add_row(
    sites: &mut SiteTable,
    position: Position,
    ancestral_state: Option<Vec<u8>>,
) -> TablesResult<SiteId> {
    position_valid(position)?;
    sites.push(Site {
        position,
        ancestral_state,
    });

    Ok(SiteId::from(sites.len() - 1))
}

fn mutation_table_add_row(
    mutations: &mut MutationTable,
    node: NodeId,
    key: Option<usize>,
    site: SiteId,
    derived_state: Option<Vec<u8>>,
    neutral: bool,
) -> TablesResult<MutationId> {
    node_non_negative(node)?;
    if site < 0 {
        return Err(TablesError::SiteOutOfBounds);
    }
    mutations.push(MutationRecord {
        node,
        key,
        site,
        derived_state,
        neutral,
    });

    Ok(MutationId::from(mutations.len() - 1))
}

bitflags! {
    /// Set properties of a [`Node`].
    ///
    /// The first 16 bits are reserved for internal use.
    /// Client code is free to use the remaining bits
    /// as needed.
    #[derive(Default)]
    pub struct NodeFlags: u32 {
        /// Default
        const NONE = 0;
        /// The node is a sample node.
        const IS_SAMPLE = 1 << 0;
    }
}

bitflags! {
    /// Modifies behavior of
    /// [``TableCollection::validate``]
    ///
    /// ```
    /// let f = gentrees::TableValidationFlags::default();
    /// assert_eq!(f.contains(gentrees::TableValidationFlags::VALIDATE_ALL), true);
    /// ```
    pub struct TableValidationFlags: u32 {
        /// Validate the edge table
        const VALIDATE_EDGES = 1<<0;
        /// Validate the site table
        const VALIDATE_SITES = 1<<1;
        /// Validate the mutation table
        const VALIDATE_MUTATIONS = 1<<2;
        /// Validate the node table
        const VALIDATE_NODES = 1<<3;
        /// Validate all tables.
        /// This is also the "default" value.
        const VALIDATE_ALL = Self::VALIDATE_EDGES.bits|Self::VALIDATE_MUTATIONS.bits|Self::VALIDATE_SITES.bits|Self::VALIDATE_NODES.bits;
    }
}

impl Default for TableValidationFlags {
    fn default() -> Self {
        TableValidationFlags::VALIDATE_ALL
    }
}

bitflags! {
    /// Modifies behavior of
    /// [``TableCollection::build_indexes``]
    #[derive(Default)]
    pub struct IndexTablesFlags: u32 {
        /// Default behavior
        const NONE = 0;
        /// Do not validate edge table
        const NO_VALIDATION = 1<<0;
    }
}

/// Perform a data integrity check on an [``EdgeTable``].
///
/// Checks, amongst other things, that every edge
/// satisfies `child.time < parent.time` and that
/// no child inherits from two parents at the same
/// position.
///
/// Unlike index construction, edge storage order is
/// unconstrained: the sweep orderings are built
/// separately by [``TableCollection::build_indexes``].
///
/// # Parameters
///
/// * `len`, the genome length of the tables.
///          Best obtained via [``TableCollection::genome_length``].
/// * `edges`, the [``EdgeTable``]
/// * `nodes`, the [``NodeTable``]
///
/// # Return
///
/// Returns ``Ok(true)`` if the tables pass all tests.
/// This return value allows this function to be used in
/// things like [``debug_assert``].
///
/// # Errors
///
/// Will return [``TablesError``] if the tables are not valid.
///
/// # Example
///
/// ```
/// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
/// // (do some stuff now...)
/// let rv = gentrees::validate_edge_table(tables.genome_length(),
///                                        tables.edges(),
///                                        tables.nodes()).unwrap();
/// assert_eq!(rv, true);
/// ```
pub fn validate_edge_table(len: Position, edges: &[Edge], nodes: &[Node]) -> TablesResult<bool> {
    if edges.is_empty() {
        return Ok(true);
    }
    for edge in edges.iter() {
        if edge.parent == NodeId::NULL {
            return Err(TablesError::NullParent);
        }
        if edge.child == NodeId::NULL {
            return Err(TablesError::NullChild);
        }
        if edge.parent < 0 || edge.parent.0 as usize >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if edge.child < 0 || edge.child.0 as usize >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if !edge.left.is_valid_coordinate() || edge.left > len {
            return Err(TablesError::InvalidPosition { found: edge.left });
        }
        if !edge.right.is_valid_coordinate() || edge.right > len {
            return Err(TablesError::InvalidPosition { found: edge.right });
        }
        if edge.left >= edge.right {
            return Err(TablesError::InvalidLeftRight {
                found: (edge.left, edge.right),
            });
        }

        // time grows from leaves to roots
        if nodes[edge.child.0 as usize].time >= nodes[edge.parent.0 as usize].time {
            return Err(TablesError::NodeTimesUnordered);
        }
    }

    // A child inherits from at most one parent at any position:
    // group edges by child and check the intervals are disjoint.
    let mut by_child: Vec<usize> = (0..edges.len()).collect();
    by_child.sort_by(|a, b| {
        let ea = &edges[*a];
        let eb = &edges[*b];
        match ea.child.cmp(&eb.child) {
            Ordering::Equal => match ea.left.partial_cmp(&eb.left) {
                Some(x) => x,
                None => panic!("invalid edge positions"),
            },
            x => x,
        }
    });
    for w in by_child.windows(2) {
        let prev = &edges[w[0]];
        let cur = &edges[w[1]];
        if prev.child == cur.child {
            if prev.left == cur.left && prev.right == cur.right && prev.parent == cur.parent {
                return Err(TablesError::DuplicateEdges);
            }
            if cur.left < prev.right {
                return Err(TablesError::OverlappingChildIntervals);
            }
        }
    }

    Ok(true)
}

pub fn validate_node_table(nodes: &[Node]) -> TablesResult<()> {
    for n in nodes {
        if !f64::from(n.time).is_finite() {
            return Err(TablesError::InvalidNodeTime);
        }
    }
    Ok(())
}

pub fn validate_site_table(len: Position, sites: &[Site]) -> TablesResult<()> {
    for (i, site) in sites.iter().enumerate() {
        if !site.position.is_valid_coordinate() || site.position >= len {
            return Err(TablesError::InvalidPosition {
                found: site.position,
            });
        }
        if i > 0 {
            if sites[i - 1].position == site.position {
                return Err(TablesError::DuplicatedSitePosition);
            }
            if sites[i - 1].position > site.position {
                return Err(TablesError::UnsortedSitePosition);
            }
        }
    }
    Ok(())
}

pub fn validate_mutation_table(
    mutations: &[MutationRecord],
    sites: &[Site],
    nodes: &[Node],
) -> TablesResult<()> {
    for (i, mutation) in mutations.iter().enumerate() {
        if mutation.site < 0 || (mutation.site.0 as usize) >= sites.len() {
            return Err(TablesError::SiteOutOfBounds);
        }
        if mutation.node < 0 || (mutation.node.0 as usize) >= nodes.len() {
            return Err(TablesError::NodeOutOfBounds);
        }
        if i > 0 && mutations[i - 1].site > mutation.site {
            return Err(TablesError::UnsortedMutations);
        }
    }
    Ok(())
}

/// A collection of node, edge, site, and mutation tables.
///
/// The tables are append-only.  Traversal
/// ([`TreeSequence`](crate::TreeSequence)) requires that
/// [`TableCollection::build_indexes`] has been called after
/// the most recent node/edge addition.
#[derive(Clone)]
pub struct TableCollection {
    length_: Position, // Not visible outside of this module

    pub(crate) nodes_: NodeTable,
    pub(crate) edges_: EdgeTable,
    pub(crate) sites_: SiteTable,
    pub(crate) mutations_: MutationTable,
    pub(crate) edge_input_order: Vec<usize>,
    pub(crate) edge_output_order: Vec<usize>,
    pub(crate) is_indexed: bool,
}

impl TableCollection {
    /// Create a new instance.
    ///
    /// # Parameters
    ///
    /// * `genome_length`: the total genome length for the tables.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if `genome_length` is not
    /// finite and positive.
    pub fn new<P: Into<Position>>(genome_length: P) -> TablesResult<TableCollection> {
        let p = genome_length.into();
        if !f64::from(p).is_finite() || p <= 0.0 {
            return Err(TablesError::InvalidGenomeLength);
        }

        Ok(TableCollection {
            length_: p,
            nodes_: NodeTable::new(),
            edges_: EdgeTable::new(),
            sites_: SiteTable::new(),
            mutations_: MutationTable::new(),
            edge_input_order: vec![],
            edge_output_order: vec![],
            is_indexed: false,
        })
    }

    /// Add a [``Node``] to the [``NodeTable``]
    ///
    /// # Parameters
    ///
    /// * `time`, the birth time.
    /// * `deme`, the deme where the node is found.
    ///
    /// # Returns
    ///
    /// A [``NodeId``].
    ///
    /// # Side effects
    ///
    /// Adding a node invalidates current table indexes.
    /// Therefore, this function results in [`TableCollection::is_indexed`]
    /// returning false.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if `deme < 0` or `time` is
    /// not finite and non-negative.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_node(1.0, 0).unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_node<T: Into<Time>, D: Into<DemeId> + Copy>(
        &mut self,
        time: T,
        deme: D,
    ) -> TablesResult<NodeId> {
        self.add_node_with_flags(time, deme, NodeFlags::default().bits())
    }

    /// Add a [``Node``] to the [``NodeTable``] with flags set.
    ///
    /// # Parameters
    ///
    /// * `time`: the birth time.
    /// * `deme`: the deme where the node is found.
    /// * `flags`: node flags.  See [`NodeFlags`].
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_node_with_flags(1.0, 0,
    ///     gentrees::NodeFlags::IS_SAMPLE.bits()).unwrap();
    /// assert_eq!(id, 0);
    /// assert!(tables.node(0).flags & gentrees::NodeFlags::IS_SAMPLE.bits() > 0);
    /// ```
    pub fn add_node_with_flags<T: Into<Time>, D: Into<DemeId> + Copy>(
        &mut self,
        time: T,
        deme: D,
        flags: u32,
    ) -> TablesResult<NodeId> {
        self.is_indexed = false;
        node_table_add_row(&mut self.nodes_, time.into(), deme.into(), flags)
    }

    /// Add an [``Edge``] to the [``EdgeTable``].
    ///
    /// # Parameters
    ///
    /// * `left`, the left end of the edge
    /// * `right`, the right end of the edge
    /// * `parent`, the parent of the edge
    /// * `child`, the child of the edge
    ///
    /// # Side effects
    ///
    /// Adding an edge invalidates current table indexes.
    /// Therefore, this function results in [`TableCollection::is_indexed`]
    /// returning false.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if any of the input
    /// are invalid.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_edge(0.0, 3.0, 5, 9).unwrap();
    /// assert_eq!(id, 0);
    /// ```
    pub fn add_edge<L: Into<Position>, R: Into<Position>, P: Into<NodeId>, C: Into<NodeId>>(
        &mut self,
        left: L,
        right: R,
        parent: P,
        child: C,
    ) -> TablesResult<EdgeId> {
        self.is_indexed = false;
        edge_table_add_row(
            &mut self.edges_,
            left.into(),
            right.into(),
            parent.into(),
            child.into(),
        )
    }

    /// Add a [``Site``] to the [``SiteTable``];
    ///
    /// # Parameters
    ///
    /// * `position`, the position of the site.
    /// * `ancestral_state`, the ancestral state at this site.
    ///
    /// # Notes
    ///
    /// If no `ancestral_state` is provided ([``None``]), then
    /// client code is assumed to have some default in mind.
    ///
    /// Sites must be added in increasing order of position;
    /// [`TableCollection::validate`] enforces this.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if the position is not
    /// in `[0, genome_length)`.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_site(3.0, vec![b'A']).unwrap();
    /// assert_eq!(id, 0);
    /// assert_eq!(tables.site(id).ancestral_state.as_ref().unwrap(), &vec![b'A']);
    /// ```
    pub fn add_site<P: Into<Position>, A: Into<Option<Vec<u8>>>>(
        &mut self,
        position: P,
        ancestral_state: A,
    ) -> TablesResult<SiteId> {
        let p = position.into();
        if !p.is_valid_coordinate() || p >= self.length_ {
            return Err(TablesError::InvalidPosition { found: p });
        }
        site_table_add_row(&mut self.sites_, p, ancestral_state.into())
    }

    /// Add a [``MutationRecord``] to the [``MutationTable``].
    ///
    /// # Parameters
    ///
    /// * `node`, the node where the mutation maps.
    /// * `key`, index of the mutation's metadata in an external store.
    /// * `site`, the id of the mutation's [``Site``].
    /// * `derived_state`, the derived state of the variant.
    /// * `neutral`, [``true``] if the mutation does not affect fitness,
    ///              [``false``] otherwise.
    ///
    /// # Errors
    ///
    /// Will return [``TablesError``] if any of the input
    /// are invalid.
    ///
    /// # Example
    ///
    /// ```
    /// let mut tables = gentrees::TableCollection::new(100.0).unwrap();
    /// let id = tables.add_mutation(0, 1, 0, vec![b'T'], false).unwrap();
    /// assert_eq!(id, 0);
    /// assert_eq!(tables.mutation(id).derived_state.as_ref().unwrap(), &vec![b'T']);
    /// ```
    pub fn add_mutation<
        N: Into<NodeId>,
        K: Into<Option<usize>>,
        S: Into<SiteId>,
        D: Into<Option<Vec<u8>>>,
    >(
        &mut self,
        node: N,
        key: K,
        site: S,
        derived_state: D,
        neutral: bool,
    ) -> TablesResult<MutationId> {
        mutation_table_add_row(
            &mut self.mutations_,
            node.into(),
            key.into(),
            site.into(),
            derived_state.into(),
            neutral,
        )
    }

    /// Get genome length
    pub fn genome_length(&self) -> Position {
        self.length_
    }

    /// Return immutable reference to the [mutation table](type.MutationTable.html)
    pub fn mutations(&self) -> &[MutationRecord] {
        &self.mutations_
    }

    /// Return immutable reference to the [edge table](type.EdgeTable.html)
    pub fn edges(&self) -> &[Edge] {
        &self.edges_
    }

    /// Return number of edges
    pub fn num_edges(&self) -> usize {
        self.edges_.len()
    }

    /// Return number of nodes
    pub fn num_nodes(&self) -> usize {
        self.nodes_.len()
    }

    /// Return number of sites
    pub fn num_sites(&self) -> usize {
        self.sites_.len()
    }

    /// Return number of mutations
    pub fn num_mutations(&self) -> usize {
        self.mutations_.len()
    }

    /// Return immutable reference to [node table](type.NodeTable.html)
    pub fn nodes(&self) -> &[Node] {
        &self.nodes_
    }

    /// Return the i-th [``Node``].
    pub fn node<N: Into<NodeId>>(&self, i: N) -> &Node {
        &self.nodes_[i.into().0 as usize]
    }

    /// Return the i-th [``Edge``].
    pub fn edge<E: Into<EdgeId>>(&self, i: E) -> &Edge {
        &self.edges_[i.into().0 as usize]
    }

    /// Return the i-th [``Site``].
    pub fn site<S: Into<SiteId>>(&self, i: S) -> &Site {
        &self.sites_[i.into().0 as usize]
    }

    /// Return the i-th [``MutationRecord``].
    pub fn mutation<M: Into<MutationId>>(&self, i: M) -> &MutationRecord {
        &self.mutations_[i.into().0 as usize]
    }

    /// Return immutable reference to [site table](type.SiteTable.html)
    pub fn sites(&self) -> &[Site] {
        &self.sites_
    }

    /// Run a validation check on the tables.
    pub fn validate(&self, flags: TableValidationFlags) -> TablesResult<bool> {
        if flags.contains(TableValidationFlags::VALIDATE_EDGES) {
            validate_edge_table(self.genome_length(), &self.edges_, &self.nodes_)?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_NODES) {
            validate_node_table(self.nodes())?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_SITES) {
            validate_site_table(self.genome_length(), self.sites())?;
        }
        if flags.contains(TableValidationFlags::VALIDATE_MUTATIONS) {
            validate_mutation_table(self.mutations(), self.sites(), self.nodes())?;
        }
        Ok(true)
    }

    // Ascending left; ties broken by descending parent time,
    // then parent id, then child id.
    // SAFETY: the bounds are guaranteed by build_indexes
    fn sort_edge_input_order(edges: &[Edge], nodes: &[Node], edge_input_order: &mut Vec<usize>) {
        edge_input_order.sort_by(|a, b| {
            let ea = unsafe { edges.get_unchecked(*a) };
            let eb = unsafe { edges.get_unchecked(*b) };
            match ea.left.partial_cmp(&eb.left) {
                Some(Ordering::Equal) => {
                    let ta = unsafe { *nodes.get_unchecked(ea.parent.0 as usize) }.time;
                    let tb = unsafe { *nodes.get_unchecked(eb.parent.0 as usize) }.time;
                    match ta.partial_cmp(&tb) {
                        Some(Ordering::Equal) => match ea.parent.cmp(&eb.parent) {
                            Ordering::Equal => ea.child.cmp(&eb.child),
                            x => x,
                        },
                        Some(x) => x.reverse(),
                        None => panic!("invalid parent times"),
                    }
                }
                Some(x) => x,
                None => panic!("invalid edge positions"),
            }
        });
    }

    // Ascending right; ties broken by ascending parent time,
    // then parent id, then child id.
    // SAFETY: the bounds are guaranteed by build_indexes
    fn sort_edge_output_order(edges: &[Edge], nodes: &[Node], edge_output_order: &mut Vec<usize>) {
        edge_output_order.sort_by(|a, b| {
            let ea = unsafe { edges.get_unchecked(*a) };
            let eb = unsafe { edges.get_unchecked(*b) };
            match ea.right.partial_cmp(&eb.right) {
                Some(Ordering::Equal) => {
                    let ta = unsafe { *nodes.get_unchecked(ea.parent.0 as usize) }.time;
                    let tb = unsafe { *nodes.get_unchecked(eb.parent.0 as usize) }.time;
                    match ta.partial_cmp(&tb) {
                        Some(Ordering::Equal) => match ea.parent.cmp(&eb.parent) {
                            Ordering::Equal => ea.child.cmp(&eb.child),
                            x => x,
                        },
                        Some(x) => x,
                        None => panic!("invalid parent times"),
                    }
                }
                Some(x) => x,
                None => panic!("invalid edge positions"),
            }
        });
    }

    /// Build table indexes
    ///
    /// Generates the two edge orderings driving tree traversal:
    /// the input order (ascending `left`, ties broken by descending
    /// parent time) and the output order (ascending `right`, ties
    /// broken by ascending parent time).
    ///
    /// # Parameters
    ///
    /// * `flags`, see [`IndexTablesFlags`].
    ///
    /// # Errors
    ///
    /// [`TablesError`] if the input data are invalid.
    pub fn build_indexes(&mut self, flags: IndexTablesFlags) -> TablesResult<()> {
        if !flags.contains(IndexTablesFlags::NO_VALIDATION) {
            validate_edge_table(self.genome_length(), &self.edges_, &self.nodes_)?;
        }
        self.edge_input_order.clear();
        self.edge_output_order.clear();
        for (i, e) in self.edges_.iter().enumerate() {
            if e.parent == NodeId::NULL {
                return Err(TablesError::NullParent);
            }
            if e.child == NodeId::NULL {
                return Err(TablesError::NullChild);
            }
            if e.parent >= self.nodes_.len() as i32 {
                return Err(TablesError::NodeOutOfBounds);
            }
            if e.child >= self.nodes_.len() as i32 {
                return Err(TablesError::NodeOutOfBounds);
            }
            self.edge_input_order.push(i);
            self.edge_output_order.push(i);
        }
        Self::sort_edge_input_order(&self.edges_, &self.nodes_, &mut self.edge_input_order);
        Self::sort_edge_output_order(&self.edges_, &self.nodes_, &mut self.edge_output_order);
        self.is_indexed = true;
        Ok(())
    }

    /// Get the edge input order.
    ///
    /// The input order is generated by [`TableCollection::build_indexes`].
    ///
    /// Returns `None` if `self.is_indexed() == false`.
    pub fn edge_input_order(&self) -> Option<&[usize]> {
        if self.is_indexed {
            Some(&self.edge_input_order)
        } else {
            None
        }
    }

    /// Get the edge output order.
    ///
    /// The output order is generated by [`TableCollection::build_indexes`].
    ///
    /// Returns `None` if `self.is_indexed() == false`.
    pub fn edge_output_order(&self) -> Option<&[usize]> {
        if self.is_indexed {
            Some(&self.edge_output_order)
        } else {
            None
        }
    }

    /// Return `true` if tables are indexed, `false` otherwise.
    pub fn is_indexed(&self) -> bool {
        self.is_indexed
    }

    /// Count number of trees in O(E) time, where E
    /// is length of edge table.
    ///
    /// # Errors
    ///
    /// [`TablesError::TablesNotIndexed`] if tables are not indexed
    pub fn count_trees(&self) -> TablesResult<u32> {
        if !self.is_indexed() {
            Err(TablesError::TablesNotIndexed)
        } else {
            let mut num_trees = 0;
            let mut input_index: usize = 0;
            let mut output_index: usize = 0;
            let input = self.edge_input_order.as_slice();
            let output = self.edge_output_order.as_slice();
            let edges = self.edges_.as_slice();

            let mut tree_left = Position(0.0);
            while input_index < input.len() || tree_left < self.genome_length() {
                for idx in output[output_index..].iter() {
                    if edges[*idx].right != tree_left {
                        break;
                    }
                    output_index += 1;
                }
                for idx in input[input_index..].iter() {
                    if edges[*idx].left != tree_left {
                        break;
                    }
                    input_index += 1;
                }
                let mut tree_right = self.genome_length();
                if input_index < input.len() {
                    tree_right = min_position(tree_right, edges[input[input_index]].left);
                }
                if output_index < output.len() {
                    tree_right = min_position(tree_right, edges[output[output_index]].right);
                }
                tree_left = tree_right;
                num_trees += 1;
            }
            Ok(num_trees)
        }
    }
}

#[cfg(test)]
mod test_tables {

    use super::*;

    #[test]
    fn test_bad_genome_length() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let _ = TableCollection::new(bad).map_or_else(
                |x: TablesError| assert_eq!(x, TablesError::InvalidGenomeLength),
                |_| panic!(),
            );
        }
    }

    #[test]
    fn test_add_edge() {
        let mut tables = TableCollection::new(10.0).unwrap();

        let result = tables.add_edge(0.0, 1.0, 2, 3).unwrap();

        assert_eq!(0, result);
        assert_eq!(1, tables.edges().len());
        assert_eq!(1, tables.num_edges());
    }

    #[test]
    fn test_add_edge_bad_positions() {
        let mut tables = TableCollection::new(10.0).unwrap();

        let _ = tables.add_edge(-1.0, 1.0, 1, 2).map_or_else(
            |x: TablesError| {
                assert_eq!(
                    x,
                    TablesError::InvalidPosition {
                        found: Position(-1.0)
                    }
                )
            },
            |_| panic!(),
        );

        let _ = tables.add_edge(1.0, 0.5, 1, 2).map_or_else(
            |x: TablesError| {
                assert_eq!(
                    x,
                    TablesError::InvalidLeftRight {
                        found: (Position(1.0), Position(0.5))
                    }
                )
            },
            |_| panic!(),
        );

        assert!(tables.add_edge(f64::NAN, 1.0, 1, 2).is_err());
    }

    #[test]
    fn test_add_edge_bad_nodes() {
        let mut tables = TableCollection::new(10.0).unwrap();

        let _ = tables.add_edge(0.0, 1.0, -1, 2).map_or_else(
            |x: TablesError| {
                assert_eq!(
                    x,
                    TablesError::InvalidNodeValue {
                        found: NodeId::NULL
                    }
                )
            },
            |_| panic!(),
        );

        let _ = tables.add_edge(0.0, 1.0, 1, -2).map_or_else(
            |x: TablesError| {
                assert_eq!(
                    x,
                    TablesError::InvalidNodeValue {
                        found: NodeId::NULL
                    }
                )
            },
            |_| panic!(),
        );
    }

    #[test]
    fn test_add_node_bad_input() {
        let mut tables = TableCollection::new(10.0).unwrap();
        assert!(tables.add_node(-1.0, 0).is_err());
        assert!(tables.add_node(f64::NAN, 0).is_err());
        assert!(tables.add_node(1.0, -1).is_err());
    }

    #[test]
    #[should_panic]
    fn test_add_site_negative_position() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_site(-1.0, None).unwrap();
    }

    #[test]
    #[should_panic]
    fn test_add_site_position_too_big() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_site(tables.genome_length(), None).unwrap();
    }

    #[test]
    fn test_add_site_with_ancestral_state() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let _ = tables
            .add_site(1.0, Some(b"0".to_vec()))
            .map_or_else(|_: TablesError| panic!(), |_| ());
        let s = tables.site(0);
        assert_eq!(s.position, 1.0);
        assert_eq!(s.ancestral_state, Some(b"0".to_vec()));
    }

    #[test]
    fn test_add_site_without_ancestral_state() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let _ = tables
            .add_site(1.0, None)
            .map_or_else(|_: TablesError| panic!(), |_| ());
        let s = tables.site(0);
        if s.ancestral_state.as_ref().is_some() {
            panic!()
        }
    }

    #[test]
    fn test_add_mutation_without_derived_state() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let _ = tables.add_mutation(0, None, 0, None, false).unwrap();
        let m = tables.mutation(0);
        if m.derived_state.as_ref().is_some() {
            panic!()
        }
    }

    #[test]
    fn test_add_mutation_with_derived_state() {
        let mut tables = TableCollection::new(10.0).unwrap();
        let _ = tables
            .add_mutation(0, None, 0, Some(b"0".to_vec()), false)
            .unwrap();
        let m = tables.mutation(0);
        match std::str::from_utf8(m.derived_state.as_ref().unwrap()) {
            Ok(x) => assert_eq!(x, "0".to_string()),
            Err(_) => panic!(),
        }
    }

    #[test]
    #[allow(clippy::redundant_clone)]
    fn test_clone_tables() {
        let mut tables = TableCollection::new(10.0).unwrap();
        tables.add_edge(0.0, 5.0, 0, 1).unwrap();
        let tclone = tables.clone();

        assert_eq!(tclone.edges().len(), 1);
        let e = tclone.edge(0);
        assert_eq!(e.left, 0.0);
        assert_eq!(e.right, 5.0);
        assert_eq!(e.parent, 0);
        assert_eq!(e.child, 1);
    }

    #[test]
    fn test_node_flags() {
        let mut x = NodeFlags::IS_SAMPLE.bits();
        assert!(x & NodeFlags::IS_SAMPLE.bits() > 0);
        x &= !NodeFlags::IS_SAMPLE.bits();
        assert!(x & NodeFlags::IS_SAMPLE.bits() == 0);
    }
}

#[cfg(test)]
mod test_table_indexing {
    use super::*;

    fn two_parent_tables() -> TableCollection {
        let mut t = TableCollection::new(1.0).unwrap();
        t.add_node(2.0, 0).unwrap(); // 0: root
        t.add_node(1.0, 0).unwrap(); // 1: internal
        for _ in 0..3 {
            t.add_node(0.0, 0).unwrap(); // 2..=4: leaves
        }
        t.add_edge(0.0, 1.0, 0, 1).unwrap();
        t.add_edge(0.0, 1.0, 0, 2).unwrap();
        t.add_edge(0.0, 1.0, 1, 3).unwrap();
        t.add_edge(0.0, 1.0, 1, 4).unwrap();
        t
    }

    #[test]
    fn test_edge_out_of_range() {
        let mut t = TableCollection::new(1.0).unwrap();
        t.add_node(0.0, 0).unwrap();
        t.add_edge(0.0, 1.0, 0, 1).unwrap();
        assert!(t.build_indexes(IndexTablesFlags::default()).is_err());
    }

    #[test]
    fn test_unordered_node_times() {
        let mut t = TableCollection::new(1.0).unwrap();
        t.add_node(0.0, 0).unwrap();
        t.add_node(1.0, 0).unwrap();
        // parent is younger than child
        t.add_edge(0.0, 1.0, 0, 1).unwrap();
        assert_eq!(
            validate_edge_table(t.genome_length(), t.edges(), t.nodes()),
            Err(TablesError::NodeTimesUnordered)
        );
    }

    #[test]
    fn test_overlapping_child_intervals() {
        let mut t = TableCollection::new(1.0).unwrap();
        t.add_node(2.0, 0).unwrap();
        t.add_node(1.0, 0).unwrap();
        t.add_node(0.0, 0).unwrap();
        t.add_edge(0.0, 0.75, 0, 2).unwrap();
        t.add_edge(0.5, 1.0, 1, 2).unwrap();
        assert_eq!(
            validate_edge_table(t.genome_length(), t.edges(), t.nodes()),
            Err(TablesError::OverlappingChildIntervals)
        );
    }

    #[test]
    fn test_duplicate_edges() {
        let mut t = TableCollection::new(1.0).unwrap();
        t.add_node(1.0, 0).unwrap();
        t.add_node(0.0, 0).unwrap();
        t.add_edge(0.0, 1.0, 0, 1).unwrap();
        t.add_edge(0.0, 1.0, 0, 1).unwrap();
        assert_eq!(
            validate_edge_table(t.genome_length(), t.edges(), t.nodes()),
            Err(TablesError::DuplicateEdges)
        );
    }

    #[test]
    fn test_input_order_ties_broken_by_descending_parent_time() {
        let mut t = two_parent_tables();
        t.build_indexes(IndexTablesFlags::empty()).unwrap();

        let input = t.edge_input_order().unwrap();
        assert_eq!(input.len(), t.edges().len());
        for w in input.windows(2) {
            let ea = t.edge(EdgeId::from(w[0]));
            let eb = t.edge(EdgeId::from(w[1]));
            if ea.left == eb.left {
                let ta = t.node(ea.parent).time;
                let tb = t.node(eb.parent).time;
                assert!(ta >= tb);
            } else {
                assert!(ea.left < eb.left);
            }
        }
    }

    #[test]
    fn test_output_order_ties_broken_by_ascending_parent_time() {
        let mut t = two_parent_tables();
        t.build_indexes(IndexTablesFlags::empty()).unwrap();

        let output = t.edge_output_order().unwrap();
        assert_eq!(output.len(), t.edges().len());
        for w in output.windows(2) {
            let ea = t.edge(EdgeId::from(w[0]));
            let eb = t.edge(EdgeId::from(w[1]));
            if ea.right == eb.right {
                let ta = t.node(ea.parent).time;
                let tb = t.node(eb.parent).time;
                assert!(ta <= tb);
            } else {
                assert!(ea.right < eb.right);
            }
        }
    }

    #[test]
    fn test_is_indexed() {
        let mut t = two_parent_tables();
        t.build_indexes(IndexTablesFlags::default()).unwrap();
        assert!(t.is_indexed());

        t.add_edge(0.0, 1.0, 0, 3).unwrap();
        assert!(!t.is_indexed());
        assert!(t.edge_input_order().is_none());
        assert!(t.edge_output_order().is_none());

        t.add_node(0.0, 0).unwrap();
        assert!(!t.is_indexed());
    }

    #[test]
    fn test_count_trees_unindexed() {
        let t = two_parent_tables();
        assert_eq!(t.count_trees(), Err(TablesError::TablesNotIndexed));
    }
}

//! Table collections and tree sequences
//! implemented from the ground up in rust.
//!
//! The tables ([``TableCollection``]) are a succinct
//! encoding of the genealogy of a sample of genomes:
//! nodes, edges, sites, and mutations.  A
//! [``TreeSequence``] provides efficient left-to-right
//! traversal of the marginal trees, iteration over
//! variants ([``VariantIterator``]), and tabulation of
//! allele frequency spectra ([``fs``]).
//!
//! Some conventions:
//!
//! 1. Time moves from the present to the past.
//!    Thus, parent nodes have time values *greater than*
//!    those of their children.
//! 2. The data layout is "array of structures".
//! 3. Metadata is not part of the tables.
//!    A [``MutationRecord``] carries an optional key
//!    into storage managed by client code.
//! 4. Genomic locations are continuous
//!    (see [``Position``]).

// NOTE: uncomment the next line in order to find
// stuff that needs documenting:
// #![warn(missing_docs)]

mod macros;

mod fs;
mod newtypes;
mod tables;
mod traits;
mod trees;
mod variants;

pub use fs::*;
pub use newtypes::*;
pub use tables::*;
pub use traits::*;
pub use trees::*;
pub use variants::*;
pub mod prelude;

/// Get the gentrees version number.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Installer metadata probing, binary identity gating, and the mod
//! component tree.
//!
//! [`probe::InstallerProbe`] drives the installer binary through its
//! "query mode" command lines to recover a mod's language list and
//! per-language [`component::ComponentTree`]. [`gate`] hashes a candidate
//! installer binary and checks it against a bundled allow-list before it is
//! ever executed.

mod charset;
mod component;
pub mod error;
pub mod gate;
mod probe;

pub use charset::charset_candidates_for;
pub use component::{
    build_component_tree, ComponentId, ComponentNode, ComponentTree, GroupId, GroupNode,
    RootChild, SubGroupId, SubGroupNode,
};
pub use error::ProbeError;
pub use probe::{InstallerProbe, InstallerProbeBuilder, DEFAULT_LANGUAGE_PLACEHOLDER};

//! Structural diff and merge of BYML trees
//!
//! A diff records how a modified tree differs from its vanilla counterpart.
//! Merging replays any number of such diffs onto a base in priority order.
//!
//! # Diffing Trees
//!
//! ```
//! use tkmerge::diff::{ArrayRules, diff_byml};
//! use tkmerge::formats::Byml;
//!
//! let vanilla = Byml::map([("Life", Byml::Int(10)), ("Speed", Byml::Float(1.0))]);
//! let modded = Byml::map([("Life", Byml::Int(40)), ("Speed", Byml::Float(1.0))]);
//!
//! let changelog = diff_byml(&modded, &vanilla, &ArrayRules::new())?;
//! assert_eq!(changelog, Some(Byml::map([("Life", Byml::Int(40))])));
//! # Ok::<(), tkmerge::Error>(())
//! ```
//!
//! # Merging Changelogs
//!
//! ```
//! use tkmerge::diff::{ArrayRules, diff_byml, merge_changelogs};
//! use tkmerge::formats::Byml;
//!
//! let rules = ArrayRules::new();
//! let vanilla = Byml::map([("Life", Byml::Int(10)), ("Speed", Byml::Int(1))]);
//! let a = diff_byml(&Byml::map([("Life", Byml::Int(40)), ("Speed", Byml::Int(1))]), &vanilla, &rules)?;
//! let b = diff_byml(&Byml::map([("Life", Byml::Int(10)), ("Speed", Byml::Int(3))]), &vanilla, &rules)?;
//!
//! let mut merged = vanilla.clone();
//! merge_changelogs(&mut merged, a.iter().chain(b.iter()), &rules)?;
//! assert_eq!(merged, Byml::map([("Life", Byml::Int(40)), ("Speed", Byml::Int(3))]));
//! # Ok::<(), tkmerge::Error>(())
//! ```
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

mod array;
mod byml_diff;
mod merge;
mod tracking;
mod types;

pub use array::{ArrayRule, ArrayRules, ArrayStrategy, diff_array};
pub use byml_diff::{diff, diff_byml};
pub use merge::{apply_changelog, merge_changelogs, merge_into};
pub use tracking::MergeTracking;
pub use types::{
    ArrayChange, ArrayChangelog, ArrayKeySpec, ChangeKind, DiffOptions, KeyValue, NodePath,
    PathSegment,
};

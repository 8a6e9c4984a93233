//! Generic tree handler

use crate::canonical::TkPath;
use crate::diff::{ArrayRules, diff_byml, merge_changelogs};
use crate::error::Result;
use crate::formats::Byml;

use super::{BuildContext, BuildOutcome, FormatHandler, MergeContext};

/// Diffs `.byml` / `.bgyml` files as trees
#[derive(Debug, Clone, Default)]
pub struct TreeHandler {
    rules: ArrayRules,
}

impl TreeHandler {
    #[must_use]
    pub fn new(rules: ArrayRules) -> Self {
        Self { rules }
    }
}

impl FormatHandler for TreeHandler {
    fn name(&self) -> &'static str {
        "byml"
    }

    fn build(
        &self,
        _ctx: &BuildContext<'_>,
        _path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let source = Byml::from_bytes(source)?;
        let vanilla = match vanilla {
            Some(vanilla) => Byml::from_bytes(vanilla)?,
            None => return Ok(BuildOutcome::Empty),
        };
        match diff_byml(&source, &vanilla, &self.rules)? {
            Some(changelog) => Ok(BuildOutcome::Changelog(changelog.to_bytes()?)),
            None => Ok(BuildOutcome::Empty),
        }
    }

    fn merge(
        &self,
        _ctx: &MergeContext<'_>,
        path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let mut tree = Byml::from_bytes(&base)?;
        let changelogs = changelogs
            .iter()
            .map(|data| Byml::from_bytes(data))
            .collect::<Result<Vec<_>>>()?;
        merge_changelogs(&mut tree, &changelogs, &self.rules)?;
        tracing::debug!("{}: merged {} changelogs", path, changelogs.len());
        tree.to_bytes()
    }
}

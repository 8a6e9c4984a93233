//! Keyed table handlers

use std::sync::Arc;

use crate::canonical::TkPath;
use crate::diff::ArrayRules;
use crate::error::Result;
use crate::formats::Byml;
use crate::tables::{
    GameDataIndex, RsdbTableDef, TableIndex, diff_game_data, diff_rsdb, diff_tags,
    merge_game_data, merge_rsdb, merge_tags,
};

use super::{BuildContext, BuildOutcome, FormatHandler, MergeContext};

fn outcome(changelog: Option<Byml>) -> Result<BuildOutcome> {
    match changelog {
        Some(changelog) => Ok(BuildOutcome::Changelog(changelog.to_bytes()?)),
        None => Ok(BuildOutcome::Empty),
    }
}

fn parse_all(changelogs: &[Vec<u8>]) -> Result<Vec<Byml>> {
    changelogs.iter().map(|data| Byml::from_bytes(data)).collect()
}

/// One RSDB table
#[derive(Debug, Clone)]
pub struct RsdbHandler {
    table: RsdbTableDef,
    index: Arc<TableIndex>,
    rules: ArrayRules,
    track_removals: bool,
}

impl RsdbHandler {
    #[must_use]
    pub fn new(
        table: RsdbTableDef,
        index: Arc<TableIndex>,
        rules: ArrayRules,
        track_removals: bool,
    ) -> Self {
        Self {
            table,
            index,
            rules,
            track_removals,
        }
    }
}

impl FormatHandler for RsdbHandler {
    fn name(&self) -> &'static str {
        "rsdb"
    }

    fn build(
        &self,
        ctx: &BuildContext<'_>,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let Some(vanilla) = vanilla else {
            return Ok(BuildOutcome::Empty);
        };
        outcome(diff_rsdb(
            &self.table,
            &Byml::from_bytes(source)?,
            &Byml::from_bytes(vanilla)?,
            &self.index,
            ctx.table_version(path.version),
            &self.rules,
            self.track_removals,
        )?)
    }

    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        _path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let mut table = Byml::from_bytes(&base)?;
        merge_rsdb(
            &self.table,
            &mut table,
            &parse_all(changelogs)?,
            &self.index,
            ctx.game_version(),
            &self.rules,
        )?;
        table.to_bytes()
    }
}

/// The actor tag table
#[derive(Debug, Clone)]
pub struct TagHandler {
    index: Arc<TableIndex>,
}

impl TagHandler {
    #[must_use]
    pub fn new(index: Arc<TableIndex>) -> Self {
        Self { index }
    }
}

impl FormatHandler for TagHandler {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn build(
        &self,
        ctx: &BuildContext<'_>,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let Some(vanilla) = vanilla else {
            return Ok(BuildOutcome::Empty);
        };
        outcome(diff_tags(
            &Byml::from_bytes(source)?,
            &Byml::from_bytes(vanilla)?,
            &self.index,
            ctx.table_version(path.version),
        )?)
    }

    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        _path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        merge_tags(
            &Byml::from_bytes(&base)?,
            &parse_all(changelogs)?,
            &self.index,
            ctx.game_version(),
        )?
        .to_bytes()
    }
}

/// The GameData list
#[derive(Debug, Clone)]
pub struct GameDataHandler {
    index: Arc<GameDataIndex>,
    rules: ArrayRules,
}

impl GameDataHandler {
    #[must_use]
    pub fn new(index: Arc<GameDataIndex>, rules: ArrayRules) -> Self {
        Self { index, rules }
    }
}

impl FormatHandler for GameDataHandler {
    fn name(&self) -> &'static str {
        "game_data"
    }

    fn build(
        &self,
        ctx: &BuildContext<'_>,
        path: &TkPath,
        source: &[u8],
        vanilla: Option<&[u8]>,
    ) -> Result<BuildOutcome> {
        let Some(vanilla) = vanilla else {
            return Ok(BuildOutcome::Empty);
        };
        outcome(diff_game_data(
            &Byml::from_bytes(source)?,
            &Byml::from_bytes(vanilla)?,
            &self.index,
            ctx.table_version(path.version),
            &self.rules,
        )?)
    }

    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        _path: &TkPath,
        base: Vec<u8>,
        changelogs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let mut data = Byml::from_bytes(&base)?;
        merge_game_data(
            &mut data,
            &parse_all(changelogs)?,
            &self.index,
            ctx.game_version(),
            &self.rules,
        )?;
        data.to_bytes()
    }
}

//! Boundary traits for the external catalog and filter parser.
//!
//! The builder treats the catalog as a black box: it hands over the
//! aggregated dataset types plus an optional parsed filter and gets back an
//! unordered sequence of candidate rows. Likewise the filter syntax is not
//! interpreted here; the parser produces an opaque [`Expression`] the
//! catalog understands.

use std::collections::BTreeMap;

use crate::dataset::{DataRow, DatasetType};

/// Maps a named dimension to the underlying link columns that appear in row
/// coordinates, e.g. `patch -> [tract, patch]`.
#[derive(Clone, Debug, Default)]
pub struct DimensionUniverse {
    links: BTreeMap<String, Vec<String>>,
}

impl DimensionUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        dimension: impl Into<String>,
        links: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.links
            .insert(dimension.into(), links.into_iter().map(Into::into).collect());
    }

    pub fn links(&self, dimension: &str) -> Option<&[String]> {
        self.links.get(dimension).map(Vec::as_slice)
    }
}

/// Names of the collections the catalog should read from and write to.
/// Opaque to the builder; consumed only by the [`Registry`].
#[derive(Clone, Debug, Default)]
pub struct OriginInfo {
    pub input_collections: Vec<String>,
    pub output_collection: String,
}

/// A parsed filter expression in the catalog's normalized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression(String);

impl Expression {
    pub fn new(normalized: impl Into<String>) -> Self {
        Self(normalized.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns user-supplied filter text into an [`Expression`].
///
/// Empty or absent text never reaches the parser; the builder treats it as
/// "no filter".
pub trait ExpressionParser: Send + Sync {
    fn parse(&self, text: &str) -> anyhow::Result<Expression>;
}

/// The query facade over the data catalog.
pub trait Registry: Send + Sync {
    /// The dimension schema rows are expressed in.
    fn universe(&self) -> &DimensionUniverse;

    /// Resolve every combination of dimension values compatible with the
    /// filter, binding a dataset reference for each given dataset type.
    ///
    /// The returned order carries no meaning; the builder canonicalizes it.
    fn select_rows(
        &self,
        origin: &OriginInfo,
        expression: Option<&Expression>,
        inputs: &[DatasetType],
        outputs: &[DatasetType],
    ) -> anyhow::Result<Vec<DataRow>>;
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::annotation::FieldValue;
use crate::errors::ClindexError;
use crate::overlap::Interval;
use crate::scope::FeatureKind;

pub use crate::types::{Chromosome, FeatureId, FieldName, SampleId};

/// Strand of a splice junction.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub enum Strand {
    /// Strand could not be determined (`.`).
    Undefined,
    /// Forward strand (`+`).
    Plus,
    /// Reverse strand (`-`).
    Minus,
}

impl Strand {
    /// Decode the aligner's numeric strand column (0 = undefined, 1 = +, 2 = -).
    pub fn from_code(code: u8) -> Result<Self, ClindexError> {
        match code {
            0 => Ok(Strand::Undefined),
            1 => Ok(Strand::Plus),
            2 => Ok(Strand::Minus),
            other => Err(ClindexError::Configuration(format!(
                "unknown strand code {other} (expected 0, 1 or 2)"
            ))),
        }
    }

    /// Single-character strand symbol.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Strand::Undefined => ".",
            Strand::Plus => "+",
            Strand::Minus => "-",
        }
    }
}

impl FromStr for Strand {
    type Err = ClindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "." => Ok(Strand::Undefined),
            "+" => Ok(Strand::Plus),
            "-" => Ok(Strand::Minus),
            other => Err(ClindexError::Configuration(format!(
                "unknown strand symbol '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of a splice junction.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct JunctionKey {
    /// Chromosome name.
    pub chrom: Chromosome,
    /// First intronic base.
    pub start: u64,
    /// Last intronic base.
    pub end: u64,
    /// Transcribed strand.
    pub strand: Strand,
}

impl JunctionKey {
    /// Build a junction key.
    pub fn new(chrom: impl Into<Chromosome>, start: u64, end: u64, strand: Strand) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            strand,
        }
    }

    /// Intron span covered by the junction.
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }
}

/// Composite key of a sequence variant.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct VariantKey {
    /// Chromosome name.
    pub chrom: Chromosome,
    /// 1-based position of the reference allele.
    pub pos: u64,
    /// Reference allele.
    pub ref_allele: String,
    /// Alternate allele.
    pub alt_allele: String,
}

impl VariantKey {
    /// Build a variant key.
    pub fn new(
        chrom: impl Into<Chromosome>,
        pos: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
        }
    }
}

/// Positional tuple uniquely identifying a feature within a scope.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub enum CompositeKey {
    /// Splice junction key.
    Junction(JunctionKey),
    /// Sequence variant key.
    Variant(VariantKey),
}

impl CompositeKey {
    /// Feature kind this key belongs to.
    pub fn kind(&self) -> FeatureKind {
        match self {
            CompositeKey::Junction(_) => FeatureKind::Junction,
            CompositeKey::Variant(_) => FeatureKind::Variant,
        }
    }

    /// Chromosome shared by both key shapes.
    pub fn chrom(&self) -> &str {
        match self {
            CompositeKey::Junction(key) => &key.chrom,
            CompositeKey::Variant(key) => &key.chrom,
        }
    }

    /// Junction key, if this is one.
    pub fn as_junction(&self) -> Option<&JunctionKey> {
        match self {
            CompositeKey::Junction(key) => Some(key),
            CompositeKey::Variant(_) => None,
        }
    }

    /// Variant key, if this is one.
    pub fn as_variant(&self) -> Option<&VariantKey> {
        match self {
            CompositeKey::Variant(key) => Some(key),
            CompositeKey::Junction(_) => None,
        }
    }
}

impl From<JunctionKey> for CompositeKey {
    fn from(key: JunctionKey) -> Self {
        CompositeKey::Junction(key)
    }
}

impl From<VariantKey> for CompositeKey {
    fn from(key: VariantKey) -> Self {
        CompositeKey::Variant(key)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeKey::Junction(key) => {
                write!(f, "{}:{}-{}:{}", key.chrom, key.start, key.end, key.strand)
            }
            CompositeKey::Variant(key) => write!(
                f,
                "{}:{}:{}>{}",
                key.chrom, key.pos, key.ref_allele, key.alt_allele
            ),
        }
    }
}

/// Kind-specific columns stored alongside a canonical key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum FeatureExtras {
    /// Junction extras.
    Junction {
        /// Whether the junction matches an annotated intron.
        annotated: bool,
    },
    /// Variant extras.
    Variant {
        /// Upstream variant name (VCF ID column), if any.
        name: Option<String>,
    },
}

impl FeatureExtras {
    /// Neutral extras for `kind` (unannotated junction / unnamed variant).
    pub fn default_for(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Junction => FeatureExtras::Junction { annotated: false },
            FeatureKind::Variant => FeatureExtras::Variant { name: None },
        }
    }
}

/// Durable, identifier-bearing representation of a feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct CanonicalRecord {
    /// Immutable identifier, minted once on first observation.
    pub id: FeatureId,
    /// Composite key this record represents.
    pub key: CompositeKey,
    /// Kind-specific columns captured from the first observation.
    pub extras: FeatureExtras,
}

/// Key plus extras handed to `CanonicalStore::insert_many`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    /// Key to mint an id for.
    pub key: CompositeKey,
    /// Extras stored with the new record.
    pub extras: FeatureExtras,
}

impl From<CompositeKey> for NewRecord {
    fn from(key: CompositeKey) -> Self {
        let extras = FeatureExtras::default_for(key.kind());
        Self { key, extras }
    }
}

/// Per-sample call attached to a variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct VariantCall {
    /// QUAL column (`None` for `.`).
    pub qual: Option<f64>,
    /// First FILTER value (`PASS`, `LowQual`, ...).
    pub filter: Option<String>,
    /// Raw genotype string as produced by the parser (`0/1`, `REF|ALT`, `(1, 1)`).
    pub genotype: String,
    /// Remaining FORMAT fields in header order.
    pub format: Vec<(FieldName, String)>,
}

/// Kind-specific per-sample measurements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum SampleMetrics {
    /// Junction read support.
    Junction {
        /// Uniquely mapping reads crossing the junction.
        uniq_map: u32,
        /// Multi-mapping reads crossing the junction.
        multi_map: u32,
    },
    /// Variant call details.
    Variant(VariantCall),
}

impl SampleMetrics {
    /// Feature kind these metrics belong to.
    pub fn kind(&self) -> FeatureKind {
        match self {
            SampleMetrics::Junction { .. } => FeatureKind::Junction,
            SampleMetrics::Variant(_) => FeatureKind::Variant,
        }
    }

    /// Genotype string, for variant metrics.
    pub fn genotype(&self) -> Option<&str> {
        match self {
            SampleMetrics::Variant(call) => Some(call.genotype.as_str()),
            SampleMetrics::Junction { .. } => None,
        }
    }
}

/// One newly observed row for one sample, not yet assigned an id.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    /// Sample the row was observed in.
    pub sample_id: SampleId,
    /// Feature the row describes.
    pub key: CompositeKey,
    /// Extras used if this row mints the canonical record.
    pub extras: FeatureExtras,
    /// Sample-specific measurements, stored on the link.
    pub metrics: SampleMetrics,
    /// Per-transcript consequence annotations (variants only).
    pub impacts: Vec<Vec<(FieldName, FieldValue)>>,
}

impl RawRecord {
    /// Junction observation with read support.
    pub fn junction(
        sample_id: impl Into<SampleId>,
        key: JunctionKey,
        uniq_map: u32,
        multi_map: u32,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            key: CompositeKey::Junction(key),
            extras: FeatureExtras::Junction { annotated: false },
            metrics: SampleMetrics::Junction {
                uniq_map,
                multi_map,
            },
            impacts: Vec::new(),
        }
    }

    /// Variant observation with its call.
    pub fn variant(sample_id: impl Into<SampleId>, key: VariantKey, call: VariantCall) -> Self {
        Self {
            sample_id: sample_id.into(),
            key: CompositeKey::Variant(key),
            extras: FeatureExtras::Variant { name: None },
            metrics: SampleMetrics::Variant(call),
            impacts: Vec::new(),
        }
    }

    /// Replace the kind-specific extras.
    pub fn with_extras(mut self, extras: FeatureExtras) -> Self {
        self.extras = extras;
        self
    }

    /// Attach consequence annotations.
    pub fn with_impacts(mut self, impacts: Vec<Vec<(FieldName, FieldValue)>>) -> Self {
        self.impacts = impacts;
        self
    }

    pub(crate) fn new_record(&self) -> NewRecord {
        NewRecord {
            key: self.key.clone(),
            extras: self.extras.clone(),
        }
    }
}

/// Per-sample measurement row attached to a canonical record id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct SampleLink {
    /// Linked sample.
    pub sample_id: SampleId,
    /// Canonical record the sample carries.
    pub record_id: FeatureId,
    /// Measurements from that sample.
    pub metrics: SampleMetrics,
}

impl SampleLink {
    /// Short `sample@id` label used in conflict reports.
    pub fn label(&self) -> String {
        format!("{}@{}", self.sample_id, self.record_id)
    }
}

/// One consequence annotation attached to a variant record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct VariantImpact {
    /// Annotated variant record.
    pub record_id: FeatureId,
    /// Annotation fields in header order.
    pub fields: Vec<(FieldName, FieldValue)>,
}

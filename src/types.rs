/// Immutable identifier minted for a canonical record (monotonic per scope).
/// Example: `1`, `2`, `17342`
pub type FeatureId = u64;
/// Identifier of the sample a measurement belongs to.
/// Examples: `S001`, `patient_17_tumor`
pub type SampleId = String;
/// Identifier of a sample cohort.
/// Examples: `case`, `ctl`
pub type CohortId = String;
/// Chromosome / contig name as written by the upstream parser.
/// Examples: `chr1`, `X`, `chrM`
pub type Chromosome = String;
/// Annotation or FORMAT field name (lowercased after reconciliation).
/// Examples: `consequence`, `impact`, `ad`, `dp`
pub type FieldName = String;
/// Human-readable rendering of a composite key or link, used in error reports.
/// Examples: `chr1:100-200:+`, `chr1:1000:A>G`, `S001@17`
pub type KeyLabel = String;

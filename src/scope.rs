use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of genomic feature held by a canonical store scope.
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
pub enum FeatureKind {
    /// Splice junctions keyed by `(chrom, start, end, strand)`.
    Junction,
    /// Sequence variants keyed by `(chrom, pos, ref, alt)`.
    Variant,
}

impl FeatureKind {
    /// Lowercase plural label used in logs and error messages.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Junction => "junctions",
            FeatureKind::Variant => "variants",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one canonical store: feature kind plus the filtered / rna flags.
///
/// Scopes never share identifier space; every `(kind, filtered, rna)`
/// combination mints its own ids starting from 1.
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
pub struct StoreScope {
    /// Feature kind stored in this scope.
    pub kind: FeatureKind,
    /// Whether the scope holds the filtered subset of observations.
    pub filtered: bool,
    /// Whether observations come from RNA (vs DNA) sequencing.
    pub rna: bool,
}

impl StoreScope {
    /// Unfiltered, non-rna scope for `kind`.
    pub const fn new(kind: FeatureKind) -> Self {
        Self {
            kind,
            filtered: false,
            rna: false,
        }
    }

    /// Unfiltered junction scope.
    pub const fn junctions() -> Self {
        Self::new(FeatureKind::Junction)
    }

    /// Unfiltered dna variant scope.
    pub const fn variants() -> Self {
        Self::new(FeatureKind::Variant)
    }

    /// Same scope with the filtered flag set to `filtered`.
    pub const fn with_filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }

    /// Same scope with the rna flag set to `rna`.
    pub const fn with_rna(mut self, rna: bool) -> Self {
        self.rna = rna;
        self
    }

    /// Compact one-byte code used when building persisted keys.
    pub const fn code(&self) -> u8 {
        let kind = match self.kind {
            FeatureKind::Junction => 0,
            FeatureKind::Variant => 1,
        };
        kind | ((self.filtered as u8) << 1) | ((self.rna as u8) << 2)
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rna {
            f.write_str("rna/")?;
        }
        if self.filtered {
            f.write_str("filtered/")?;
        }
        f.write_str(self.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn scope_codes_are_distinct_for_every_flag_combination() {
        let mut codes = HashSet::new();
        for kind in [FeatureKind::Junction, FeatureKind::Variant] {
            for filtered in [false, true] {
                for rna in [false, true] {
                    let scope = StoreScope::new(kind).with_filtered(filtered).with_rna(rna);
                    assert!(codes.insert(scope.code()), "code collision for {scope}");
                }
            }
        }
        assert_eq!(codes.len(), 8);
    }

    #[test]
    fn display_names_flags_before_kind() {
        assert_eq!(StoreScope::junctions().to_string(), "junctions");
        assert_eq!(
            StoreScope::variants()
                .with_rna(true)
                .with_filtered(true)
                .to_string(),
            "rna/filtered/variants"
        );
    }
}

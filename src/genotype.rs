use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::genotype::{
    SEP_PHASED, SEP_UNPHASED, TOKEN_ALT, TOKEN_DEL, TOKEN_REF, TOKEN_UNKNOWN,
};
use crate::errors::ClindexError;

/// One allele slot of a genotype call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Allele {
    /// Reference allele (`0`, `REF`).
    Ref,
    /// Any alternate allele (`1`, `2`, `ALT`).
    Alt,
    /// Uncalled allele (`.`).
    Unknown,
    /// Missing partner of a hemizygous call.
    Del,
}

impl Allele {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token {
            "0" | TOKEN_REF => Some(Allele::Ref),
            "." | "None" | TOKEN_UNKNOWN => Some(Allele::Unknown),
            TOKEN_ALT => Some(Allele::Alt),
            TOKEN_DEL => Some(Allele::Del),
            numeric => match numeric.parse::<u32>() {
                Ok(index) if index > 0 => Some(Allele::Alt),
                _ => None,
            },
        }
    }

    const fn token(&self) -> &'static str {
        match self {
            Allele::Ref => TOKEN_REF,
            Allele::Alt => TOKEN_ALT,
            Allele::Unknown => TOKEN_UNKNOWN,
            Allele::Del => TOKEN_DEL,
        }
    }
}

/// Classification used by allele counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenotypeCall {
    /// Two reference alleles.
    HomRef,
    /// One reference and one alternate allele.
    Het,
    /// Two alternate alleles.
    HomAlt,
    /// Single alternate allele with no partner (`1`, `ALT/DEL`).
    HemiDel,
    /// At least one allele uncalled.
    Unknown,
}

/// Parsed diploid (or hemizygous) genotype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genotype {
    /// Both allele slots; a hemizygous call fills the second with `Del`.
    pub alleles: [Allele; 2],
    /// Written with `|`.
    pub phased: bool,
}

impl Genotype {
    /// Parse numeric VCF (`0/1`, `1|1`, `./1`, `1`), tuple (`(0, 1)`, `(1)`) or
    /// rendered (`REF/ALT`, `ALT|DEL`) genotype strings.
    pub fn parse(raw: &str) -> Result<Self, ClindexError> {
        let text = raw.trim();
        let invalid = || ClindexError::InvalidGenotype(format!("'{raw}'"));
        if text.is_empty() {
            return Err(invalid());
        }

        let (tokens, phased): (Vec<&str>, bool) =
            if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                (inner.split(',').collect(), false)
            } else if text.contains(SEP_PHASED) {
                (text.split(SEP_PHASED).collect(), true)
            } else {
                (text.split(SEP_UNPHASED).collect(), false)
            };

        let parsed: Vec<Allele> = tokens
            .iter()
            .map(|token| Allele::parse(token))
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;

        let alleles = match parsed.as_slice() {
            [single] => [*single, Allele::Del],
            [first, second] => [*first, *second],
            _ => return Err(invalid()),
        };
        if alleles == [Allele::Del, Allele::Del] {
            return Err(invalid());
        }
        Ok(Self { alleles, phased })
    }

    /// Het / hom / hemizygous classification; phasing never matters.
    pub fn call(&self) -> GenotypeCall {
        use Allele::*;
        match self.alleles {
            [Unknown, _] | [_, Unknown] => GenotypeCall::Unknown,
            [Ref, Ref] | [Ref, Del] | [Del, Ref] => GenotypeCall::HomRef,
            [Ref, Alt] | [Alt, Ref] => GenotypeCall::Het,
            [Alt, Alt] => GenotypeCall::HomAlt,
            [Alt, Del] | [Del, Alt] => GenotypeCall::HemiDel,
            [Del, Del] => GenotypeCall::Unknown,
        }
    }

    /// Display form, e.g. `REF/ALT` or `ALT|ALT`.
    pub fn render(&self) -> String {
        let sep = if self.phased { SEP_PHASED } else { SEP_UNPHASED };
        format!("{}{}{}", self.alleles[0].token(), sep, self.alleles[1].token())
    }
}

impl FromStr for Genotype {
    type Err = ClindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genotype::parse(s)
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(raw: &str) -> GenotypeCall {
        Genotype::parse(raw).unwrap().call()
    }

    #[test]
    fn phasing_does_not_change_classification() {
        assert_eq!(call("0/1"), GenotypeCall::Het);
        assert_eq!(call("1|0"), GenotypeCall::Het);
        assert_eq!(call("1/1"), GenotypeCall::HomAlt);
        assert_eq!(call("1|1"), GenotypeCall::HomAlt);
        assert_eq!(call("0/0"), GenotypeCall::HomRef);
        assert_eq!(call("1/2"), GenotypeCall::HomAlt);
    }

    #[test]
    fn tuple_and_rendered_forms_parse_to_the_same_calls() {
        assert_eq!(call("(0, 1)"), GenotypeCall::Het);
        assert_eq!(call("(1, 0)"), GenotypeCall::Het);
        assert_eq!(call("(1, 1)"), GenotypeCall::HomAlt);
        assert_eq!(call("(None, 1)"), GenotypeCall::Unknown);
        assert_eq!(call("(None, None)"), GenotypeCall::Unknown);
        assert_eq!(call("(1)"), GenotypeCall::HemiDel);
        assert_eq!(call("REF/ALT"), GenotypeCall::Het);
        assert_eq!(call("ALT|ALT"), GenotypeCall::HomAlt);
        assert_eq!(call("ALT/DEL"), GenotypeCall::HemiDel);
        assert_eq!(call("UNK/ALT"), GenotypeCall::Unknown);
        assert_eq!(call("./1"), GenotypeCall::Unknown);
        assert_eq!(call("1"), GenotypeCall::HemiDel);
    }

    #[test]
    fn rendering_keeps_the_separator() {
        assert_eq!(Genotype::parse("0|1").unwrap().render(), "REF|ALT");
        assert_eq!(Genotype::parse("1/1").unwrap().render(), "ALT/ALT");
        assert_eq!(Genotype::parse("(1)").unwrap().render(), "ALT/DEL");
        assert_eq!(Genotype::parse("(None, 1)").unwrap().to_string(), "UNK/ALT");
    }

    #[test]
    fn unclassifiable_strings_are_rejected() {
        for raw in ["", "0/x", "0/1/1", "DEL/DEL", "-1/0", "(0, 1"] {
            assert!(
                matches!(Genotype::parse(raw), Err(ClindexError::InvalidGenotype(_))),
                "expected '{raw}' to be rejected"
            );
        }
    }
}

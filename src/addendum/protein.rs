//! Amino-acid code conversion for protein change notation

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Three-letter code, one-letter code, full name
pub const AMINO_ACIDS: [(&str, &str, &str); 26] = [
    ("Ala", "A", "Alanine"),
    ("Arg", "R", "Arginine"),
    ("Asn", "N", "Asparagine"),
    ("Asp", "D", "Aspartic acid"),
    ("Cys", "C", "Cysteine"),
    ("Gln", "Q", "Glutamine"),
    ("Glu", "E", "Glutamic acid"),
    ("Gly", "G", "Glycine"),
    ("His", "H", "Histidine"),
    ("Ile", "I", "Isoleucine"),
    ("Leu", "L", "Leucine"),
    ("Lys", "K", "Lysine"),
    ("Met", "M", "Methionine"),
    ("Phe", "F", "Phenylalanine"),
    ("Pro", "P", "Proline"),
    ("Pyl", "O", "Pyrrolysine"),
    ("Ser", "S", "Serine"),
    ("Sec", "U", "Selenocysteine"),
    ("Thr", "T", "Threonine"),
    ("Trp", "W", "Tryptophan"),
    ("Tyr", "Y", "Tyrosine"),
    ("Val", "V", "Valine"),
    ("Asx", "B", "Aspartic acid or Asparagine"),
    ("Glx", "Z", "Glutamic acid or Glutamine"),
    ("Xle", "J", "Leucine or Isoleucine"),
    ("Ter", "X", "Termination codon"),
];

lazy_static! {
    static ref THREE_LETTER: Regex = Regex::new(r"[A-Z][a-z][a-z]").unwrap();
}

pub fn one_letter(code: &str) -> Option<&'static str> {
    AMINO_ACIDS.iter().find(|(three, _, _)| *three == code).map(|(_, one, _)| *one)
}

pub fn full_name(code: &str) -> Option<&'static str> {
    AMINO_ACIDS.iter().find(|(three, _, _)| *three == code).map(|(_, _, name)| *name)
}

/// `p.Gly12Asp` -> `G12D`. Unknown three-letter words are left as they are.
pub fn expand_protein_change(hgvs_protein: &str) -> String {
    let short = THREE_LETTER.replace_all(hgvs_protein, |caps: &Captures| {
        one_letter(&caps[0]).unwrap_or(&caps[0]).to_string()
    });
    short.strip_prefix("p.").unwrap_or(&short).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_protein_change() {
        assert_eq!(expand_protein_change("p.Gly12Asp"), "G12D");
        assert_eq!(expand_protein_change("p.Val600Glu"), "V600E");
        assert_eq!(expand_protein_change("p.Glu746_Ala750del"), "E746_A750del");
        assert_eq!(expand_protein_change("p.Arg213Ter"), "R213X");
        assert_eq!(expand_protein_change("p.Foo12Bar"), "Foo12Bar");
        assert_eq!(expand_protein_change(""), "");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(one_letter("Trp"), Some("W"));
        assert_eq!(full_name("Sec"), Some("Selenocysteine"));
        assert_eq!(one_letter("Xyz"), None);
    }
}

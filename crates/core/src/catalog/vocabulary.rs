//! Domain jargon expansion for lexical catalog search.
//!
//! Merchants and customers write packaging forms and units in many shortened ways
//! ("cx c/ 20 comp", "dipirona 500 mg"). A query token is expanded into an OR-group of
//! every spelling the vocabulary links it to; groups are ANDed by the catalog store.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One query token and the alternatives that may stand in for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGroup {
    pub terms: Vec<String>,
}

impl TokenGroup {
    pub fn single(term: impl Into<String>) -> Self {
        Self { terms: vec![term.into()] }
    }

    /// The token as the customer wrote it (normalized).
    pub fn original(&self) -> &str {
        self.terms.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_expanded(&self) -> bool {
        self.terms.len() > 1
    }
}

#[derive(Clone, Debug, Default)]
pub struct SynonymVocabulary {
    abbreviations_by_term: BTreeMap<String, Vec<String>>,
    terms_by_abbreviation: HashMap<String, Vec<String>>,
}

const PHARMACY_ENTRIES: &[(&str, &[&str])] = &[
    ("comprimidos", &["comp", "cpds", "cpr", "comprs"]),
    ("cápsulas", &["caps", "cps", "cap"]),
    ("drágeas", &["drag", "drg"]),
    ("tabletes", &["tab", "tbl"]),
    ("pastilhas", &["past", "pst"]),
    ("sachês", &["sach", "sch"]),
    ("ampolas", &["amp", "ampl"]),
    ("frascos", &["fr", "fras", "frasco"]),
    ("cartuchos", &["cart", "cartu"]),
    ("seringas", &["ser", "sir"]),
    ("tubos", &["tub", "tb"]),
    ("bisnagas", &["bisn", "bsn"]),
    ("gotas", &["gts", "gt"]),
    ("colírio", &["col", "colir"]),
    ("xarope", &["xar", "xpe"]),
    ("suspensão", &["susp", "sus"]),
    ("solução", &["sol", "solu"]),
    ("gel", &["gl"]),
    ("pomada", &["pom", "pm"]),
    ("creme", &["cr", "crem"]),
    ("loção", &["loc", "loç"]),
    ("spray", &["spr", "sp"]),
    ("aerossol", &["aer", "aero"]),
    ("inalador", &["inal", "inhal"]),
    ("nebulização", &["neb", "nebul"]),
    ("supositório", &["sup", "supos"]),
    ("óvulo", &["óv", "ovul"]),
    ("adesivo", &["ades", "ad"]),
    ("emplastro", &["empl", "emp"]),
    ("desodorante", &["des", "desodor"]),
    ("miligramas", &["mg", "mgr"]),
    ("gramas", &["g", "gr", "gm"]),
    ("microgramas", &["mcg", "μg", "ug"]),
    ("miliequivalentes", &["meq"]),
    ("unidades", &["ui", "u", "un", "uns", "unds", "unids"]),
    ("mililitros", &["ml"]),
    ("litros", &["l", "lt"]),
    ("quilograma", &["kg", "kilo"]),
    ("envelope", &["env", "envl"]),
    ("unidade", &["un", "und", "unid"]),
    ("embalagem", &["emb", "embal"]),
    ("caixa", &["cx", "cxa"]),
    ("frasco", &["fr", "frs", "frasc"]),
    ("liberação", &["lib", "lber"]),
    ("prolongada", &["prol", "pr"]),
    ("retardada", &["ret", "retard"]),
    ("revestido", &["rev", "rvst"]),
    ("mastigável", &["mast", "mastig"]),
    ("sublingual", &["subl", "sl"]),
    ("injetável", &["inj", "inject"]),
    ("tópico", &["top", "tóp"]),
    ("oftálmico", &["oft", "oftal"]),
    ("nasal", &["nas", "nsl"]),
    ("oral", &["or", "vo"]),
    ("intramuscular", &["im"]),
    ("intravenoso", &["iv"]),
    ("subcutâneo", &["sc"]),
    ("concentração", &["conc", "concent"]),
    ("dosagem", &["dos", "dosag"]),
    ("forte", &["ft", "for"]),
    ("extra", &["ext", "x"]),
    ("máximo", &["max", "máx"]),
    ("mínimo", &["min", "mín"]),
    ("genérico", &["gen", "genér"]),
    ("similar", &["sim", "simil"]),
    ("referência", &["ref", "refer"]),
];

impl SynonymVocabulary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Packaging forms, units of measure and dosage terms used by pharmacy catalogs.
    pub fn pharmacy() -> Self {
        let mut vocabulary = Self::empty();
        for (term, abbreviations) in PHARMACY_ENTRIES {
            vocabulary.insert(term, abbreviations.iter().copied());
        }
        vocabulary
    }

    /// Parses a TOML table of `term = ["abbr", ...]` entries.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let table: BTreeMap<String, Vec<String>> = toml::from_str(raw)?;
        let mut vocabulary = Self::empty();
        for (term, abbreviations) in &table {
            vocabulary.insert(term, abbreviations.iter().map(String::as_str));
        }
        Ok(vocabulary)
    }

    pub fn insert<'a>(&mut self, term: &str, abbreviations: impl IntoIterator<Item = &'a str>) {
        let term = normalize_token(term);
        if term.is_empty() {
            return;
        }

        for abbreviation in abbreviations {
            let abbreviation = normalize_token(abbreviation);
            if abbreviation.is_empty() || abbreviation == term {
                continue;
            }
            push_unique(self.abbreviations_by_term.entry(term.clone()).or_default(), &abbreviation);
            push_unique(self.terms_by_abbreviation.entry(abbreviation).or_default(), &term);
        }
        self.abbreviations_by_term.entry(term).or_default();
    }

    pub fn merge(&mut self, other: &SynonymVocabulary) {
        for (term, abbreviations) in &other.abbreviations_by_term {
            self.insert(term, abbreviations.iter().map(String::as_str));
        }
    }

    pub fn len(&self) -> usize {
        self.abbreviations_by_term.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abbreviations_by_term.is_empty()
    }

    /// Everything a single token may stand for: itself, its own abbreviations, and for
    /// every full term it abbreviates, that term plus the term's other abbreviations.
    pub fn expand_token(&self, token: &str) -> TokenGroup {
        let token = normalize_token(token);
        let mut terms = vec![token.clone()];

        if let Some(abbreviations) = self.abbreviations_by_term.get(&token) {
            for abbreviation in abbreviations {
                push_unique(&mut terms, abbreviation);
            }
        }

        if let Some(full_terms) = self.terms_by_abbreviation.get(&token) {
            for full in full_terms {
                push_unique(&mut terms, full);
                if let Some(siblings) = self.abbreviations_by_term.get(full) {
                    for sibling in siblings {
                        push_unique(&mut terms, sibling);
                    }
                }
            }
        }

        TokenGroup { terms }
    }

    pub fn expand_query(&self, query: &str) -> Vec<TokenGroup> {
        tokenize(query).iter().map(|token| self.expand_token(token)).collect()
    }

    /// Alternatives for `word` without the word itself.
    pub fn alternatives_for(&self, word: &str) -> Vec<String> {
        self.expand_token(word).terms.into_iter().skip(1).collect()
    }
}

/// Lowercases, splits on whitespace and strips everything that is not a letter or digit.
pub fn tokenize(query: &str) -> Vec<String> {
    query.split_whitespace().map(normalize_token).filter(|token| !token.is_empty()).collect()
}

/// One group per raw token, no expansion.
pub fn raw_groups(query: &str) -> Vec<TokenGroup> {
    tokenize(query).into_iter().map(TokenGroup::single).collect()
}

fn normalize_token(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}

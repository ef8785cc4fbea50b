// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Specialty taxonomy
//!
//! Maps a specialty label to the keywords that vote for it. Labels are kept
//! in a `BTreeMap` so iteration (and therefore classification) is ordered by
//! name.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Specialty name -> lower-cased keywords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct SpecialtyTaxonomy {
    specialties: BTreeMap<String, Vec<String>>,
}

impl SpecialtyTaxonomy {
    /// Empty taxonomy; every community falls back to the default label
    pub fn empty() -> Self {
        Self {
            specialties: BTreeMap::new(),
        }
    }

    /// Build from `(specialty, keywords)` pairs. Keywords are trimmed,
    /// lower-cased and de-duplicated; blank keywords are dropped.
    pub fn from_pairs<I, S, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<K>)>,
        S: Into<String>,
        K: AsRef<str>,
    {
        let mut taxonomy = Self::empty();
        for (name, keywords) in pairs {
            taxonomy.insert(name, keywords);
        }
        taxonomy
    }

    /// Add or replace a specialty
    pub fn insert<S, K>(&mut self, name: S, keywords: Vec<K>)
    where
        S: Into<String>,
        K: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let kw = keyword.as_ref().trim().to_lowercase();
            if !kw.is_empty() && !normalized.contains(&kw) {
                normalized.push(kw);
            }
        }
        self.specialties.insert(name.into(), normalized);
    }

    /// Load a taxonomy from a JSON object `{ "Specialty": ["kw", ...] }`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let taxonomy: Self = serde_json::from_str(&content)?;
        if taxonomy.is_empty() {
            return Err(CoreError::Config("taxonomy has no specialties".into()));
        }
        Ok(taxonomy)
    }

    /// Specialties in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.specialties
            .iter()
            .map(|(name, kws)| (name.as_str(), kws.as_slice()))
    }

    pub fn keywords(&self, specialty: &str) -> Option<&[String]> {
        self.specialties.get(specialty).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.specialties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialties.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for SpecialtyTaxonomy {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        Self::from_pairs(raw)
    }
}

impl From<SpecialtyTaxonomy> for BTreeMap<String, Vec<String>> {
    fn from(taxonomy: SpecialtyTaxonomy) -> Self {
        taxonomy.specialties
    }
}

impl Default for SpecialtyTaxonomy {
    /// Eleven clinical specialties
    fn default() -> Self {
        Self::from_pairs([
            (
                "Cardiology",
                vec![
                    "heart",
                    "cardiac",
                    "aortic",
                    "hypertension",
                    "ejection fraction",
                    "valve",
                    "coronary",
                    "myocardial",
                    "arrhythmia",
                ],
            ),
            (
                "Gastroenterology",
                vec![
                    "liver",
                    "hepatic",
                    "cirrhosis",
                    "abdomen",
                    "hernia",
                    "ascites",
                    "bowel",
                    "intestine",
                    "gastric",
                    "colon",
                    "gi",
                    "endoscopy",
                ],
            ),
            (
                "Orthopedics",
                vec![
                    "hip",
                    "knee",
                    "bone",
                    "joint",
                    "replacement",
                    "osteoporosis",
                    "fracture",
                    "orthopedic",
                    "prosthesis",
                ],
            ),
            (
                "Pharmacology",
                vec![
                    "medication",
                    "drug",
                    "treatment",
                    "therapy",
                    "prescription",
                    "dose",
                    "mg",
                    "administration",
                ],
            ),
            (
                "Laboratory Medicine",
                vec![
                    "lab",
                    "test",
                    "value",
                    "anion gap",
                    "levels",
                    "blood",
                    "urine",
                    "serum",
                    "plasma",
                    "culture",
                ],
            ),
            (
                "Pulmonology",
                vec![
                    "lung",
                    "pulmonary",
                    "respiratory",
                    "sarcoidosis",
                    "breathing",
                    "oxygen",
                    "ventilation",
                ],
            ),
            (
                "Nephrology",
                vec![
                    "kidney",
                    "renal",
                    "failure",
                    "dialysis",
                    "creatinine",
                    "urinary",
                    "nephro",
                ],
            ),
            (
                "Endocrinology",
                vec![
                    "insulin",
                    "diabetes",
                    "hormone",
                    "dextrose",
                    "glucose",
                    "thyroid",
                    "endocrine",
                ],
            ),
            (
                "Hematology",
                vec![
                    "blood",
                    "anemia",
                    "platelet",
                    "hemoglobin",
                    "coagulation",
                    "hematocrit",
                    "leukocyte",
                ],
            ),
            (
                "Neurology",
                vec![
                    "brain",
                    "neurological",
                    "seizure",
                    "stroke",
                    "neuro",
                    "cognitive",
                ],
            ),
            (
                "Infectious Disease",
                vec![
                    "infection",
                    "antibiotic",
                    "sepsis",
                    "fever",
                    "culture",
                    "bacterial",
                    "viral",
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_table() {
        let taxonomy = SpecialtyTaxonomy::default();
        assert_eq!(taxonomy.len(), 11);
        let names: Vec<&str> = taxonomy.iter().map(|(n, _)| n).collect();
        assert_eq!(names[0], "Cardiology");
        assert_eq!(names[names.len() - 1], "Pulmonology");
        assert!(taxonomy
            .keywords("Gastroenterology")
            .unwrap()
            .contains(&"cirrhosis".to_string()));
    }

    #[test]
    fn test_keywords_normalized() {
        let taxonomy = SpecialtyTaxonomy::from_pairs([("X", vec![" Heart ", "heart", "", "Valve"])]);
        assert_eq!(taxonomy.keywords("X").unwrap(), &["heart", "valve"]);
    }

    #[test]
    fn test_deserialize_normalizes_keywords() {
        let taxonomy: SpecialtyTaxonomy =
            serde_json::from_str(r#"{"X": [" Heart ", "heart", "VALVE"]}"#).unwrap();
        assert_eq!(taxonomy.keywords("X").unwrap(), &["heart", "valve"]);

        let json = serde_json::to_string(&taxonomy).unwrap();
        assert_eq!(json, r#"{"X":["heart","valve"]}"#);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Dermatology": ["skin", "Rash"]}}"#).unwrap();
        let taxonomy = SpecialtyTaxonomy::from_json_file(file.path()).unwrap();
        assert_eq!(taxonomy.keywords("Dermatology").unwrap(), &["skin", "rash"]);

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "{{}}").unwrap();
        assert!(SpecialtyTaxonomy::from_json_file(empty.path()).is_err());
    }
}

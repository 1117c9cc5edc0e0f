//! In-memory aircraft and regulation records served by the demo endpoints.

use std::collections::BTreeMap;

use serde::Serialize;

use super::api::ComplianceFinding;

/// A registered aircraft.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Aircraft {
    pub id: String,
    pub tail_number: String,
    pub model: String,
    pub operator: String,
    /// Regulations this aircraft has been certified against
    pub certifications: Vec<String>,
}

/// An airworthiness regulation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Regulation {
    pub id: String,
    pub title: String,
    pub authority: String,
}

/// Read-only lookup tables, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    aircraft: BTreeMap<String, Aircraft>,
    regulations: BTreeMap<String, Regulation>,
}

impl Catalog {
    /// Sample records for the demo service.
    pub fn sample() -> Self {
        let regulation = |id: &str, title: &str, authority: &str| Regulation {
            id: id.to_string(),
            title: title.to_string(),
            authority: authority.to_string(),
        };
        let aircraft = |id: &str, tail: &str, model: &str, operator: &str, certs: &[&str]| {
            Aircraft {
                id: id.to_string(),
                tail_number: tail.to_string(),
                model: model.to_string(),
                operator: operator.to_string(),
                certifications: certs.iter().map(|c| (*c).to_string()).collect(),
            }
        };

        Self::default()
            .with_regulation(regulation("far-25", "Airworthiness Standards: Transport Category", "FAA"))
            .with_regulation(regulation("far-121", "Operating Requirements: Domestic and Flag", "FAA"))
            .with_regulation(regulation("cs-25", "Certification Specifications for Large Aeroplanes", "EASA"))
            .with_aircraft(aircraft("ac-001", "N101AG", "A320neo", "Northwind", &["far-25", "far-121", "cs-25"]))
            .with_aircraft(aircraft("ac-002", "N202AG", "737-800", "Northwind", &["far-25", "far-121"]))
            .with_aircraft(aircraft("ac-003", "G-AGTE", "A350-900", "Crosswind", &["cs-25"]))
    }

    pub fn with_aircraft(mut self, aircraft: Aircraft) -> Self {
        self.aircraft.insert(aircraft.id.clone(), aircraft);
        self
    }

    pub fn with_regulation(mut self, regulation: Regulation) -> Self {
        self.regulations.insert(regulation.id.clone(), regulation);
        self
    }

    pub fn aircraft(&self, id: &str) -> Option<&Aircraft> {
        self.aircraft.get(id)
    }

    pub fn regulation(&self, id: &str) -> Option<&Regulation> {
        self.regulations.get(id)
    }

    pub fn regulation_ids(&self) -> impl Iterator<Item = &str> {
        self.regulations.keys().map(String::as_str)
    }

    /// Check `aircraft` against each regulation id, in the order given.
    ///
    /// Returns the first id that is not a known regulation as the error.
    pub fn check<'a>(
        &self,
        aircraft: &Aircraft,
        regulation_ids: &'a [String],
    ) -> Result<Vec<ComplianceFinding>, &'a str> {
        regulation_ids
            .iter()
            .map(|id| {
                if !self.regulations.contains_key(id) {
                    return Err(id.as_str());
                }
                Ok(ComplianceFinding {
                    regulation_id: id.clone(),
                    compliant: aircraft.certifications.iter().any(|c| c == id),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_lookup() {
        let catalog = Catalog::sample();
        assert_eq!(catalog.aircraft("ac-002").unwrap().model, "737-800");
        assert_eq!(catalog.regulation("cs-25").unwrap().authority, "EASA");
        assert!(catalog.aircraft("ac-999").is_none());
    }

    #[test]
    fn test_check_reports_each_regulation() {
        let catalog = Catalog::sample();
        let aircraft = catalog.aircraft("ac-002").unwrap();
        let ids = vec!["far-25".to_string(), "cs-25".to_string()];

        let findings = catalog.check(aircraft, &ids).unwrap();

        assert_eq!(findings.len(), 2);
        assert!(findings[0].compliant);
        assert!(!findings[1].compliant);
    }

    #[test]
    fn test_check_unknown_regulation() {
        let catalog = Catalog::sample();
        let aircraft = catalog.aircraft("ac-001").unwrap();
        let ids = vec!["far-25".to_string(), "far-999".to_string()];

        assert_eq!(catalog.check(aircraft, &ids).unwrap_err(), "far-999");
    }
}

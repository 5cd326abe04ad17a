//! In-memory mutations of the inventory document.
//!
//! Every write endpoint loads the whole document, applies one of these
//! operations and stores the result back (see `Storage::update_inventory`).
//! Nothing here touches storage, so the rules are tested directly.

use thiserror::Error;

use crate::models::{InventoryDocument, Loan, MaterialEntry, LOANS_KEY};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("`{0}` est réservé et ne peut pas être utilisé comme atelier")]
    ReservedWorkshop(String),
    #[error("le champ `{0}` ne peut pas être vide")]
    EmptyField(&'static str),
    #[error("le nombre doit être supérieur ou égal à 1")]
    InvalidCount,
    #[error("le nombre de `{0}` dépasse la capacité du compteur")]
    CountOverflow(String),
}

/// What `add_material` did to the workshop list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Incremented,
    Added,
}

impl AddOutcome {
    pub fn message(self) -> &'static str {
        match self {
            AddOutcome::Incremented => "Matériau incrémenté",
            AddOutcome::Added => "Nouveau matériau ajouté",
        }
    }
}

/// Name comparison key: trimmed and case-insensitive.
fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn workshop_key(atelier: &str) -> Result<&str, InventoryError> {
    if atelier.trim().is_empty() {
        return Err(InventoryError::EmptyField("atelier"));
    }
    if atelier == LOANS_KEY {
        return Err(InventoryError::ReservedWorkshop(atelier.to_string()));
    }
    Ok(atelier)
}

/// Parses a requested count (defaults to 1, must be at least 1).
pub fn parse_count(nombre: Option<i64>) -> Result<u32, InventoryError> {
    match nombre {
        None => Ok(1),
        Some(n) if n < 1 => Err(InventoryError::InvalidCount),
        Some(n) => u32::try_from(n).map_err(|_| InventoryError::CountOverflow(n.to_string())),
    }
}

impl InventoryDocument {
    /// Adds `nombre` units of `materiaux` to `atelier`, creating the workshop
    /// if needed. A name matching an existing entry increments that entry.
    pub fn add_material(
        &mut self,
        atelier: &str,
        materiaux: &str,
        nombre: u32,
    ) -> Result<AddOutcome, InventoryError> {
        let atelier = workshop_key(atelier)?;
        let name = materiaux.trim();
        if name.is_empty() {
            return Err(InventoryError::EmptyField("materiaux"));
        }
        if nombre == 0 {
            return Err(InventoryError::InvalidCount);
        }

        let key = normalize(name);
        let entries = self.ateliers.entry(atelier.to_string()).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| normalize(&e.materiaux) == key) {
            entry.nombre = entry
                .nombre
                .checked_add(nombre)
                .ok_or_else(|| InventoryError::CountOverflow(entry.materiaux.clone()))?;
            return Ok(AddOutcome::Incremented);
        }

        entries.push(MaterialEntry {
            materiaux: name.to_string(),
            nombre,
        });
        Ok(AddOutcome::Added)
    }

    /// Takes one unit of `materiaux` out of `atelier`. The entry disappears
    /// when its last unit is removed. Returns false when nothing matched.
    pub fn remove_material(&mut self, atelier: &str, materiaux: &str) -> bool {
        let key = normalize(materiaux);
        let Some(entries) = self.ateliers.get_mut(atelier) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| normalize(&e.materiaux) == key) else {
            return false;
        };

        if entries[pos].nombre > 1 {
            entries[pos].nombre -= 1;
        } else {
            entries.remove(pos);
        }
        true
    }

    pub fn add_loan(&mut self, loan: Loan) {
        self.emprunts.push(loan);
    }

    /// Removes the first loan with this id. Returns false when none exists.
    pub fn remove_loan(&mut self, id: u64) -> bool {
        match self.emprunts.iter().position(|l| l.id == id) {
            Some(pos) => {
                self.emprunts.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn material(&self, atelier: &str, materiaux: &str) -> Option<&MaterialEntry> {
        let key = normalize(materiaux);
        self.ateliers
            .get(atelier)?
            .iter()
            .find(|e| normalize(&e.materiaux) == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loan(id: u64) -> Loan {
        Loan {
            id,
            nom: "Alice".to_string(),
            numero: 612345678,
            materiaux: vec![json!({"materiaux": "perceuse", "nombre": 1})
                .as_object()
                .unwrap()
                .clone()],
        }
    }

    #[test]
    fn test_add_same_material_twice_increments() {
        let mut doc = InventoryDocument::default();
        assert_eq!(doc.add_material("bois", "vis", 2).unwrap(), AddOutcome::Added);
        assert_eq!(doc.add_material("bois", "vis", 2).unwrap(), AddOutcome::Incremented);

        let entries = &doc.ateliers["bois"];
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0],
            MaterialEntry {
                materiaux: "vis".to_string(),
                nombre: 4
            }
        );
    }

    #[test]
    fn test_add_matches_trimmed_case_insensitive() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "  Scie Sauteuse ", 1).unwrap();
        let outcome = doc.add_material("bois", "scie sauteuse", 3).unwrap();

        assert_eq!(outcome, AddOutcome::Incremented);
        let entry = doc.material("bois", "SCIE SAUTEUSE").unwrap();
        assert_eq!(entry.materiaux, "Scie Sauteuse");
        assert_eq!(entry.nombre, 4);
    }

    #[test]
    fn test_add_keeps_workshops_separate() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "vis", 1).unwrap();
        doc.add_material("metal", "vis", 5).unwrap();

        assert_eq!(doc.material("bois", "vis").unwrap().nombre, 1);
        assert_eq!(doc.material("metal", "vis").unwrap().nombre, 5);
    }

    #[test]
    fn test_add_rejects_invalid_input() {
        let mut doc = InventoryDocument::default();
        assert_eq!(
            doc.add_material("emprunts", "vis", 1),
            Err(InventoryError::ReservedWorkshop("emprunts".to_string()))
        );
        assert_eq!(
            doc.add_material("bois", "   ", 1),
            Err(InventoryError::EmptyField("materiaux"))
        );
        assert_eq!(doc.add_material("", "vis", 1), Err(InventoryError::EmptyField("atelier")));
        assert_eq!(doc.add_material("bois", "vis", 0), Err(InventoryError::InvalidCount));
        assert!(doc.ateliers.is_empty());
    }

    #[test]
    fn test_add_overflow_leaves_count_untouched() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "vis", u32::MAX).unwrap();
        assert!(matches!(
            doc.add_material("bois", "vis", 1),
            Err(InventoryError::CountOverflow(_))
        ));
        assert_eq!(doc.material("bois", "vis").unwrap().nombre, u32::MAX);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(None), Ok(1));
        assert_eq!(parse_count(Some(7)), Ok(7));
        assert_eq!(parse_count(Some(0)), Err(InventoryError::InvalidCount));
        assert_eq!(parse_count(Some(-3)), Err(InventoryError::InvalidCount));
        assert!(matches!(
            parse_count(Some(i64::MAX)),
            Err(InventoryError::CountOverflow(_))
        ));
    }

    #[test]
    fn test_remove_decrements_then_deletes() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "vis", 2).unwrap();

        assert!(doc.remove_material("bois", " VIS "));
        assert_eq!(doc.material("bois", "vis").unwrap().nombre, 1);

        assert!(doc.remove_material("bois", "vis"));
        assert!(doc.material("bois", "vis").is_none());
        assert!(doc.ateliers["bois"].is_empty());
    }

    #[test]
    fn test_remove_missing_material_reports_not_found() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "vis", 1).unwrap();

        assert!(!doc.remove_material("bois", "clou"));
        assert!(!doc.remove_material("metal", "vis"));
        // Unknown workshops are not created as a side effect.
        assert!(!doc.ateliers.contains_key("metal"));
    }

    #[test]
    fn test_loans_add_and_remove_by_id() {
        let mut doc = InventoryDocument::default();
        doc.add_loan(loan(1));
        doc.add_loan(loan(2));

        assert!(doc.remove_loan(1));
        assert!(!doc.remove_loan(1));
        assert_eq!(doc.emprunts.len(), 1);
        assert_eq!(doc.emprunts[0].id, 2);
    }

    #[test]
    fn test_document_json_shape_is_flat() {
        let mut doc = InventoryDocument::default();
        doc.add_material("bois", "vis", 4).unwrap();
        doc.add_loan(loan(9));

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["bois"], json!([{"materiaux": "vis", "nombre": 4}]));
        assert_eq!(value["emprunts"][0]["id"], json!(9));

        let back: InventoryDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_document_without_loans_key_parses() {
        let doc: InventoryDocument =
            serde_json::from_value(json!({"electronique": [{"materiaux": "arduino", "nombre": 3}]}))
                .unwrap();
        assert!(doc.emprunts.is_empty());
        assert_eq!(doc.material("electronique", "Arduino").unwrap().nombre, 3);
    }
}

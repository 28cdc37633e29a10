use std::collections::HashMap;
use std::path::Path;

use abenteuer_contracts::Activity;
use serde::Deserialize;
use thiserror::Error;

const SEED_CATALOG: &str = include_str!("../data/library.json");

#[derive(Debug, Error, PartialEq)]
pub enum CatalogLoadError {
    #[error("read catalog failed: {0}")]
    Read(String),
    #[error("parse catalog failed: {0}")]
    Parse(String),
    #[error("activity {id}: {field} must not be empty")]
    EmptyField { id: String, field: &'static str },
    #[error("activity {id}: {field} min is greater than max")]
    InvalidRange { id: String, field: &'static str },
    #[error("duplicate activity id: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("activity not found: {0}")]
pub struct NotFound(pub String);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    activities: Vec<Activity>,
}

/// Read-only activity catalog, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct LibraryStore {
    activities: Vec<Activity>,
    index: HashMap<String, usize>,
}

impl LibraryStore {
    /// The catalog compiled into the binary.
    pub fn seed() -> Result<Self, CatalogLoadError> {
        Self::from_json(SEED_CATALOG)
    }

    /// Seed catalog, optionally extended by a catalog file on disk.
    pub fn load(extended_path: Option<&Path>) -> Result<Self, CatalogLoadError> {
        let store = Self::seed()?;
        match extended_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| CatalogLoadError::Read(format!("{}: {e}", path.display())))?;
                store.extend_from_json(&text)
            }
            None => Ok(store),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogLoadError> {
        Self::default().extend_from_json(text)
    }

    pub fn from_activities(activities: Vec<Activity>) -> Result<Self, CatalogLoadError> {
        let mut store = Self::default();
        for activity in activities {
            store.insert(activity)?;
        }
        Ok(store)
    }

    pub fn extend_from_json(mut self, text: &str) -> Result<Self, CatalogLoadError> {
        let file: CatalogFile =
            serde_json::from_str(text).map_err(|e| CatalogLoadError::Parse(e.to_string()))?;
        for activity in file.activities {
            self.insert(activity)?;
        }
        Ok(self)
    }

    fn insert(&mut self, activity: Activity) -> Result<(), CatalogLoadError> {
        check_activity(&activity)?;
        if self.index.contains_key(&activity.id) {
            return Err(CatalogLoadError::DuplicateId(activity.id));
        }
        self.index.insert(activity.id.clone(), self.activities.len());
        self.activities.push(activity);
        Ok(())
    }

    pub fn all(&self) -> &[Activity] {
        &self.activities
    }

    pub fn by_id(&self, id: &str) -> Result<&Activity, NotFound> {
        self.index
            .get(id)
            .map(|&i| &self.activities[i])
            .ok_or_else(|| NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

fn check_activity(activity: &Activity) -> Result<(), CatalogLoadError> {
    if activity.id.trim().is_empty() {
        return Err(CatalogLoadError::EmptyField {
            id: activity.id.clone(),
            field: "id",
        });
    }
    if activity.title.trim().is_empty() {
        return Err(CatalogLoadError::EmptyField {
            id: activity.id.clone(),
            field: "title",
        });
    }
    if activity.age_range.min_months > activity.age_range.max_months {
        return Err(CatalogLoadError::InvalidRange {
            id: activity.id.clone(),
            field: "age_range",
        });
    }
    if activity.duration_range.min_minutes > activity.duration_range.max_minutes {
        return Err(CatalogLoadError::InvalidRange {
            id: activity.id.clone(),
            field: "duration_range",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Test",
            "energy_level": "low",
            "difficulty": "easy",
            "age_range": {"min_months": 12, "max_months": 60},
            "duration_range": {"min_minutes": 10, "max_minutes": 20},
            "location": "indoor"
        })
    }

    fn catalog(items: Vec<serde_json::Value>) -> String {
        json!({ "activities": items }).to_string()
    }

    #[test]
    fn seed_catalog_loads_and_indexes_every_activity() {
        let store = LibraryStore::seed().unwrap();
        assert!(store.len() >= 10);
        for activity in store.all() {
            assert_eq!(store.by_id(&activity.id).unwrap().id, activity.id);
        }
    }

    #[test]
    fn by_id_reports_missing_activity() {
        let store = LibraryStore::seed().unwrap();
        assert_eq!(
            store.by_id("does-not-exist").unwrap_err(),
            NotFound("does-not-exist".to_string())
        );
    }

    #[test]
    fn rejects_missing_required_attribute() {
        let mut item = activity_json("a");
        item.as_object_mut().unwrap().remove("location");
        let err = LibraryStore::from_json(&catalog(vec![item])).unwrap_err();
        assert!(matches!(err, CatalogLoadError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let mut item = activity_json("a");
        item["colour"] = json!("green");
        let err = LibraryStore::from_json(&catalog(vec![item])).unwrap_err();
        assert!(matches!(err, CatalogLoadError::Parse(_)));
    }

    #[test]
    fn rejects_inverted_duration_range() {
        let mut item = activity_json("a");
        item["duration_range"] = json!({"min_minutes": 30, "max_minutes": 10});
        let err = LibraryStore::from_json(&catalog(vec![item])).unwrap_err();
        assert_eq!(
            err,
            CatalogLoadError::InvalidRange {
                id: "a".to_string(),
                field: "duration_range"
            }
        );
    }

    #[test]
    fn rejects_inverted_age_range() {
        let mut item = activity_json("a");
        item["age_range"] = json!({"min_months": 60, "max_months": 12});
        let err = LibraryStore::from_json(&catalog(vec![item])).unwrap_err();
        assert!(matches!(err, CatalogLoadError::InvalidRange { .. }));
    }

    #[test]
    fn rejects_empty_title() {
        let mut item = activity_json("a");
        item["title"] = json!("  ");
        let err = LibraryStore::from_json(&catalog(vec![item])).unwrap_err();
        assert!(matches!(err, CatalogLoadError::EmptyField { field: "title", .. }));
    }

    #[test]
    fn extension_rejects_ids_already_in_the_seed() {
        let seed = LibraryStore::seed().unwrap();
        let existing = seed.all()[0].id.clone();
        let err = seed
            .extend_from_json(&catalog(vec![activity_json(&existing)]))
            .unwrap_err();
        assert_eq!(err, CatalogLoadError::DuplicateId(existing));
    }

    #[test]
    fn extension_appends_new_activities() {
        let seed = LibraryStore::seed().unwrap();
        let before = seed.len();
        let merged = seed
            .extend_from_json(&catalog(vec![activity_json("extra-1")]))
            .unwrap();
        assert_eq!(merged.len(), before + 1);
        assert!(merged.by_id("extra-1").is_ok());
    }
}

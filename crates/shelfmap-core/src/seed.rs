//! YAML seed files for bootstrapping owners and store registrations.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::stores::{is_plausible_email, NewStore};
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOwner {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedStore {
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub owner_id: String,
    pub contact_email: Option<String>,
    #[serde(default)]
    pub permit_image_refs: Vec<String>,
}

impl SeedStore {
    #[must_use]
    pub fn to_new_store(&self) -> NewStore {
        NewStore {
            name: self.name.clone(),
            address: self.address.clone(),
            description: self.description.clone(),
            location: Coordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            owner_id: self.owner_id.clone(),
            contact_email: self.contact_email.clone(),
            image_ref: None,
            permit_image_refs: self.permit_image_refs.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub owners: Vec<SeedOwner>,
    pub stores: Vec<SeedStore>,
}

/// Load and validate a seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_seed_stores(path: &Path) -> Result<SeedFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SeedFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let seed: SeedFile = serde_yaml::from_str(&content)?;
    validate_seed(&seed)?;
    Ok(seed)
}

fn validate_seed(seed: &SeedFile) -> Result<(), ConfigError> {
    let mut owner_ids = HashSet::new();
    for owner in &seed.owners {
        if owner.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "owner id must be non-empty".to_string(),
            ));
        }
        if !owner_ids.insert(owner.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate owner id: '{}'",
                owner.id
            )));
        }
        if let Some(email) = &owner.email {
            if !is_plausible_email(email) {
                return Err(ConfigError::Validation(format!(
                    "owner '{}' has invalid email '{email}'",
                    owner.id
                )));
            }
        }
    }

    let mut seen = HashSet::new();
    for store in &seed.stores {
        if !owner_ids.contains(store.owner_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "store '{}' references unknown owner '{}'",
                store.name, store.owner_id
            )));
        }
        let key = (store.owner_id.as_str(), store.name.trim().to_lowercase());
        if !seen.insert(key) {
            return Err(ConfigError::Validation(format!(
                "duplicate store '{}' for owner '{}'",
                store.name, store.owner_id
            )));
        }
        store
            .to_new_store()
            .validated()
            .map_err(|e| ConfigError::Validation(format!("store '{}': {e}", store.name)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r"
owners:
  - id: owner-1
    email: owner1@example.com
    display_name: Ana
stores:
  - name: Sari-Sari Central
    address: Rizal St, Sorsogon City
    latitude: 12.975
    longitude: 124.005
    owner_id: owner-1
  - name: Bayside Mart
    address: Magsaysay Ave
    latitude: 12.68
    longitude: 123.87
    owner_id: owner-1
    contact_email: bayside@example.com
";

    #[test]
    fn parses_and_validates_seed() {
        let seed: SeedFile = serde_yaml::from_str(SEED).expect("parse");
        validate_seed(&seed).expect("valid");
        assert_eq!(seed.stores.len(), 2);
        assert_eq!(seed.stores[1].to_new_store().contact_email.as_deref(), Some("bayside@example.com"));
    }

    #[test]
    fn rejects_unknown_owner() {
        let mut seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        seed.stores[0].owner_id = "ghost".to_string();
        let err = validate_seed(&seed).unwrap_err();
        assert!(err.to_string().contains("unknown owner 'ghost'"));
    }

    #[test]
    fn rejects_duplicate_store_name_per_owner() {
        let mut seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        seed.stores[1].name = " sari-sari central".to_string();
        let err = validate_seed(&seed).unwrap_err();
        assert!(err.to_string().contains("duplicate store"));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let mut seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        seed.stores[0].latitude = 120.0;
        assert!(validate_seed(&seed).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_seed_stores(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::SeedFileIo { ref path, .. } if path.contains("here.yaml")));
    }
}

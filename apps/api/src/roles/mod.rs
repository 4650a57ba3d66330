//! Role Requirement Registry: the static catalog of roles loaded once at startup.
//!
//! The registry is immutable after construction and shared as `Arc<RoleRegistry>`,
//! so concurrent pipeline runs read it without synchronization.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::models::role::Role;

const DEFAULT_CATALOG: &str = include_str!("default_roles.toml");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read role catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid role catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate role id: {0}")]
    DuplicateRole(String),

    #[error("role entry #{0} has a blank id or title")]
    BlankField(usize),

    #[error("role catalog is empty")]
    EmptyCatalog,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    roles: Vec<Role>,
}

/// Read-only catalog of roles, kept in registration order.
#[derive(Debug)]
pub struct RoleRegistry {
    roles: Vec<Arc<Role>>,
    index: HashMap<String, usize>,
}

impl RoleRegistry {
    /// Builds a registry from roles in registration order.
    pub fn new(roles: Vec<Role>) -> Result<Self, RegistryError> {
        if roles.is_empty() {
            return Err(RegistryError::EmptyCatalog);
        }

        let mut index = HashMap::with_capacity(roles.len());
        let mut stored = Vec::with_capacity(roles.len());
        for (position, mut role) in roles.into_iter().enumerate() {
            role.id = role.id.trim().to_string();
            if role.id.is_empty() || role.title.trim().is_empty() {
                return Err(RegistryError::BlankField(position));
            }
            if index.insert(role.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateRole(role.id));
            }
            stored.push(Arc::new(role));
        }

        Ok(Self {
            roles: stored,
            index,
        })
    }

    /// Parses a TOML catalog of `[[roles]]` tables.
    pub fn from_toml(source: &str) -> Result<Self, RegistryError> {
        let catalog: CatalogFile = toml::from_str(source)?;
        Self::new(catalog.roles)
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml(DEFAULT_CATALOG)
    }

    /// Loads the catalog from `path`, or the built-in catalog when no path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        let registry = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&source)?
            }
            None => Self::builtin()?,
        };
        info!(
            "Role registry loaded: {} roles ({})",
            registry.roles.len(),
            path.map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );
        Ok(registry)
    }

    pub fn get(&self, role_id: &str) -> Result<Arc<Role>, UnknownRole> {
        self.index
            .get(role_id.trim())
            .map(|&position| Arc::clone(&self.roles[position]))
            .ok_or_else(|| UnknownRole(role_id.to_string()))
    }

    /// All roles in registration order.
    pub fn list(&self) -> &[Arc<Role>] {
        &self.roles
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_builtin_catalog_loads_in_registration_order() {
        let registry = RoleRegistry::builtin().unwrap();
        let ids: Vec<&str> = registry.list().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["ai_ml_engineer", "frontend_engineer", "backend_engineer"]
        );
    }

    #[test]
    fn test_get_is_idempotent() {
        let registry = RoleRegistry::builtin().unwrap();
        for role in registry.list() {
            let first = registry.get(&role.id).unwrap();
            let second = registry.get(&role.id).unwrap();
            assert_eq!(first, second);
            assert_eq!(*first, **role);
        }
    }

    #[test]
    fn test_get_unknown_role() {
        let registry = RoleRegistry::builtin().unwrap();
        assert_eq!(
            registry.get("astronaut"),
            Err(UnknownRole("astronaut".to_string()))
        );
    }

    #[test]
    fn test_requirements_keep_catalog_order() {
        let registry = RoleRegistry::builtin().unwrap();
        let backend = registry.get("backend_engineer").unwrap();
        assert_eq!(backend.title, "Backend Engineer");
        assert_eq!(backend.requirements[1], "REST APIs");
        assert_eq!(backend.requirements.last().unwrap(), "Kubernetes, Docker, CI/CD");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let source = r#"
            [[roles]]
            id = "backend"
            title = "Backend Engineer"

            [[roles]]
            id = "backend"
            title = "Backend Engineer II"
        "#;
        let err = RoleRegistry::from_toml(source).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRole(id) if id == "backend"));
    }

    #[test]
    fn test_blank_title_rejected() {
        let source = r#"
            [[roles]]
            id = "backend"
            title = "  "
        "#;
        let err = RoleRegistry::from_toml(source).unwrap_err();
        assert!(matches!(err, RegistryError::BlankField(0)));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            RoleRegistry::from_toml(""),
            Err(RegistryError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[roles]]
            id = "backend_engineer"
            title = "Backend Engineer"
            requirements = ["REST APIs", "Docker"]
            "#
        )
        .unwrap();

        let registry = RoleRegistry::load(Some(file.path())).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert_eq!(
            registry.get("backend_engineer").unwrap().requirements,
            vec!["REST APIs".to_string(), "Docker".to_string()]
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = RoleRegistry::load(Some(Path::new("/nonexistent/roles.toml"))).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}

//! Organization brand data.
//!
//! Brand profiles, personas and brand voices are owned by another system; the
//! gateway only reads them once a credential has resolved to an organization.
//! [`StaticBrandRepository`] serves them from a YAML file:
//!
//! ```yaml
//! organizations:
//!   org_1:
//!     profile:
//!       name: Acme
//!       tagline: Anvils for everyone
//!     personas:
//!       - name: Road Runner Fan
//!     voices:
//!       - name: Playful
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::Result;

/// Read access to organization-scoped brand data.
#[async_trait]
pub trait BrandRepository: Send + Sync + 'static {
    /// Brand profile of an organization, if it has one.
    async fn brand_profile(&self, organization_id: &str) -> Result<Option<Value>>;

    /// Personas of an organization.
    async fn personas(&self, organization_id: &str) -> Result<Vec<Value>>;

    /// Brand voices of an organization.
    async fn voices(&self, organization_id: &str) -> Result<Vec<Value>>;
}

/// Brand data of one organization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationBrand {
    /// Brand profile document.
    #[serde(default)]
    pub profile: Option<Value>,
    /// Persona documents.
    #[serde(default)]
    pub personas: Vec<Value>,
    /// Brand voice documents.
    #[serde(default)]
    pub voices: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BrandFile {
    #[serde(default)]
    organizations: HashMap<String, OrganizationBrand>,
}

/// Immutable brand data loaded at startup.
#[derive(Debug, Default)]
pub struct StaticBrandRepository {
    organizations: HashMap<String, OrganizationBrand>,
}

impl StaticBrandRepository {
    /// A repository with no organizations.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a repository from in-memory data.
    #[must_use]
    pub fn from_organizations(organizations: HashMap<String, OrganizationBrand>) -> Self {
        Self { organizations }
    }

    /// Load brand data from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: BrandFile = serde_yaml::from_str(&content)?;
        info!(
            path = %path.display(),
            organizations = file.organizations.len(),
            "Loaded brand data"
        );
        Ok(Self::from_organizations(file.organizations))
    }

    fn organization(&self, organization_id: &str) -> Option<&OrganizationBrand> {
        self.organizations.get(organization_id)
    }
}

#[async_trait]
impl BrandRepository for StaticBrandRepository {
    async fn brand_profile(&self, organization_id: &str) -> Result<Option<Value>> {
        Ok(self
            .organization(organization_id)
            .and_then(|o| o.profile.clone()))
    }

    async fn personas(&self, organization_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .organization(organization_id)
            .map(|o| o.personas.clone())
            .unwrap_or_default())
    }

    async fn voices(&self, organization_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .organization(organization_id)
            .map(|o| o.voices.clone())
            .unwrap_or_default())
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Key of the loan list inside the inventory document.
pub const LOANS_KEY: &str = "emprunts";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Administrator {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Administrator {
    pub fn role(&self) -> Role {
        if self.is_super_admin {
            Role::SuperAdmin
        } else {
            Role::Admin
        }
    }
}

/// Public view of an administrator (no password hash).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct AdministratorSummary {
    pub id: u64,
    pub name: String,
    pub email: String,
}

impl From<&Administrator> for AdministratorSummary {
    fn from(admin: &Administrator) -> Self {
        Self {
            id: admin.id,
            name: admin.name.clone(),
            email: admin.email.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "super admin")]
    SuperAdmin,
}

/// Claims carried by a session token.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub id: u64,
    pub nom: String,
    pub role: Role,
    pub exp: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct MaterialEntry {
    pub materiaux: String,
    pub nombre: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct Loan {
    pub id: u64,
    pub nom: String,
    pub numero: i64,
    #[schema(value_type = Vec<Object>)]
    pub materiaux: Vec<Map<String, Value>>,
}

/// The whole inventory state: one material list per workshop plus the loans.
///
/// Serialized flat, so workshops and `emprunts` share the top-level object.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InventoryDocument {
    #[serde(default)]
    pub emprunts: Vec<Loan>,
    #[serde(flatten)]
    pub ateliers: BTreeMap<String, Vec<MaterialEntry>>,
}

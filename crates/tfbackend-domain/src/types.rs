use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Opaque key shared by the lock and storage backends.
///
/// Derived as `sha256("<project>-<name>")`, hex encoded. Authenticators may
/// replace it with a credential-scoped identity via [`StateId::scoped_to`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(pub String);

impl StateId {
    pub fn derive(project: &str, name: &str) -> Self {
        StateId(sha256_hex(format!("{project}-{name}").as_bytes()))
    }

    /// Second-order identity: `sha256("<credential>:<self>")`.
    ///
    /// A state created under one credential is unreachable under any other.
    pub fn scoped_to(&self, credential: &str) -> Self {
        StateId(sha256_hex(format!("{credential}:{}", self.0).as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

// ── Lock info ────────────────────────────────────────────────────────────────

/// Lock holder description as sent by the Terraform HTTP backend client.
///
/// Field names follow the client's JSON wire format. Missing fields decode as
/// empty strings, which is also what an empty UNLOCK body turns into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "Who")]
    pub who: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Created")]
    pub created: String,
    #[serde(rename = "Info")]
    pub info: String,
}

impl LockInfo {
    pub fn from_json(body: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(body).map_err(DomainError::MalformedLockInfo)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self).map_err(DomainError::LockInfoEncoding)
    }

    /// True when the caller did not name a lock token (force-unlock request).
    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }
}

// Field-by-field so that two holders with the same token but different
// metadata never compare equal.
impl PartialEq for LockInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.path == other.path
            && self.operation == other.operation
            && self.who == other.who
            && self.version == other.version
            && self.created == other.created
            && self.info == other.info
    }
}

impl Eq for LockInfo {}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} by {} at {})", self.id, self.operation, self.who, self.created)
    }
}

// ── State ────────────────────────────────────────────────────────────────────

/// Per-request view of one Terraform state.
///
/// Never persisted as a whole: storage keeps `data` keyed by `id`, the locker
/// keeps `lock` keyed by the same `id`.
#[derive(Debug, Clone)]
pub struct State {
    pub id: StateId,
    pub project: String,
    pub name: String,
    pub data: Vec<u8>,
    pub lock: LockInfo,
}

impl State {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        let project = project.into();
        let name = name.into();
        Self {
            id: StateId::derive(&project, &name),
            project,
            name,
            data: Vec::new(),
            lock: LockInfo::default(),
        }
    }
}

// ── SQL names ────────────────────────────────────────────────────────────────

/// True when `name` can be spliced into SQL as an unquoted table name.
///
/// Table names come from configuration and cannot be bound as parameters.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

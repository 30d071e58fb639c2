//! Inventory store - the keyed record holding the catalog and the ledger
//!
//! The record carries two sub-documents of YAML text, `resources` and
//! `allocations`. Loading returns both plus a version token; saving replaces
//! `allocations` only and is refused when the token is stale, so concurrent
//! read-modify-write cycles surface as [`InventoryError::Conflict`] instead of
//! silently losing an update.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::catalog::ResourceCatalog;
use super::ledger::AllocationLedger;
use super::{InventoryError, ALLOCATIONS_KEY, INVENTORY_RECORD, RESOURCES_KEY};

/// Opaque version of the `allocations` sub-document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token derived from the document content
    pub fn digest(text: &str) -> Self {
        Self(format!("sha256:{:x}", Sha256::digest(text.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed view of the record at one point in time
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    pub catalog: ResourceCatalog,
    pub ledger: AllocationLedger,
    pub token: VersionToken,
}

/// The keyed record as stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub name: String,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl InventoryRecord {
    /// Build a record from a catalog and a ledger
    pub fn new(
        catalog: &ResourceCatalog,
        ledger: &AllocationLedger,
    ) -> Result<Self, InventoryError> {
        let mut data = BTreeMap::new();
        data.insert(
            RESOURCES_KEY.to_string(),
            serde_yaml::to_string(catalog).map_err(InventoryError::Serialize)?,
        );
        data.insert(
            ALLOCATIONS_KEY.to_string(),
            ledger.to_yaml().map_err(InventoryError::Serialize)?,
        );
        Ok(Self {
            name: INVENTORY_RECORD.to_string(),
            data,
        })
    }

    /// Raw `allocations` text; a missing key reads as an empty ledger
    pub fn allocations_text(&self) -> &str {
        self.data.get(ALLOCATIONS_KEY).map(String::as_str).unwrap_or("")
    }

    /// Parse both sub-documents
    pub fn parse(&self) -> Result<(ResourceCatalog, AllocationLedger), InventoryError> {
        let resources = self
            .data
            .get(RESOURCES_KEY)
            .ok_or(InventoryError::MissingKey(RESOURCES_KEY))?;

        let catalog = ResourceCatalog::from_yaml(resources).map_err(|source| {
            InventoryError::Parse {
                key: RESOURCES_KEY,
                source,
            }
        })?;

        let ledger = AllocationLedger::from_yaml(self.allocations_text()).map_err(|source| {
            InventoryError::Parse {
                key: ALLOCATIONS_KEY,
                source,
            }
        })?;

        Ok((catalog, ledger))
    }
}

/// Keyed document access to the inventory record
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Read the catalog, the ledger and the current version token
    async fn load(&self) -> Result<InventorySnapshot, InventoryError>;

    /// Replace the ledger if `token` is still current, returning the new token
    async fn save(
        &self,
        ledger: &AllocationLedger,
        token: &VersionToken,
    ) -> Result<VersionToken, InventoryError>;
}

// ============================================================================
// In-memory store
// ============================================================================

struct MemoryState {
    record: InventoryRecord,
    version: u64,
}

/// Inventory held in process memory, versioned by a counter
pub struct MemoryInventoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryInventoryStore {
    pub fn new(record: InventoryRecord) -> Self {
        Self {
            state: RwLock::new(MemoryState { record, version: 1 }),
        }
    }

    /// Seed the store from a catalog and a ledger
    pub fn from_parts(
        catalog: &ResourceCatalog,
        ledger: &AllocationLedger,
    ) -> Result<Self, InventoryError> {
        Ok(Self::new(InventoryRecord::new(catalog, ledger)?))
    }

    /// Copy of the stored record
    pub async fn record(&self) -> InventoryRecord {
        self.state.read().await.record.clone()
    }

    fn token(version: u64) -> VersionToken {
        VersionToken::new(format!("v{}", version))
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn load(&self) -> Result<InventorySnapshot, InventoryError> {
        let state = self.state.read().await;
        let (catalog, ledger) = state.record.parse()?;
        Ok(InventorySnapshot {
            catalog,
            ledger,
            token: Self::token(state.version),
        })
    }

    async fn save(
        &self,
        ledger: &AllocationLedger,
        token: &VersionToken,
    ) -> Result<VersionToken, InventoryError> {
        let mut state = self.state.write().await;
        let current = Self::token(state.version);
        if &current != token {
            return Err(InventoryError::Conflict {
                expected: token.to_string(),
                found: current.to_string(),
            });
        }

        let text = ledger.to_yaml().map_err(InventoryError::Serialize)?;
        state.record.data.insert(ALLOCATIONS_KEY.to_string(), text);
        state.version += 1;
        Ok(Self::token(state.version))
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Inventory kept in a YAML file, versioned by the digest of `allocations`
pub struct FileInventoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileInventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh record, replacing any existing file
    pub async fn initialize(&self, record: &InventoryRecord) -> Result<(), InventoryError> {
        let _guard = self.write_lock.lock().await;
        self.write_record(record).await
    }

    async fn read_record(&self) -> Result<InventoryRecord, InventoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InventoryError::RecordNotFound(
                    self.path.display().to_string(),
                ))
            }
            Err(e) => return Err(InventoryError::Io(e)),
        };

        serde_yaml::from_str(&content).map_err(|source| InventoryError::Parse {
            key: "record",
            source,
        })
    }

    async fn write_record(&self, record: &InventoryRecord) -> Result<(), InventoryError> {
        let content = serde_yaml::to_string(record).map_err(InventoryError::Serialize)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for FileInventoryStore {
    async fn load(&self) -> Result<InventorySnapshot, InventoryError> {
        let record = self.read_record().await?;
        let (catalog, ledger) = record.parse()?;
        Ok(InventorySnapshot {
            catalog,
            ledger,
            token: VersionToken::digest(record.allocations_text()),
        })
    }

    async fn save(
        &self,
        ledger: &AllocationLedger,
        token: &VersionToken,
    ) -> Result<VersionToken, InventoryError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self.read_record().await?;
        let current = VersionToken::digest(record.allocations_text());
        if &current != token {
            return Err(InventoryError::Conflict {
                expected: token.to_string(),
                found: current.to_string(),
            });
        }

        let text = ledger.to_yaml().map_err(InventoryError::Serialize)?;
        let next = VersionToken::digest(&text);
        record.data.insert(ALLOCATIONS_KEY.to_string(), text);
        self.write_record(&record).await?;

        debug!("Saved allocations to {} ({})", self.path.display(), next);
        Ok(next)
    }
}

use std::path::Path;

use chrono::Utc;
use sled::{Db, IVec};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Administrator, InventoryDocument};

/// Key of the single inventory document inside the `inventory` tree.
const INVENTORY_KEY: &[u8] = b"document";
/// Compare-and-swap attempts before an inventory update gives up.
const MAX_UPDATE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("an administrator with email {0} already exists")]
    DuplicateEmail(String),
    #[error("inventory document has not been initialized")]
    MissingInventory,
    #[error("inventory document kept changing during update")]
    Contention,
}

/// New administrator, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewAdministrator {
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub is_super_admin: bool,
}

/// Handle over the Sled database. Cheap to clone (Sled internals are shared).
#[derive(Clone)]
pub struct Storage {
    db: Db,
    // Trees:
    // - administrators: id (big endian u64) -> Administrator JSON
    // - administrator_emails: lowercase email -> id, enforces uniqueness
    // - inventory: the single inventory document
    admin_tree: sled::Tree,
    email_tree: sled::Tree,
    inventory_tree: sled::Tree,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: &str) -> Result<Self, StoreError> {
        info!(path, "opening store");
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store removed on drop, for tests and dry runs.
    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let admin_tree = db.open_tree("administrators")?;
        let email_tree = db.open_tree("administrator_emails")?;
        let inventory_tree = db.open_tree("inventory")?;
        Ok(Self {
            db,
            admin_tree,
            email_tree,
            inventory_tree,
        })
    }

    /// Flush pending writes. Called once on shutdown.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let flushed = self.db.flush_async().await?;
        info!(bytes = flushed, "store flushed");
        Ok(())
    }

    // --- Administrators ---

    /// Insert a new administrator. The email index is claimed first with a
    /// compare-and-swap, so two concurrent sign-ups cannot share an email.
    pub fn create_administrator(&self, new: NewAdministrator) -> Result<Administrator, StoreError> {
        let email = email_key(&new.email);
        let id = self.db.generate_id()?;

        let claimed = self
            .email_tree
            .compare_and_swap(email.as_bytes(), None::<&[u8]>, Some(&id.to_be_bytes()[..]))?;
        if claimed.is_err() {
            return Err(StoreError::DuplicateEmail(email));
        }

        let admin = Administrator {
            id,
            email,
            name: new.name,
            hashed_password: new.hashed_password,
            is_super_admin: new.is_super_admin,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&admin)?;
        if let Err(e) = self.admin_tree.insert(id.to_be_bytes(), bytes) {
            // Release the email so a retry can succeed.
            self.email_tree.remove(admin.email.as_bytes())?;
            return Err(e.into());
        }
        debug!(id, "administrator stored");
        Ok(admin)
    }

    pub fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.email_tree.contains_key(email_key(email).as_bytes())?)
    }

    pub fn get_administrator(&self, id: u64) -> Result<Option<Administrator>, StoreError> {
        match self.admin_tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn find_administrator_by_email(&self, email: &str) -> Result<Option<Administrator>, StoreError> {
        let Some(id_bytes) = self.email_tree.get(email_key(email).as_bytes())? else {
            return Ok(None);
        };
        match id_from_bytes(&id_bytes) {
            Some(id) => self.get_administrator(id),
            None => {
                warn!(email, "corrupt email index entry");
                Ok(None)
            }
        }
    }

    /// All administrators ordered by id.
    pub fn list_administrators(&self) -> Result<Vec<Administrator>, StoreError> {
        let mut admins = vec![];
        for item in self.admin_tree.iter() {
            let (_, value) = item?;
            admins.push(serde_json::from_slice(&value)?);
        }
        Ok(admins)
    }

    pub fn count_administrators(&self) -> usize {
        self.admin_tree.len()
    }

    /// Delete by id, releasing the email. Returns false if no such id.
    pub fn delete_administrator(&self, id: u64) -> Result<bool, StoreError> {
        let Some(bytes) = self.admin_tree.remove(id.to_be_bytes())? else {
            return Ok(false);
        };
        let admin: Administrator = serde_json::from_slice(&bytes)?;
        self.email_tree.remove(admin.email.as_bytes())?;
        Ok(true)
    }

    // --- Inventory document ---

    /// Store `seed` as the inventory document unless one already exists.
    /// Returns true when the seed was written.
    pub fn init_inventory(&self, seed: &InventoryDocument) -> Result<bool, StoreError> {
        let bytes = serde_json::to_vec(seed)?;
        let created = self
            .inventory_tree
            .compare_and_swap(INVENTORY_KEY, None::<&[u8]>, Some(bytes))?
            .is_ok();
        if created {
            info!("inventory document created");
        }
        Ok(created)
    }

    pub fn load_inventory(&self) -> Result<InventoryDocument, StoreError> {
        let bytes = self
            .inventory_tree
            .get(INVENTORY_KEY)?
            .ok_or(StoreError::MissingInventory)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read-modify-write of the whole document.
    ///
    /// The new document only replaces the exact bytes that were read; when
    /// another writer got there first, `mutate` runs again on the fresh
    /// document. `mutate` must therefore be repeatable.
    pub fn update_inventory<T, E, F>(&self, mut mutate: F) -> Result<T, E>
    where
        F: FnMut(&mut InventoryDocument) -> Result<T, E>,
        E: From<StoreError>,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current: IVec = self
                .inventory_tree
                .get(INVENTORY_KEY)
                .map_err(StoreError::from)?
                .ok_or(StoreError::MissingInventory)?;
            let mut doc: InventoryDocument =
                serde_json::from_slice(&current).map_err(StoreError::from)?;

            let result = mutate(&mut doc)?;

            let next = serde_json::to_vec(&doc).map_err(StoreError::from)?;
            let swapped = self
                .inventory_tree
                .compare_and_swap(INVENTORY_KEY, Some(current), Some(next))
                .map_err(StoreError::from)?;
            if swapped.is_ok() {
                return Ok(result);
            }
            debug!(attempt, "inventory changed concurrently, retrying");
        }
        warn!("giving up inventory update after {MAX_UPDATE_ATTEMPTS} attempts");
        Err(StoreError::Contention.into())
    }

    /// Fresh numeric id for a loan record.
    pub fn next_loan_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }
}

/// Reads an inventory document from a JSON file, for seeding a new store.
pub fn read_seed(path: &Path) -> Result<InventoryDocument, StoreError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn id_from_bytes(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryError;
    use std::sync::Arc;

    fn new_admin(email: &str, super_admin: bool) -> NewAdministrator {
        NewAdministrator {
            email: email.to_string(),
            name: "Test".to_string(),
            hashed_password: "hash".to_string(),
            is_super_admin: super_admin,
        }
    }

    #[derive(Debug)]
    enum TestError {
        Store(StoreError),
        Inventory(InventoryError),
    }

    impl From<StoreError> for TestError {
        fn from(e: StoreError) -> Self {
            TestError::Store(e)
        }
    }

    #[test]
    fn test_create_and_find_administrator() {
        let storage = Storage::open_temporary().expect("Failed to open storage");
        let created = storage
            .create_administrator(new_admin("Chef@Fablab.org", true))
            .expect("Create failed");

        assert_eq!(created.email, "chef@fablab.org");
        let found = storage
            .find_administrator_by_email("chef@FABLAB.org")
            .unwrap()
            .expect("Admin not found by email");
        assert_eq!(found.id, created.id);
        assert!(found.is_super_admin);
        assert!(storage.email_exists(" chef@fablab.org ").unwrap());
    }

    #[test]
    fn test_duplicate_email_is_rejected_without_new_row() {
        let storage = Storage::open_temporary().unwrap();
        storage.create_administrator(new_admin("a@fablab.org", false)).unwrap();

        let err = storage
            .create_administrator(new_admin("A@fablab.org", true))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail(_)));
        assert_eq!(storage.count_administrators(), 1);
    }

    #[test]
    fn test_delete_administrator_releases_email() {
        let storage = Storage::open_temporary().unwrap();
        let admin = storage.create_administrator(new_admin("a@fablab.org", false)).unwrap();

        assert!(storage.delete_administrator(admin.id).unwrap());
        assert!(!storage.delete_administrator(admin.id).unwrap());
        assert!(!storage.email_exists("a@fablab.org").unwrap());
        storage
            .create_administrator(new_admin("a@fablab.org", false))
            .expect("Email should be free again");
    }

    #[test]
    fn test_list_administrators_in_id_order() {
        let storage = Storage::open_temporary().unwrap();
        let first = storage.create_administrator(new_admin("a@fablab.org", false)).unwrap();
        let second = storage.create_administrator(new_admin("b@fablab.org", true)).unwrap();

        let ids: Vec<u64> = storage
            .list_administrators()
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn test_read_seed_file() {
        let dir = tempfile::tempdir().expect("Temp dir");
        let path = dir.path().join("inventaire.json");
        std::fs::write(&path, r#"{"bois": [{"materiaux": "vis", "nombre": 10}], "emprunts": []}"#).unwrap();

        let seed = read_seed(&path).expect("Seed parse failed");
        assert_eq!(seed.material("bois", "vis").unwrap().nombre, 10);
        assert!(matches!(read_seed(&dir.path().join("missing.json")), Err(StoreError::Io(_))));
    }

    #[test]
    fn test_init_inventory_only_once() {
        let storage = Storage::open_temporary().unwrap();
        assert!(matches!(storage.load_inventory(), Err(StoreError::MissingInventory)));

        let mut seed = InventoryDocument::default();
        seed.add_material("bois", "vis", 3).unwrap();
        assert!(storage.init_inventory(&seed).unwrap());
        assert!(!storage.init_inventory(&InventoryDocument::default()).unwrap());

        assert_eq!(storage.load_inventory().unwrap(), seed);
    }

    #[test]
    fn test_update_inventory_persists_and_propagates_errors() {
        let storage = Storage::open_temporary().unwrap();
        storage.init_inventory(&InventoryDocument::default()).unwrap();

        storage
            .update_inventory(|doc| doc.add_material("bois", "vis", 2).map_err(TestError::Inventory))
            .unwrap();
        let failed = storage
            .update_inventory(|doc| doc.add_material("bois", "vis", 0).map_err(TestError::Inventory));
        assert!(matches!(failed, Err(TestError::Inventory(InventoryError::InvalidCount))));

        let doc = storage.load_inventory().unwrap();
        assert_eq!(doc.material("bois", "vis").unwrap().nombre, 2);
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let storage = Arc::new(Storage::open_temporary().unwrap());
        storage.init_inventory(&InventoryDocument::default()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        // Plenty of retries: the test is about correctness, not contention.
                        loop {
                            let res = storage.update_inventory(|doc| {
                                doc.add_material("bois", "vis", 1).map_err(TestError::Inventory)
                            });
                            match res {
                                Ok(_) => break,
                                Err(TestError::Store(StoreError::Contention)) => continue,
                                Err(e) => panic!("unexpected error: {e:?}"),
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let doc = storage.load_inventory().unwrap();
        assert_eq!(doc.material("bois", "vis").unwrap().nombre, 80);
    }
}

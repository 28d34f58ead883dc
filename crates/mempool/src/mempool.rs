use crate::MempoolErrorKind;
use dyn_clone::DynClone;
use ethers::types::Address;
use kestrel_primitives::{simulation::CodeHash, UserOperation, UserOperationHash};
use parking_lot::RwLock;
use std::sync::Arc;

/// AddRemoveUserOp describes the ability to add and remove user operations
pub trait AddRemoveUserOp {
    /// Adds a [UserOperation](UserOperation) to the mempool
    ///
    /// # Arguments
    /// * `uo` - The [UserOperation](UserOperation) to add
    ///
    /// # Returns
    /// * `Ok(UserOperationHash)` - The hash of the added [UserOperation](UserOperation)
    /// * `Err(MempoolErrorKind)` - If the [UserOperation](UserOperation) could not be added
    fn add(&mut self, uo: UserOperation) -> Result<UserOperationHash, MempoolErrorKind>;

    /// Removes a [UserOperation](UserOperation) by its hash
    ///
    /// # Arguments
    /// * `uo_hash` - The hash of the [UserOperation](UserOperation) to remove
    ///
    /// # Returns
    /// * `Ok(bool)` - true if removed, false if it was not found
    /// * `Err(MempoolErrorKind)` - If there are some internal errors
    fn remove_by_uo_hash(&mut self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind>;
}

impl<T: AddRemoveUserOp> AddRemoveUserOp for Arc<RwLock<T>> {
    fn add(&mut self, uo: UserOperation) -> Result<UserOperationHash, MempoolErrorKind> {
        self.write().add(uo)
    }

    fn remove_by_uo_hash(&mut self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind> {
        self.write().remove_by_uo_hash(uo_hash)
    }
}

/// AddRemoveUserOpHash describes the ability to track the user operation hashes
/// associated with an address
pub trait AddRemoveUserOpHash {
    /// Associates a user operation hash with an address
    fn add(
        &mut self,
        address: &Address,
        uo_hash: UserOperationHash,
    ) -> Result<(), MempoolErrorKind>;

    /// Removes a user operation hash from an address
    ///
    /// # Returns
    /// * `Ok(true)` if the hash was removed, `Ok(false)` if the address was unknown
    fn remove_uo_hash(
        &mut self,
        address: &Address,
        uo_hash: &UserOperationHash,
    ) -> Result<bool, MempoolErrorKind>;
}

impl<T: AddRemoveUserOpHash> AddRemoveUserOpHash for Arc<RwLock<T>> {
    fn add(
        &mut self,
        address: &Address,
        uo_hash: UserOperationHash,
    ) -> Result<(), MempoolErrorKind> {
        self.write().add(address, uo_hash)
    }

    fn remove_uo_hash(
        &mut self,
        address: &Address,
        uo_hash: &UserOperationHash,
    ) -> Result<bool, MempoolErrorKind> {
        self.write().remove_uo_hash(address, uo_hash)
    }
}

/// Read access to stored user operations
pub trait UserOperationOp {
    /// Retrieves a user operation by its hash
    fn get_by_uo_hash(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Option<UserOperation>, MempoolErrorKind>;

    /// Retrieves all user operations in inclusion order: descending by
    /// `max_priority_fee_per_gas`, ascending nonce as tiebreak
    fn get_sorted(&self) -> Result<Vec<UserOperation>, MempoolErrorKind>;

    /// Retrieves all user operations
    fn get_all(&self) -> Result<Vec<UserOperation>, MempoolErrorKind>;
}

impl<T: UserOperationOp> UserOperationOp for Arc<RwLock<T>> {
    fn get_by_uo_hash(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Option<UserOperation>, MempoolErrorKind> {
        self.read().get_by_uo_hash(uo_hash)
    }

    fn get_sorted(&self) -> Result<Vec<UserOperation>, MempoolErrorKind> {
        self.read().get_sorted()
    }

    fn get_all(&self) -> Result<Vec<UserOperation>, MempoolErrorKind> {
        self.read().get_all()
    }
}

/// Read access to the address association maps
pub trait UserOperationAddrOp {
    /// Retrieves all user operation hashes associated with the given address
    fn get_all_by_address(&self, addr: &Address) -> Vec<UserOperationHash>;

    /// Number of user operation hashes associated with the given address
    fn get_number_by_address(&self, addr: &Address) -> usize {
        self.get_all_by_address(addr).len()
    }
}

impl<T: UserOperationAddrOp> UserOperationAddrOp for Arc<RwLock<T>> {
    fn get_all_by_address(&self, addr: &Address) -> Vec<UserOperationHash> {
        self.read().get_all_by_address(addr)
    }
}

/// Managing the code hashes referenced by user operations during validation
pub trait UserOperationCodeHashOp {
    /// Checks if the given user operation hash has associated code hashes
    fn has_code_hashes(&self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind>;

    /// Sets the code hashes for the given user operation hash
    fn set_code_hashes(
        &mut self,
        uo_hash: &UserOperationHash,
        hashes: Vec<CodeHash>,
    ) -> Result<(), MempoolErrorKind>;

    /// Retrieves the code hashes associated with the given user operation hash
    fn get_code_hashes(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Vec<CodeHash>, MempoolErrorKind>;

    /// Removes the code hashes associated with the given user operation hash
    fn remove_code_hashes(&mut self, uo_hash: &UserOperationHash)
        -> Result<bool, MempoolErrorKind>;
}

impl<T: UserOperationCodeHashOp> UserOperationCodeHashOp for Arc<RwLock<T>> {
    fn has_code_hashes(&self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind> {
        self.read().has_code_hashes(uo_hash)
    }

    fn set_code_hashes(
        &mut self,
        uo_hash: &UserOperationHash,
        hashes: Vec<CodeHash>,
    ) -> Result<(), MempoolErrorKind> {
        self.write().set_code_hashes(uo_hash, hashes)
    }

    fn get_code_hashes(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Vec<CodeHash>, MempoolErrorKind> {
        self.read().get_code_hashes(uo_hash)
    }

    fn remove_code_hashes(
        &mut self,
        uo_hash: &UserOperationHash,
    ) -> Result<bool, MempoolErrorKind> {
        self.write().remove_code_hashes(uo_hash)
    }
}

/// A trait for clearing operation
pub trait ClearOp {
    /// Clears the operation
    fn clear(&mut self);
}

impl<T: ClearOp> ClearOp for Arc<RwLock<T>> {
    fn clear(&mut self) {
        self.write().clear()
    }
}

pub trait UserOperationAct:
    AddRemoveUserOp + UserOperationOp + ClearOp + Send + Sync + DynClone
{
}

dyn_clone::clone_trait_object!(UserOperationAct);
impl<T> UserOperationAct for T where
    T: AddRemoveUserOp + UserOperationOp + ClearOp + Send + Sync + Clone
{
}

pub trait UserOperationAddrAct:
    AddRemoveUserOpHash + UserOperationAddrOp + ClearOp + Send + Sync + DynClone
{
}

dyn_clone::clone_trait_object!(UserOperationAddrAct);
impl<T> UserOperationAddrAct for T where
    T: AddRemoveUserOpHash + UserOperationAddrOp + ClearOp + Send + Sync + Clone
{
}

pub trait UserOperationCodeHashAct:
    UserOperationCodeHashOp + ClearOp + Send + Sync + DynClone
{
}

dyn_clone::clone_trait_object!(UserOperationCodeHashAct);
impl<T> UserOperationCodeHashAct for T where
    T: UserOperationCodeHashOp + ClearOp + Send + Sync + Clone
{
}

/// The user operation pool: operations by hash, plus association maps by
/// sender and by entity (factory/paymaster), plus validation code-hash
/// fingerprints
#[derive(Clone)]
pub struct Mempool {
    user_operations: Box<dyn UserOperationAct>,
    user_operations_by_sender: Box<dyn UserOperationAddrAct>,
    user_operations_by_entity: Box<dyn UserOperationAddrAct>,
    user_operations_code_hashes: Box<dyn UserOperationCodeHashAct>,
}

impl Mempool {
    pub fn new(
        user_operations: Box<dyn UserOperationAct>,
        user_operations_by_sender: Box<dyn UserOperationAddrAct>,
        user_operations_by_entity: Box<dyn UserOperationAddrAct>,
        user_operations_code_hashes: Box<dyn UserOperationCodeHashAct>,
    ) -> Self {
        Self {
            user_operations,
            user_operations_by_sender,
            user_operations_by_entity,
            user_operations_code_hashes,
        }
    }

    pub fn add(&mut self, uo: UserOperation) -> Result<UserOperationHash, MempoolErrorKind> {
        let (sender, factory, paymaster) = uo.get_entities();
        let uo_hash = uo.hash;
        self.user_operations.add(uo)?;
        self.user_operations_by_sender.add(&sender, uo_hash)?;
        if let Some(factory) = factory {
            self.user_operations_by_entity.add(&factory, uo_hash)?;
        }
        if let Some(paymaster) = paymaster {
            self.user_operations_by_entity.add(&paymaster, uo_hash)?;
        }
        Ok(uo_hash)
    }

    pub fn get(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Option<UserOperation>, MempoolErrorKind> {
        self.user_operations.get_by_uo_hash(uo_hash)
    }

    pub fn get_all_by_sender(&self, addr: &Address) -> Vec<UserOperation> {
        self.user_operations_by_sender
            .get_all_by_address(addr)
            .iter()
            .flat_map(|uo_hash| self.user_operations.get_by_uo_hash(uo_hash))
            .flatten()
            .collect()
    }

    pub fn get_number_by_sender(&self, addr: &Address) -> usize {
        self.user_operations_by_sender.get_number_by_address(addr)
    }

    pub fn get_number_by_entity(&self, addr: &Address) -> usize {
        self.user_operations_by_entity.get_number_by_address(addr)
    }

    /// Total number of mempool entries in which `addr` plays any role
    /// (sender, factory or paymaster)
    pub fn get_number_by_address(&self, addr: &Address) -> usize {
        self.get_number_by_sender(addr) + self.get_number_by_entity(addr)
    }

    /// Finds the entry this user operation would replace: same sender and nonce
    pub fn get_prev_by_sender(&self, uo: &UserOperation) -> Option<UserOperation> {
        self.user_operations_by_sender
            .get_all_by_address(&uo.sender)
            .iter()
            .flat_map(|uo_hash| self.get(uo_hash))
            .flatten()
            .filter(|uo_prev| uo_prev.nonce == uo.nonce)
            .max_by_key(|uo_prev| uo_prev.max_priority_fee_per_gas)
    }

    /// All sender addresses currently in the mempool
    pub fn get_senders(&self) -> Vec<Address> {
        self.user_operations
            .get_all()
            .unwrap_or_default()
            .iter()
            .map(|uo| uo.sender)
            .collect()
    }

    pub fn has_code_hashes(&self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind> {
        self.user_operations_code_hashes.has_code_hashes(uo_hash)
    }

    pub fn set_code_hashes(
        &mut self,
        uo_hash: &UserOperationHash,
        hashes: Vec<CodeHash>,
    ) -> Result<(), MempoolErrorKind> {
        self.user_operations_code_hashes.set_code_hashes(uo_hash, hashes)
    }

    pub fn get_code_hashes(
        &self,
        uo_hash: &UserOperationHash,
    ) -> Result<Vec<CodeHash>, MempoolErrorKind> {
        self.user_operations_code_hashes.get_code_hashes(uo_hash)
    }

    pub fn remove(&mut self, uo_hash: &UserOperationHash) -> Result<bool, MempoolErrorKind> {
        let uo = if let Some(user_op) = self.user_operations.get_by_uo_hash(uo_hash)? {
            user_op
        } else {
            return Ok(false);
        };

        let (sender, factory, paymaster) = uo.get_entities();

        self.user_operations.remove_by_uo_hash(uo_hash)?;

        self.user_operations_by_sender.remove_uo_hash(&sender, uo_hash)?;

        if let Some(factory) = factory {
            self.user_operations_by_entity.remove_uo_hash(&factory, uo_hash)?;
        }

        if let Some(paymaster) = paymaster {
            self.user_operations_by_entity.remove_uo_hash(&paymaster, uo_hash)?;
        }

        self.user_operations_code_hashes.remove_code_hashes(uo_hash)?;

        Ok(true)
    }

    /// Removes an entry by its replacement key `(sender, nonce)`
    pub fn remove_by_sender_nonce(
        &mut self,
        sender: &Address,
        nonce: ethers::types::U256,
    ) -> Result<bool, MempoolErrorKind> {
        let uo_hash = self
            .get_all_by_sender(sender)
            .iter()
            .find(|uo| uo.nonce == nonce)
            .map(|uo| uo.hash);

        match uo_hash {
            Some(uo_hash) => self.remove(&uo_hash),
            None => Ok(false),
        }
    }

    pub fn remove_by_entity(&mut self, entity: &Address) -> Result<(), MempoolErrorKind> {
        let uos = self.user_operations_by_entity.get_all_by_address(entity);

        for uo_hash in uos {
            self.remove(&uo_hash)?;
        }

        Ok(())
    }

    /// User operations in inclusion order
    pub fn get_sorted(&self) -> Result<Vec<UserOperation>, MempoolErrorKind> {
        self.user_operations.get_sorted()
    }

    pub fn get_all(&self) -> Result<Vec<UserOperation>, MempoolErrorKind> {
        self.user_operations.get_all()
    }

    pub fn len(&self) -> usize {
        self.user_operations.get_all().map(|uos| uos.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.user_operations.clear();
        self.user_operations_by_sender.clear();
        self.user_operations_by_entity.clear();
        self.user_operations_code_hashes.clear();
    }
}

// src/db/memory_store.rs
//
// Store em memória para os testes. Mesmo contrato do `PgStore`:
// `begin` trava o estado inteiro e trabalha numa cópia; `commit` publica a
// cópia e descartar o handle a joga fora (rollback).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    common::error::AppError,
    db::store::{Store, StoreTx},
    models::{
        auth::{NewUser, User},
        inventory::{Branch, BranchCategory, BranchItem, Category, Item, STATUS_FLAG_REMOVED},
        operations::Transaction,
        revision::{EntityKind, EntityRevision},
        tenancy::{Company, Permission},
    },
};

#[derive(Debug, Clone)]
pub struct MemoryState {
    pub users: BTreeMap<i64, User>,
    pub companies: BTreeMap<i64, Company>,
    pub permissions: BTreeMap<(i64, i64), Permission>,
    pub categories: BTreeMap<i64, Category>,
    pub items: BTreeMap<i64, Item>,
    pub branches: BTreeMap<i64, Branch>,
    pub branch_items: BTreeMap<(i64, i64), BranchItem>,
    pub branch_categories: BTreeMap<(i64, i64), BranchCategory>,
    pub transactions: BTreeMap<i64, Transaction>,
    pub revisions: Vec<EntityRevision>,
    counters: HashMap<(i64, EntityKind), i64>,
    /// Ordem em que a última transação tocou os contadores de revisão.
    pub counter_lock_order: Vec<(i64, EntityKind)>,
    next_user_id: i64,
    next_company_id: i64,
    next_category_id: i64,
    next_item_id: i64,
    next_branch_id: i64,
    next_transaction_id: i64,
    failing_revision_kind: Option<EntityKind>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            companies: BTreeMap::new(),
            permissions: BTreeMap::new(),
            categories: BTreeMap::new(),
            items: BTreeMap::new(),
            branches: BTreeMap::new(),
            branch_items: BTreeMap::new(),
            branch_categories: BTreeMap::new(),
            transactions: BTreeMap::new(),
            revisions: Vec::new(),
            counters: HashMap::new(),
            counter_lock_order: Vec::new(),
            next_user_id: 1,
            next_company_id: 1,
            // 1 é a categoria raiz
            next_category_id: 2,
            next_item_id: 100,
            next_branch_id: 1,
            next_transaction_id: 1,
            failing_revision_kind: None,
        }
    }
}

impl MemoryState {
    /// Revisões de um par (empresa, tipo) na ordem em que foram gravadas.
    pub fn revisions_of(&self, company_id: i64, kind: EntityKind) -> Vec<&EntityRevision> {
        self.revisions
            .iter()
            .filter(|r| r.company_id == company_id && r.entity_kind == kind)
            .collect()
    }
}

fn next_id(counter: &mut i64) -> i64 {
    let id = *counter;
    *counter += 1;
    id
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cópia do estado publicado.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Faz `insert_revision` falhar para um tipo (testes de rollback).
    pub async fn fail_revision_appends(&self, kind: EntityKind) {
        self.state.lock().await.failing_revision_kind = Some(kind);
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let mut working = guard.clone();
        working.counter_lock_order.clear();
        Ok(MemoryTx { guard, working })
    }

    async fn begin_read(&self) -> Result<MemoryTx, AppError> {
        self.begin().await
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> Result<(), AppError> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    // --- Usuários ---

    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn get_user_by_external_id(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.external_provider == provider && u.external_provider_user_id == provider_user_id)
            .cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError> {
        let duplicated = self.working.users.values().any(|u| {
            u.external_provider == user.external_provider
                && u.external_provider_user_id == user.external_provider_user_id
        });
        if duplicated {
            return Err(AppError::Conflict("Identidade externa já cadastrada".into()));
        }
        let row = User {
            user_id: next_id(&mut self.working.next_user_id),
            username: user.username.clone(),
            external_provider: user.external_provider.clone(),
            external_provider_user_id: user.external_provider_user_id.clone(),
            created_at: Utc::now(),
        };
        self.working.users.insert(row.user_id, row.clone());
        Ok(row)
    }

    async fn update_username(&mut self, user_id: i64, username: &str) -> Result<bool, AppError> {
        match self.working.users.get_mut(&user_id) {
            Some(user) => {
                user.username = username.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Empresas e permissões ---

    async fn insert_company(&mut self, name: &str, encoded_payment: &str) -> Result<Company, AppError> {
        let row = Company {
            company_id: next_id(&mut self.working.next_company_id),
            name: name.to_string(),
            encoded_payment: encoded_payment.to_string(),
            created_at: Utc::now(),
        };
        self.working.companies.insert(row.company_id, row.clone());
        Ok(row)
    }

    async fn get_company(&mut self, company_id: i64) -> Result<Option<Company>, AppError> {
        Ok(self.working.companies.get(&company_id).cloned())
    }

    async fn get_permission(&mut self, company_id: i64, user_id: i64) -> Result<Option<Permission>, AppError> {
        Ok(self.working.permissions.get(&(company_id, user_id)).cloned())
    }

    async fn insert_permission(&mut self, permission: &Permission) -> Result<bool, AppError> {
        let key = (permission.company_id, permission.user_id);
        if self.working.permissions.contains_key(&key) {
            return Ok(false);
        }
        self.working.permissions.insert(key, permission.clone());
        Ok(true)
    }

    async fn update_permission(&mut self, permission: &Permission) -> Result<bool, AppError> {
        match self.working.permissions.get_mut(&(permission.company_id, permission.user_id)) {
            Some(row) => {
                *row = permission.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_permission(&mut self, company_id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self.working.permissions.remove(&(company_id, user_id)).is_some())
    }

    async fn list_user_permissions(&mut self, user_id: i64) -> Result<Vec<Permission>, AppError> {
        Ok(self
            .working
            .permissions
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    // --- Categorias ---

    async fn get_category(&mut self, company_id: i64, category_id: i64) -> Result<Option<Category>, AppError> {
        Ok(self
            .working
            .categories
            .get(&category_id)
            .filter(|c| c.company_id == company_id)
            .cloned())
    }

    async fn get_category_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Category>, AppError> {
        Ok(self
            .working
            .categories
            .values()
            .find(|c| c.company_id == company_id && c.client_uuid == client_uuid)
            .cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<Option<Category>, AppError> {
        if self.get_category_by_uuid(category.company_id, &category.client_uuid).await?.is_some() {
            return Ok(None);
        }
        let mut row = category.clone();
        row.category_id = next_id(&mut self.working.next_category_id);
        self.working.categories.insert(row.category_id, row.clone());
        Ok(Some(row))
    }

    async fn update_category(&mut self, category: &Category) -> Result<bool, AppError> {
        match self.working.categories.get_mut(&category.category_id) {
            Some(row) if row.company_id == category.company_id => {
                row.parent_id = category.parent_id;
                row.name = category.name.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_category(&mut self, company_id: i64, category_id: i64) -> Result<bool, AppError> {
        let state = &self.working;
        let exists = state
            .categories
            .get(&category_id)
            .is_some_and(|c| c.company_id == company_id);
        let referenced = state.categories.values().any(|c| c.company_id == company_id && c.parent_id == category_id)
            || state.items.values().any(|i| {
                i.company_id == company_id && i.category_id == category_id && i.status_flag & STATUS_FLAG_REMOVED == 0
            })
            || state
                .branch_categories
                .values()
                .any(|bc| bc.company_id == company_id && bc.category_id == category_id);
        if !exists || referenced {
            return Ok(false);
        }
        self.working.categories.remove(&category_id);
        Ok(true)
    }

    // --- Itens ---

    async fn get_item(&mut self, company_id: i64, item_id: i64) -> Result<Option<Item>, AppError> {
        Ok(self.working.items.get(&item_id).filter(|i| i.company_id == company_id).cloned())
    }

    async fn get_item_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Item>, AppError> {
        Ok(self
            .working
            .items
            .values()
            .find(|i| i.company_id == company_id && i.client_uuid == client_uuid)
            .cloned())
    }

    async fn insert_item(&mut self, item: &Item) -> Result<Option<Item>, AppError> {
        if self.get_item_by_uuid(item.company_id, &item.client_uuid).await?.is_some() {
            return Ok(None);
        }
        let mut row = item.clone();
        row.item_id = next_id(&mut self.working.next_item_id);
        self.working.items.insert(row.item_id, row.clone());
        Ok(Some(row))
    }

    async fn update_item(&mut self, item: &Item) -> Result<bool, AppError> {
        match self.working.items.get_mut(&item.item_id) {
            Some(row) if row.company_id == item.company_id => {
                let client_uuid = std::mem::take(&mut row.client_uuid);
                *row = Item { client_uuid, ..item.clone() };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_item_removed(&mut self, company_id: i64, item_id: i64) -> Result<bool, AppError> {
        match self.working.items.get_mut(&item_id) {
            Some(row) if row.company_id == company_id && row.status_flag & STATUS_FLAG_REMOVED == 0 => {
                row.status_flag |= STATUS_FLAG_REMOVED;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // --- Filiais ---

    async fn get_branch(&mut self, company_id: i64, branch_id: i64) -> Result<Option<Branch>, AppError> {
        Ok(self.working.branches.get(&branch_id).filter(|b| b.company_id == company_id).cloned())
    }

    async fn get_branch_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Branch>, AppError> {
        Ok(self
            .working
            .branches
            .values()
            .find(|b| b.company_id == company_id && b.client_uuid == client_uuid)
            .cloned())
    }

    async fn insert_branch(&mut self, branch: &Branch) -> Result<Option<Branch>, AppError> {
        if self.get_branch_by_uuid(branch.company_id, &branch.client_uuid).await?.is_some() {
            return Ok(None);
        }
        let mut row = branch.clone();
        row.branch_id = next_id(&mut self.working.next_branch_id);
        self.working.branches.insert(row.branch_id, row.clone());
        Ok(Some(row))
    }

    async fn update_branch(&mut self, branch: &Branch) -> Result<bool, AppError> {
        match self.working.branches.get_mut(&branch.branch_id) {
            Some(row) if row.company_id == branch.company_id => {
                row.name = branch.name.clone();
                row.location = branch.location.clone();
                row.status_flag = branch.status_flag;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_branch_removed(&mut self, company_id: i64, branch_id: i64) -> Result<bool, AppError> {
        match self.working.branches.get_mut(&branch_id) {
            Some(row) if row.company_id == company_id && row.status_flag & STATUS_FLAG_REMOVED == 0 => {
                row.status_flag |= STATUS_FLAG_REMOVED;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // --- Saldos ---

    async fn get_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError> {
        Ok(self
            .working
            .branch_items
            .get(&(branch_id, item_id))
            .filter(|bi| bi.company_id == company_id)
            .cloned())
    }

    async fn lock_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError> {
        // O estado inteiro já está travado pela transação
        self.get_branch_item(company_id, branch_id, item_id).await
    }

    async fn insert_branch_item(&mut self, branch_item: &BranchItem) -> Result<BranchItem, AppError> {
        let key = (branch_item.branch_id, branch_item.item_id);
        let row = match self.working.branch_items.get_mut(&key) {
            Some(existing) => {
                existing.quantity += branch_item.quantity;
                existing.clone()
            }
            None => {
                self.working.branch_items.insert(key, branch_item.clone());
                branch_item.clone()
            }
        };
        Ok(row)
    }

    async fn update_branch_item(&mut self, branch_item: &BranchItem) -> Result<bool, AppError> {
        match self.working.branch_items.get_mut(&(branch_item.branch_id, branch_item.item_id)) {
            Some(row) if row.company_id == branch_item.company_id => {
                row.quantity = branch_item.quantity;
                row.item_location = branch_item.item_location.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_branch_item(&mut self, company_id: i64, branch_id: i64, item_id: i64) -> Result<bool, AppError> {
        let key = (branch_id, item_id);
        if self.working.branch_items.get(&key).is_some_and(|bi| bi.company_id == company_id) {
            self.working.branch_items.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    // --- Filial-categoria ---

    async fn get_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<Option<BranchCategory>, AppError> {
        Ok(self
            .working
            .branch_categories
            .get(&(branch_id, category_id))
            .filter(|bc| bc.company_id == company_id)
            .cloned())
    }

    async fn insert_branch_category(&mut self, branch_category: &BranchCategory) -> Result<bool, AppError> {
        let key = (branch_category.branch_id, branch_category.category_id);
        if self.working.branch_categories.contains_key(&key) {
            return Ok(false);
        }
        self.working.branch_categories.insert(key, branch_category.clone());
        Ok(true)
    }

    async fn delete_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<bool, AppError> {
        let key = (branch_id, category_id);
        if self.working.branch_categories.get(&key).is_some_and(|bc| bc.company_id == company_id) {
            self.working.branch_categories.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    // --- Transações ---

    async fn get_transaction(&mut self, company_id: i64, transaction_id: i64) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .working
            .transactions
            .get(&transaction_id)
            .filter(|t| t.company_id == company_id)
            .cloned())
    }

    async fn get_transaction_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .working
            .transactions
            .values()
            .find(|t| t.company_id == company_id && t.client_uuid == client_uuid)
            .cloned())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Option<Transaction>, AppError> {
        if self.get_transaction_by_uuid(transaction.company_id, &transaction.client_uuid).await?.is_some() {
            return Ok(None);
        }
        let mut row = transaction.clone();
        row.transaction_id = next_id(&mut self.working.next_transaction_id);
        self.working.transactions.insert(row.transaction_id, row.clone());
        Ok(Some(row))
    }

    // --- Revisões ---

    async fn next_revision_number(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError> {
        self.lock_revision_counter(company_id, kind).await?;
        let counter = self.working.counters.entry((company_id, kind)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn lock_revision_counter(&mut self, company_id: i64, kind: EntityKind) -> Result<(), AppError> {
        let key = (company_id, kind);
        if !self.working.counter_lock_order.contains(&key) {
            self.working.counter_lock_order.push(key);
        }
        Ok(())
    }

    async fn insert_revision(&mut self, revision: &EntityRevision) -> Result<(), AppError> {
        if self.working.failing_revision_kind == Some(revision.entity_kind) {
            return Err(AppError::InternalServerError(anyhow::anyhow!(
                "falha simulada ao gravar revisão de {}",
                revision.entity_kind.as_str()
            )));
        }
        let duplicated = self.working.revisions.iter().any(|r| {
            r.company_id == revision.company_id
                && r.entity_kind == revision.entity_kind
                && r.revision_number == revision.revision_number
        });
        if duplicated {
            return Err(AppError::Conflict("Número de revisão repetido".into()));
        }
        self.working.revisions.push(revision.clone());
        Ok(())
    }

    async fn max_revision(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError> {
        Ok(self
            .working
            .revisions
            .iter()
            .filter(|r| r.company_id == company_id && r.entity_kind == kind)
            .map(|r| r.revision_number)
            .max()
            .unwrap_or(0))
    }

    async fn revisions_after(
        &mut self,
        company_id: i64,
        kind: EntityKind,
        cursor: i64,
    ) -> Result<Vec<EntityRevision>, AppError> {
        let mut revisions: Vec<EntityRevision> = self
            .working
            .revisions
            .iter()
            .filter(|r| r.company_id == company_id && r.entity_kind == kind && r.revision_number > cursor)
            .cloned()
            .collect();
        revisions.sort_by_key(|r| r.revision_number);
        Ok(revisions)
    }
}

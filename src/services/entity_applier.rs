// src/services/entity_applier.rs
//
// Aplica o upload do SyncEntity dentro da transação de escrita:
// globaliza ids locais, grava as linhas e registra as revisões.
//
// Ordem de dependência: Category → Item → Branch → BranchItem →
// BranchCategory → Member. Creates e updates seguem essa ordem; os deletes
// rodam no fim, na ordem inversa, para que um pai só seja removido depois
// dos filhos do mesmo upload.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{
    common::error::AppError,
    db::StoreTx,
    models::{
        inventory::{
            category_id_from_client, Branch, BranchCategory, BranchItem, Category, CompositeId, Item, ROOT_CATEGORY_ID,
        },
        revision::{EntityKind, RevisionAction},
        sync::{
            BranchField, BranchItemField, CategoryField, ItemField, KindUpload, MemberField, ParsedUpload,
            SyncRecord, UpdatedId,
        },
        tenancy::{Member, Permission, PermissionGrant, PermissionType},
    },
    services::revision_log,
};

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidArgument(message.into())
}

// ---
// 1. Mapeamento de ids locais → ids do servidor
// ---
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdRemap {
    pub categories: BTreeMap<i64, i64>,
    pub items: BTreeMap<i64, i64>,
    pub branches: BTreeMap<i64, i64>,
    pub branch_items: BTreeMap<CompositeId, CompositeId>,
    pub branch_categories: BTreeMap<CompositeId, CompositeId>,

    // Linhas realmente inseridas nesta chamada (replays não entram)
    pub created_categories: BTreeSet<i64>,
    pub created_items: BTreeSet<i64>,
    pub created_branches: BTreeSet<i64>,
    pub created_branch_items: BTreeSet<CompositeId>,
    pub created_branch_categories: BTreeSet<CompositeId>,
}

impl IdRemap {
    pub fn updated_ids(map: &BTreeMap<i64, i64>) -> Vec<UpdatedId> {
        map.iter().map(|(&old_id, &new_id)| UpdatedId { old_id, new_id }).collect()
    }
}

fn resolve_local(map: &BTreeMap<i64, i64>, kind: EntityKind, id: i64) -> Result<i64, AppError> {
    match id {
        0 => Err(invalid(format!("{}: id 0 é inválido", kind.body_key()))),
        id if id < 0 => map.get(&id).copied().ok_or_else(|| {
            invalid(format!("{}: id local {} não foi criado neste upload", kind.body_key(), id))
        }),
        id => Ok(id),
    }
}

fn require_client_uuid(kind: EntityKind, id: i64, client_uuid: &str) -> Result<(), AppError> {
    if client_uuid.is_empty() {
        return Err(invalid(format!("{}: create {} sem client_uuid", kind.body_key(), id)));
    }
    Ok(())
}

// ---
// 2. O applier: transação aberta + contexto do chamador + mapas
// ---
pub struct EntityApplier<'t, T: StoreTx> {
    tx: &'t mut T,
    company_id: i64,
    caller: &'t Permission,
    remap: IdRemap,
}

impl<'t, T: StoreTx> EntityApplier<'t, T> {
    pub fn new(tx: &'t mut T, company_id: i64, caller: &'t Permission) -> Self {
        Self { tx, company_id, caller, remap: IdRemap::default() }
    }

    pub async fn apply(mut self, upload: &ParsedUpload) -> Result<IdRemap, AppError> {
        let members = upload.members.as_ref().filter(|m| !m.is_empty());
        let members = match members {
            Some(members) if self.caller.permission_type.at_least(PermissionType::Manager) => Some(members),
            Some(_) => {
                tracing::debug!(
                    "Bloco de membros ignorado: usuário {} é {:?}",
                    self.caller.user_id,
                    self.caller.permission_type
                );
                None
            }
            None => None,
        };

        // Contadores travados antes de qualquer escrita: creates e deletes
        // andam em ordens opostas de tipo
        revision_log::lock_counters(&mut *self.tx, self.company_id, touched_kinds(upload, members.is_some())).await?;

        if let Some(categories) = &upload.categories {
            self.create_categories(&categories.create).await?;
            self.update_categories(&categories.update).await?;
        }
        if let Some(items) = &upload.items {
            self.create_items(&items.create).await?;
            self.update_items(&items.update).await?;
        }
        if let Some(branches) = &upload.branches {
            self.create_branches(&branches.create).await?;
            self.update_branches(&branches.update).await?;
        }
        if let Some(branch_items) = &upload.branch_items {
            self.create_branch_items(&branch_items.create).await?;
            self.update_branch_items(&branch_items.update).await?;
        }
        if let Some(branch_categories) = &upload.branch_categories {
            self.create_branch_categories(&branch_categories.create).await?;
        }
        if let Some(members) = members {
            self.update_members(&members.update).await?;
        }

        // --- Deletes, do dependente para a dependência ---
        if let Some(members) = members {
            self.delete_members(&members.delete).await?;
        }
        if let Some(branch_categories) = &upload.branch_categories {
            self.delete_branch_categories(&branch_categories.delete).await?;
        }
        if let Some(branch_items) = &upload.branch_items {
            self.delete_branch_items(&branch_items.delete).await?;
        }
        if let Some(branches) = &upload.branches {
            self.delete_branches(&branches.delete).await?;
        }
        if let Some(items) = &upload.items {
            self.delete_items(&items.delete).await?;
        }
        if let Some(categories) = &upload.categories {
            self.delete_categories(&categories.delete).await?;
        }

        Ok(self.remap)
    }

    async fn revision(
        &mut self,
        kind: EntityKind,
        action: RevisionAction,
        affected_id: i64,
        additional_info: i64,
    ) -> Result<(), AppError> {
        revision_log::record(&mut *self.tx, self.company_id, kind, action, affected_id, additional_info).await?;
        Ok(())
    }

    // =========================================================================
    //  REFERÊNCIAS
    // =========================================================================

    /// Resolve uma referência a categoria (raiz, id local criado agora ou id do servidor).
    async fn category_ref(&mut self, id: i64) -> Result<i64, AppError> {
        let id = category_id_from_client(id);
        if id == ROOT_CATEGORY_ID {
            return Ok(id);
        }
        let resolved = resolve_local(&self.remap.categories, EntityKind::Category, id)?;
        if id > 0 && self.tx.get_category(self.company_id, resolved).await?.is_none() {
            return Err(AppError::NotFound(format!("Categoria {}", resolved)));
        }
        Ok(resolved)
    }

    async fn item_ref(&mut self, id: i64) -> Result<i64, AppError> {
        let resolved = resolve_local(&self.remap.items, EntityKind::Item, id)?;
        if id > 0 && self.tx.get_item(self.company_id, resolved).await?.is_none() {
            return Err(AppError::NotFound(format!("Item {}", resolved)));
        }
        Ok(resolved)
    }

    async fn branch_ref(&mut self, id: i64) -> Result<i64, AppError> {
        let resolved = resolve_local(&self.remap.branches, EntityKind::Branch, id)?;
        if id > 0 && self.tx.get_branch(self.company_id, resolved).await?.is_none() {
            return Err(AppError::NotFound(format!("Filial {}", resolved)));
        }
        Ok(resolved)
    }

    // =========================================================================
    //  CATEGORIAS
    // =========================================================================

    async fn create_categories(&mut self, creates: &[SyncRecord<Category>]) -> Result<(), AppError> {
        let by_id: HashMap<i64, &SyncRecord<Category>> =
            creates.iter().map(|r| (r.values.category_id, r)).collect();
        for record in creates {
            require_client_uuid(EntityKind::Category, record.values.category_id, &record.values.client_uuid)?;
        }

        // Pilha semeada ao contrário: o primeiro pop é o primeiro create
        let mut stack: Vec<i64> = creates.iter().rev().map(|r| r.values.category_id).collect();
        let mut waiting: HashSet<i64> = HashSet::new();

        while let Some(local_id) = stack.pop() {
            if self.remap.categories.contains_key(&local_id) {
                continue;
            }
            let Some(record) = by_id.get(&local_id) else {
                return Err(invalid(format!("category: pai local {} não está entre os creates", local_id)));
            };
            let values = &record.values;

            // --- 1. Replay: o client_uuid já existe ---
            if let Some(existing) = self.tx.get_category_by_uuid(self.company_id, &values.client_uuid).await? {
                self.remap.categories.insert(local_id, existing.category_id);
                continue;
            }

            // --- 2. Pai ainda não criado: ele vai para o topo ---
            let parent_id = values.parent_id;
            if parent_id < 0 && !self.remap.categories.contains_key(&parent_id) {
                if !by_id.contains_key(&parent_id) {
                    return Err(invalid(format!("category: pai local {} não está entre os creates", parent_id)));
                }
                if !waiting.insert(local_id) {
                    return Err(invalid(format!("category: ciclo de pais envolvendo {}", local_id)));
                }
                stack.push(local_id);
                stack.push(parent_id);
                continue;
            }

            // --- 3. Pai resolvido: insere ---
            let parent_id = self.category_ref(parent_id).await?;
            let row = Category {
                category_id: 0,
                company_id: self.company_id,
                parent_id,
                name: values.name.clone(),
                client_uuid: values.client_uuid.clone(),
            };
            match self.tx.insert_category(&row).await? {
                Some(inserted) => {
                    self.remap.categories.insert(local_id, inserted.category_id);
                    self.remap.created_categories.insert(inserted.category_id);
                    self.revision(EntityKind::Category, RevisionAction::Create, inserted.category_id, 0).await?;
                }
                None => {
                    // Outra chamada gravou o mesmo uuid entre a leitura e o insert
                    let existing = self
                        .tx
                        .get_category_by_uuid(self.company_id, &values.client_uuid)
                        .await?
                        .ok_or_else(|| AppError::Conflict(format!("Categoria '{}'", values.client_uuid)))?;
                    self.remap.categories.insert(local_id, existing.category_id);
                }
            }
        }

        tracing::debug!("Categorias: {} mapeadas", self.remap.categories.len());
        Ok(())
    }

    async fn update_categories(&mut self, updates: &[SyncRecord<Category>]) -> Result<(), AppError> {
        for record in updates {
            let category_id = resolve_local(&self.remap.categories, EntityKind::Category, record.values.category_id)?;
            let mut current = self
                .tx
                .get_category(self.company_id, category_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Categoria {}", category_id)))?;

            if record.fields.contains(CategoryField::ParentId) {
                let parent_id = self.category_ref(record.values.parent_id).await?;
                self.ensure_not_ancestor(category_id, parent_id).await?;
                current.parent_id = parent_id;
            }
            if record.fields.contains(CategoryField::Name) {
                current.name = record.values.name.clone();
            }

            self.tx.update_category(&current).await?;
            self.revision(EntityKind::Category, RevisionAction::Update, category_id, 0).await?;
        }
        Ok(())
    }

    /// Falha se `category_id` aparece na cadeia de pais de `new_parent`.
    async fn ensure_not_ancestor(&mut self, category_id: i64, new_parent: i64) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        let mut cursor = new_parent;
        while cursor != ROOT_CATEGORY_ID {
            if cursor == category_id || !seen.insert(cursor) {
                return Err(invalid(format!("category: mover {} para {} cria um ciclo", category_id, new_parent)));
            }
            match self.tx.get_category(self.company_id, cursor).await? {
                Some(parent) => cursor = parent.parent_id,
                None => break,
            }
        }
        Ok(())
    }

    async fn delete_categories(&mut self, deletes: &[i64]) -> Result<(), AppError> {
        for &id in deletes {
            let category_id = resolve_local(&self.remap.categories, EntityKind::Category, id)?;
            if self.tx.delete_category(self.company_id, category_id).await? {
                self.revision(EntityKind::Category, RevisionAction::Delete, category_id, 0).await?;
            } else {
                tracing::debug!("Categoria {} não removida (inexistente ou em uso)", category_id);
            }
        }
        Ok(())
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    async fn create_items(&mut self, creates: &[SyncRecord<Item>]) -> Result<(), AppError> {
        for record in creates {
            let values = &record.values;
            let local_id = values.item_id;
            require_client_uuid(EntityKind::Item, local_id, &values.client_uuid)?;

            if let Some(existing) = self.tx.get_item_by_uuid(self.company_id, &values.client_uuid).await? {
                self.remap.items.insert(local_id, existing.item_id);
                continue;
            }

            let mut row = values.clone();
            row.company_id = self.company_id;
            row.category_id = self.category_ref(values.category_id).await?;

            match self.tx.insert_item(&row).await? {
                Some(inserted) => {
                    self.remap.items.insert(local_id, inserted.item_id);
                    self.remap.created_items.insert(inserted.item_id);
                    self.revision(EntityKind::Item, RevisionAction::Create, inserted.item_id, 0).await?;
                }
                None => {
                    let existing = self
                        .tx
                        .get_item_by_uuid(self.company_id, &values.client_uuid)
                        .await?
                        .ok_or_else(|| AppError::Conflict(format!("Item '{}'", values.client_uuid)))?;
                    self.remap.items.insert(local_id, existing.item_id);
                }
            }
        }
        Ok(())
    }

    async fn update_items(&mut self, updates: &[SyncRecord<Item>]) -> Result<(), AppError> {
        for record in updates {
            let item_id = resolve_local(&self.remap.items, EntityKind::Item, record.values.item_id)?;
            let mut current = self
                .tx
                .get_item(self.company_id, item_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Item {}", item_id)))?;

            let (fields, values) = (record.fields, &record.values);
            if fields.contains(ItemField::CategoryId) {
                current.category_id = self.category_ref(values.category_id).await?;
            }
            if fields.contains(ItemField::Name) {
                current.name = values.name.clone();
            }
            if fields.contains(ItemField::ItemCode) {
                current.item_code = values.item_code.clone();
            }
            if fields.contains(ItemField::UnitOfMeasurement) {
                current.unit_of_measurement = values.unit_of_measurement.clone();
            }
            if fields.contains(ItemField::HasDerivedUnit) {
                current.has_derived_unit = values.has_derived_unit;
            }
            if fields.contains(ItemField::DerivedName) {
                current.derived_name = values.derived_name.clone();
            }
            if fields.contains(ItemField::DerivedFactor) {
                current.derived_factor = values.derived_factor;
            }
            if fields.contains(ItemField::StatusFlag) {
                current.status_flag = values.status_flag;
            }

            self.tx.update_item(&current).await?;
            self.revision(EntityKind::Item, RevisionAction::Update, item_id, 0).await?;
        }
        Ok(())
    }

    async fn delete_items(&mut self, deletes: &[i64]) -> Result<(), AppError> {
        for &id in deletes {
            let item_id = resolve_local(&self.remap.items, EntityKind::Item, id)?;
            if self.tx.mark_item_removed(self.company_id, item_id).await? {
                self.revision(EntityKind::Item, RevisionAction::Delete, item_id, 0).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    //  FILIAIS
    // =========================================================================

    async fn create_branches(&mut self, creates: &[SyncRecord<Branch>]) -> Result<(), AppError> {
        for record in creates {
            let values = &record.values;
            let local_id = values.branch_id;
            require_client_uuid(EntityKind::Branch, local_id, &values.client_uuid)?;

            if let Some(existing) = self.tx.get_branch_by_uuid(self.company_id, &values.client_uuid).await? {
                self.remap.branches.insert(local_id, existing.branch_id);
                continue;
            }

            let mut row = values.clone();
            row.company_id = self.company_id;

            match self.tx.insert_branch(&row).await? {
                Some(inserted) => {
                    self.remap.branches.insert(local_id, inserted.branch_id);
                    self.remap.created_branches.insert(inserted.branch_id);
                    self.revision(EntityKind::Branch, RevisionAction::Create, inserted.branch_id, 0).await?;
                }
                None => {
                    let existing = self
                        .tx
                        .get_branch_by_uuid(self.company_id, &values.client_uuid)
                        .await?
                        .ok_or_else(|| AppError::Conflict(format!("Filial '{}'", values.client_uuid)))?;
                    self.remap.branches.insert(local_id, existing.branch_id);
                }
            }
        }
        Ok(())
    }

    async fn update_branches(&mut self, updates: &[SyncRecord<Branch>]) -> Result<(), AppError> {
        for record in updates {
            let branch_id = resolve_local(&self.remap.branches, EntityKind::Branch, record.values.branch_id)?;
            let mut current = self
                .tx
                .get_branch(self.company_id, branch_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Filial {}", branch_id)))?;

            if record.fields.contains(BranchField::Name) {
                current.name = record.values.name.clone();
            }
            if record.fields.contains(BranchField::Location) {
                current.location = record.values.location.clone();
            }
            if record.fields.contains(BranchField::StatusFlag) {
                current.status_flag = record.values.status_flag;
            }

            self.tx.update_branch(&current).await?;
            self.revision(EntityKind::Branch, RevisionAction::Update, branch_id, 0).await?;
        }
        Ok(())
    }

    async fn delete_branches(&mut self, deletes: &[i64]) -> Result<(), AppError> {
        for &id in deletes {
            let branch_id = resolve_local(&self.remap.branches, EntityKind::Branch, id)?;
            if self.tx.mark_branch_removed(self.company_id, branch_id).await? {
                self.revision(EntityKind::Branch, RevisionAction::Delete, branch_id, 0).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    //  SALDOS (BRANCH-ITEMS)
    // =========================================================================

    async fn branch_item_key(&mut self, key: CompositeId) -> Result<CompositeId, AppError> {
        let branch_id = self.branch_ref(key.0).await?;
        let item_id = self.item_ref(key.1).await?;
        Ok(CompositeId(branch_id, item_id))
    }

    async fn create_branch_items(&mut self, creates: &[SyncRecord<BranchItem>]) -> Result<(), AppError> {
        for record in creates {
            let local = CompositeId(record.values.branch_id, record.values.item_id);
            let key = self.branch_item_key(local).await?;
            self.remap.branch_items.insert(local, key);

            if self.tx.get_branch_item(self.company_id, key.0, key.1).await?.is_some() {
                continue;
            }

            // A quantidade só muda via transações
            let row = BranchItem {
                company_id: self.company_id,
                branch_id: key.0,
                item_id: key.1,
                quantity: Default::default(),
                item_location: record.values.item_location.clone(),
            };
            self.tx.insert_branch_item(&row).await?;
            self.remap.created_branch_items.insert(key);
            self.revision(EntityKind::BranchItem, RevisionAction::Create, key.0, key.1).await?;
        }
        Ok(())
    }

    async fn update_branch_items(&mut self, updates: &[SyncRecord<BranchItem>]) -> Result<(), AppError> {
        for record in updates {
            let key = self.branch_item_key(CompositeId(record.values.branch_id, record.values.item_id)).await?;
            let mut current = self
                .tx
                .lock_branch_item(self.company_id, key.0, key.1)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Saldo {}", key)))?;

            if record.fields.contains(BranchItemField::ItemLocation) {
                current.item_location = record.values.item_location.clone();
            }

            self.tx.update_branch_item(&current).await?;
            self.revision(EntityKind::BranchItem, RevisionAction::Update, key.0, key.1).await?;
        }
        Ok(())
    }

    async fn delete_branch_items(&mut self, deletes: &[CompositeId]) -> Result<(), AppError> {
        for &local in deletes {
            let branch_id = resolve_local(&self.remap.branches, EntityKind::Branch, local.0)?;
            let item_id = resolve_local(&self.remap.items, EntityKind::Item, local.1)?;
            if self.tx.delete_branch_item(self.company_id, branch_id, item_id).await? {
                self.revision(EntityKind::BranchItem, RevisionAction::Delete, branch_id, item_id).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    //  FILIAL-CATEGORIA
    // =========================================================================

    async fn create_branch_categories(&mut self, creates: &[SyncRecord<BranchCategory>]) -> Result<(), AppError> {
        for record in creates {
            let local = CompositeId(record.values.branch_id, record.values.category_id);
            let branch_id = self.branch_ref(local.0).await?;
            let category_id = self.category_ref(local.1).await?;
            let key = CompositeId(branch_id, category_id);
            self.remap.branch_categories.insert(local, key);

            let row = BranchCategory { company_id: self.company_id, branch_id, category_id };
            if self.tx.insert_branch_category(&row).await? {
                self.remap.created_branch_categories.insert(key);
                self.revision(EntityKind::BranchCategory, RevisionAction::Create, branch_id, category_id).await?;
            }
        }
        Ok(())
    }

    async fn delete_branch_categories(&mut self, deletes: &[CompositeId]) -> Result<(), AppError> {
        for &local in deletes {
            let branch_id = resolve_local(&self.remap.branches, EntityKind::Branch, local.0)?;
            let category_id = category_id_from_client(local.1);
            let category_id = resolve_local(&self.remap.categories, EntityKind::Category, category_id)?;
            if self.tx.delete_branch_category(self.company_id, branch_id, category_id).await? {
                self.revision(EntityKind::BranchCategory, RevisionAction::Delete, branch_id, category_id).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    //  MEMBROS
    // =========================================================================

    /// O chamador só mexe em quem está no máximo no seu nível, e nunca no OWNER.
    fn ensure_can_manage(&self, target: &Permission) -> Result<(), AppError> {
        if target.permission_type == PermissionType::Owner {
            return Err(AppError::PermissionDenied("A permissão do dono não pode ser alterada".into()));
        }
        if !self.caller.permission_type.at_least(target.permission_type) {
            return Err(AppError::PermissionDenied(format!("Sem nível para alterar o usuário {}", target.user_id)));
        }
        Ok(())
    }

    async fn update_members(&mut self, updates: &[SyncRecord<Member>]) -> Result<(), AppError> {
        for record in updates {
            let user_id = record.values.user_id;
            if user_id <= 0 {
                return Err(invalid(format!("member: user_id {} inválido", user_id)));
            }
            let current = self
                .tx
                .get_permission(self.company_id, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Funcionário {}", user_id)))?;
            self.ensure_can_manage(&current)?;

            let mut grant: PermissionGrant = current.grant();
            if record.fields.contains(MemberField::PermissionType) {
                let requested = record.values.permission_type;
                if requested == PermissionType::Owner || !self.caller.permission_type.at_least(requested) {
                    return Err(AppError::PermissionDenied(format!("Não é possível conceder {:?}", requested)));
                }
                grant.permission_type = requested;
            }
            if record.fields.contains(MemberField::BranchesAllowed) {
                grant.branches_allowed = record.values.branches_allowed.clone();
            }
            if record.fields.contains(MemberField::StoresAllowed) {
                grant.stores_allowed = record.values.stores_allowed.clone();
            }

            let updated = Permission::from_grant(self.company_id, user_id, &grant)?;
            self.tx.update_permission(&updated).await?;
            self.revision(EntityKind::Member, RevisionAction::Update, user_id, 0).await?;
        }
        Ok(())
    }

    async fn delete_members(&mut self, deletes: &[i64]) -> Result<(), AppError> {
        for &user_id in deletes {
            let Some(current) = self.tx.get_permission(self.company_id, user_id).await? else {
                continue;
            };
            self.ensure_can_manage(&current)?;
            if self.tx.delete_permission(self.company_id, user_id).await? {
                self.revision(EntityKind::Member, RevisionAction::Delete, user_id, 0).await?;
            }
        }
        Ok(())
    }
}

/// Total de operações do upload (para o log da chamada).
/// Tipos que recebem alguma operação no upload.
fn touched_kinds(upload: &ParsedUpload, with_members: bool) -> Vec<EntityKind> {
    fn touched<T, K>(kind: &Option<KindUpload<T, K>>) -> bool {
        kind.as_ref().is_some_and(|k| !k.create.is_empty() || !k.update.is_empty() || !k.delete.is_empty())
    }
    [
        (EntityKind::Category, touched(&upload.categories)),
        (EntityKind::Item, touched(&upload.items)),
        (EntityKind::Branch, touched(&upload.branches)),
        (EntityKind::BranchItem, touched(&upload.branch_items)),
        (EntityKind::BranchCategory, touched(&upload.branch_categories)),
        (EntityKind::Member, with_members),
    ]
    .into_iter()
    .filter_map(|(kind, touched)| touched.then_some(kind))
    .collect()
}

pub fn operation_counts(upload: &ParsedUpload) -> (usize, usize, usize) {
    fn add<T, K>(acc: (usize, usize, usize), kind: &Option<KindUpload<T, K>>) -> (usize, usize, usize) {
        match kind {
            Some(k) => (acc.0 + k.create.len(), acc.1 + k.update.len(), acc.2 + k.delete.len()),
            None => acc,
        }
    }
    let acc = add((0, 0, 0), &upload.categories);
    let acc = add(acc, &upload.items);
    let acc = add(acc, &upload.branches);
    let acc = add(acc, &upload.branch_items);
    let acc = add(acc, &upload.branch_categories);
    add(acc, &upload.members)
}

// src/models/sync.rs
//
// Estruturas do protocolo de sincronização: o upload esparso que o parser
// produz e as respostas que voltam para o cliente.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{
    inventory::{Branch, BranchCategory, BranchItem, Category, CompositeId, Item},
    operations::{PostedTransaction, Transaction},
    tenancy::Member,
};

// ---
// 1. Registro esparso: "quais campos vieram" + valores
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostType {
    Create,
    Update,
    Delete,
}

/// Conjunto de campos presentes num registro (um bit por campo).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMask(u32);

impl FieldMask {
    pub fn insert(&mut self, field: impl SyncField) {
        self.0 |= field.bit();
    }

    pub fn contains(&self, field: impl SyncField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Campo de uma entidade sincronizável.
pub trait SyncField: Copy {
    fn bit(self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryField {
    ParentId,
    Name,
    ClientUuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    CategoryId,
    ClientUuid,
    Name,
    ItemCode,
    UnitOfMeasurement,
    HasDerivedUnit,
    DerivedName,
    DerivedFactor,
    StatusFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchField {
    ClientUuid,
    Name,
    Location,
    StatusFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchItemField {
    Quantity,
    ItemLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberField {
    PermissionType,
    BranchesAllowed,
    StoresAllowed,
}

impl SyncField for CategoryField {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl SyncField for ItemField {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl SyncField for BranchField {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl SyncField for BranchItemField {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl SyncField for MemberField {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Um registro do upload: operação, campos enviados e valores.
/// Campos ausentes num create ficam com o default do tipo.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord<T> {
    pub op: PostType,
    pub fields: FieldMask,
    pub values: T,
}

/// Corpo de um tipo de entidade já interpretado.
#[derive(Debug, Clone, PartialEq)]
pub struct KindUpload<T, K> {
    pub create: Vec<SyncRecord<T>>,
    pub update: Vec<SyncRecord<T>>,
    pub delete: Vec<K>,
}

impl<T, K> Default for KindUpload<T, K> {
    fn default() -> Self {
        Self { create: vec![], update: vec![], delete: vec![] }
    }
}

impl<T, K> KindUpload<T, K> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Últimas revisões conhecidas pelo cliente (ausente = 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCursors {
    pub item_rev: i64,
    pub branch_rev: i64,
    pub branch_item_rev: i64,
    pub member_rev: i64,
    pub category_rev: i64,
    pub branch_category_rev: i64,
}

/// Saída do parser: cursores + um corpo por tipo listado em `types[]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUpload {
    pub cursors: SyncCursors,
    pub categories: Option<KindUpload<Category, i64>>,
    pub items: Option<KindUpload<Item, i64>>,
    pub branches: Option<KindUpload<Branch, i64>>,
    pub branch_items: Option<KindUpload<BranchItem, CompositeId>>,
    pub branch_categories: Option<KindUpload<BranchCategory, CompositeId>>,
    pub members: Option<KindUpload<Member, i64>>,
}

// ---
// 2. Respostas
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdatedId {
    pub old_id: i64,
    pub new_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    Removed,
}

/// Entrada de resposta: a entidade viva ou um tombstone com só as chaves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncEntry<T, K> {
    Live(T),
    Removed {
        #[serde(flatten)]
        key: K,
        state: SyncState,
    },
}

impl<T, K> SyncEntry<T, K> {
    pub fn removed(key: K) -> Self {
        SyncEntry::Removed { key, state: SyncState::Removed }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, SyncEntry::Removed { .. })
    }

    pub fn live(&self) -> Option<&T> {
        match self {
            SyncEntry::Live(entity) => Some(entity),
            SyncEntry::Removed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryKey {
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemKey {
    pub item_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchKey {
    pub branch_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchItemKey {
    pub branch_item_id: String,
    pub branch_id: i64,
    pub item_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchCategoryKey {
    pub branch_category_id: String,
    pub branch_id: i64,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberKey {
    pub user_id: i64,
}

/// Branch-item como vai no protocolo: com o id composto "<branch>:<item>".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchItemView {
    pub branch_item_id: String,
    #[serde(flatten)]
    pub row: BranchItem,
}

impl From<BranchItem> for BranchItemView {
    fn from(row: BranchItem) -> Self {
        Self {
            branch_item_id: CompositeId(row.branch_id, row.item_id).to_string(),
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchCategoryView {
    pub branch_category_id: String,
    #[serde(flatten)]
    pub row: BranchCategory,
}

impl From<BranchCategory> for BranchCategoryView {
    fn from(row: BranchCategory) -> Self {
        Self {
            branch_category_id: CompositeId(row.branch_id, row.category_id).to_string(),
            row,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SyncEntityResponse {
    pub new_item_rev: i64,
    pub new_branch_rev: i64,
    pub new_branch_item_rev: i64,
    pub new_member_rev: i64,
    pub new_category_rev: i64,
    pub new_branch_category_rev: i64,

    pub updated_category_ids: Vec<UpdatedId>,
    pub updated_item_ids: Vec<UpdatedId>,
    pub updated_branch_ids: Vec<UpdatedId>,

    #[schema(value_type = Vec<Object>)]
    pub categories: Vec<SyncEntry<Category, CategoryKey>>,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<SyncEntry<Item, ItemKey>>,
    #[schema(value_type = Vec<Object>)]
    pub branches: Vec<SyncEntry<Branch, BranchKey>>,
    #[schema(value_type = Vec<Object>)]
    pub branch_items: Vec<SyncEntry<BranchItemView, BranchItemKey>>,
    #[schema(value_type = Vec<Object>)]
    pub branch_categories: Vec<SyncEntry<BranchCategoryView, BranchCategoryKey>>,
    #[schema(value_type = Vec<Object>)]
    pub employees: Vec<SyncEntry<Member, MemberKey>>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SyncTransactionRequest {
    #[serde(default)]
    #[validate(range(min = 0, message = "Cursor negativo."))]
    pub old_trans_rev: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Cursor negativo."))]
    pub old_branch_item_rev: i64,
    #[serde(default)]
    #[validate(nested)]
    pub transactions: Vec<PostedTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SyncTransactionResponse {
    pub updated_transaction_ids: Vec<UpdatedId>,
    pub new_trans_rev: i64,
    pub new_branch_item_rev: i64,
    pub transactions: Vec<Transaction>,
    #[schema(value_type = Vec<Object>)]
    pub branch_items: Vec<SyncEntry<BranchItemView, BranchItemKey>>,
}

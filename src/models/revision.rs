// src/models/revision.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// Os tipos de entidade que recebem revisões.
// TRANSACTION é um fluxo próprio, usado só pelo SyncTransaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "entity_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Item,
    Branch,
    BranchItem,
    Member,
    Category,
    BranchCategory,
    Transaction,
}

impl EntityKind {
    /// Nome no protocolo (o mesmo usado em `types[]`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Item => "ITEM",
            EntityKind::Branch => "BRANCH",
            EntityKind::BranchItem => "BRANCH_ITEM",
            EntityKind::Member => "MEMBER",
            EntityKind::Category => "CATEGORY",
            EntityKind::BranchCategory => "BRANCH_CATEGORY",
            EntityKind::Transaction => "TRANSACTION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ITEM" => Some(EntityKind::Item),
            "BRANCH" => Some(EntityKind::Branch),
            "BRANCH_ITEM" => Some(EntityKind::BranchItem),
            "MEMBER" => Some(EntityKind::Member),
            "CATEGORY" => Some(EntityKind::Category),
            "BRANCH_CATEGORY" => Some(EntityKind::BranchCategory),
            "TRANSACTION" => Some(EntityKind::Transaction),
            _ => None,
        }
    }

    /// Chave do corpo do upload (`"branch_item": {...}`).
    pub fn body_key(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Branch => "branch",
            EntityKind::BranchItem => "branch_item",
            EntityKind::Member => "member",
            EntityKind::Category => "category",
            EntityKind::BranchCategory => "branch_category",
            EntityKind::Transaction => "transaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "revision_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionAction {
    Create,
    Update,
    Delete,
}

// --- Livro-razão de revisões (append-only) ---
// `additional_info` carrega a segunda metade das chaves compostas
// (item_id do branch-item, category_id do branch-category); 0 nos demais.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EntityRevision {
    pub company_id: i64,
    pub entity_kind: EntityKind,
    pub revision_number: i64,
    pub action: RevisionAction,
    pub affected_id: i64,
    pub additional_info: i64,
}

impl EntityRevision {
    /// Revisão ainda sem número; o `RevisionLog` atribui o próximo da sequência.
    pub fn pending(
        company_id: i64,
        entity_kind: EntityKind,
        action: RevisionAction,
        affected_id: i64,
        additional_info: i64,
    ) -> Self {
        Self {
            company_id,
            entity_kind,
            revision_number: 0,
            action,
            affected_id,
            additional_info,
        }
    }
}

// src/db/store.rs
//
// Fachada de persistência do núcleo de sincronização.
// Uma única interface com um único handle de transação: o Postgres em produção
// e o `MemoryStore` nos testes implementam o mesmo contrato.
//
// "Não encontrado" é um valor (`Ok(None)` / `Ok(false)`), não um erro fatal.
// Todo método roda dentro da transação aberta; descartar o handle sem
// `commit` desfaz tudo (rollback).

use async_trait::async_trait;

use crate::{
    common::error::AppError,
    models::{
        auth::{NewUser, User},
        inventory::{Branch, BranchCategory, BranchItem, Category, Item},
        operations::Transaction,
        revision::{EntityKind, EntityRevision},
        tenancy::{Company, Permission},
    },
};

#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    /// Abre a transação de escrita de uma chamada de sync.
    async fn begin(&self) -> Result<Self::Tx, AppError>;

    /// Abre uma transação só de leitura com snapshot estável.
    async fn begin_read(&self) -> Result<Self::Tx, AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self) -> Result<(), AppError>;

    // --- Usuários ---
    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, AppError>;
    async fn get_user_by_external_id(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, AppError>;
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError>;
    async fn update_username(&mut self, user_id: i64, username: &str) -> Result<bool, AppError>;

    // --- Empresas e permissões ---
    async fn insert_company(&mut self, name: &str, encoded_payment: &str) -> Result<Company, AppError>;
    async fn get_company(&mut self, company_id: i64) -> Result<Option<Company>, AppError>;
    async fn get_permission(&mut self, company_id: i64, user_id: i64) -> Result<Option<Permission>, AppError>;
    /// `false` se o usuário já tem permissão nesta empresa.
    async fn insert_permission(&mut self, permission: &Permission) -> Result<bool, AppError>;
    async fn update_permission(&mut self, permission: &Permission) -> Result<bool, AppError>;
    async fn delete_permission(&mut self, company_id: i64, user_id: i64) -> Result<bool, AppError>;
    async fn list_user_permissions(&mut self, user_id: i64) -> Result<Vec<Permission>, AppError>;

    // --- Categorias ---
    async fn get_category(&mut self, company_id: i64, category_id: i64) -> Result<Option<Category>, AppError>;
    async fn get_category_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Category>, AppError>;
    /// `None` quando o client_uuid já existe (sinal de idempotência).
    async fn insert_category(&mut self, category: &Category) -> Result<Option<Category>, AppError>;
    async fn update_category(&mut self, category: &Category) -> Result<bool, AppError>;
    /// Remove só se nada referencia a categoria (filhas, itens não removidos, filiais).
    async fn delete_category(&mut self, company_id: i64, category_id: i64) -> Result<bool, AppError>;

    // --- Itens ---
    async fn get_item(&mut self, company_id: i64, item_id: i64) -> Result<Option<Item>, AppError>;
    async fn get_item_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Item>, AppError>;
    async fn insert_item(&mut self, item: &Item) -> Result<Option<Item>, AppError>;
    async fn update_item(&mut self, item: &Item) -> Result<bool, AppError>;
    /// Marca o tombstone em `status_flag`; `false` se já estava removido.
    async fn mark_item_removed(&mut self, company_id: i64, item_id: i64) -> Result<bool, AppError>;

    // --- Filiais ---
    async fn get_branch(&mut self, company_id: i64, branch_id: i64) -> Result<Option<Branch>, AppError>;
    async fn get_branch_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Branch>, AppError>;
    async fn insert_branch(&mut self, branch: &Branch) -> Result<Option<Branch>, AppError>;
    async fn update_branch(&mut self, branch: &Branch) -> Result<bool, AppError>;
    async fn mark_branch_removed(&mut self, company_id: i64, branch_id: i64) -> Result<bool, AppError>;

    // --- Saldos (branch-items) ---
    async fn get_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError>;
    /// Igual a `get_branch_item`, mas trava a linha até o fim da transação.
    async fn lock_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError>;
    /// Primeira escrita da chave composta. Se outra transação inseriu antes,
    /// a quantidade enviada é somada à existente.
    async fn insert_branch_item(&mut self, branch_item: &BranchItem) -> Result<BranchItem, AppError>;
    async fn update_branch_item(&mut self, branch_item: &BranchItem) -> Result<bool, AppError>;
    async fn delete_branch_item(&mut self, company_id: i64, branch_id: i64, item_id: i64) -> Result<bool, AppError>;

    // --- Filial-categoria ---
    async fn get_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<Option<BranchCategory>, AppError>;
    /// `false` se a relação já existia.
    async fn insert_branch_category(&mut self, branch_category: &BranchCategory) -> Result<bool, AppError>;
    async fn delete_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<bool, AppError>;

    // --- Transações ---
    async fn get_transaction(&mut self, company_id: i64, transaction_id: i64) -> Result<Option<Transaction>, AppError>;
    async fn get_transaction_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Transaction>, AppError>;
    /// Grava a transação e suas linhas; o id é atribuído pelo store.
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Option<Transaction>, AppError>;

    // --- Revisões ---
    /// Reserva o próximo número da sequência (company, kind). A reserva
    /// serializa outros escritores do mesmo par até o commit.
    async fn next_revision_number(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError>;
    /// Trava o contador do par sem avançá-lo.
    async fn lock_revision_counter(&mut self, company_id: i64, kind: EntityKind) -> Result<(), AppError>;
    async fn insert_revision(&mut self, revision: &EntityRevision) -> Result<(), AppError>;
    async fn max_revision(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError>;
    async fn revisions_after(
        &mut self,
        company_id: i64,
        kind: EntityKind,
        cursor: i64,
    ) -> Result<Vec<EntityRevision>, AppError>;
}

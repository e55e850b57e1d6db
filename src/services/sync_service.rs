// src/services/sync_service.rs
//
// Orquestra SyncEntity e SyncTransaction:
// 1. uma transação de escrita (parser → applier → revisões → commit);
// 2. uma transação só de leitura para o "o que mudou desde" cada cursor.

use serde_json::Value;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{Store, StoreTx},
    models::{
        sync::{SyncEntityResponse, SyncTransactionRequest, SyncTransactionResponse},
        tenancy::PermissionType,
    },
    services::{
        auth::Authority,
        entity_applier::{operation_counts, EntityApplier, IdRemap},
        fetch_since::{
            fetch_since, BranchCategorySince, BranchItemSince, BranchView, CategoryView, ItemView, MemberView,
            TransactionView,
        },
        sync_parser::parse_upload,
        transaction_applier::{TransactionApplier, TransactionOutcome},
    },
};

#[derive(Clone)]
pub struct SyncService<S: Store> {
    store: S,
}

impl<S: Store> SyncService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn sync_entities(&self, authority: &Authority, document: &Value) -> Result<SyncEntityResponse, AppError> {
        let upload = parse_upload(document)?;
        let company_id = authority.company_id;
        let (creates, updates, deletes) = operation_counts(&upload);

        // --- 1. Escrita (tudo ou nada) ---
        let remap = if creates + updates + deletes > 0 {
            let mut tx = self.store.begin().await?;
            let remap = EntityApplier::new(&mut tx, company_id, &authority.permission)
                .apply(&upload)
                .await?;
            tx.commit().await?;
            remap
        } else {
            IdRemap::default()
        };

        // --- 2. O que mudou desde os cursores do cliente ---
        let cursors = upload.cursors;
        let mut tx = self.store.begin_read().await?;
        let (new_category_rev, categories) = fetch_since::<CategoryView, _>(&mut tx, company_id, cursors.category_rev).await?;
        let (new_item_rev, items) = fetch_since::<ItemView, _>(&mut tx, company_id, cursors.item_rev).await?;
        let (new_branch_rev, branches) = fetch_since::<BranchView, _>(&mut tx, company_id, cursors.branch_rev).await?;
        let (new_branch_item_rev, branch_items) =
            fetch_since::<BranchItemSince, _>(&mut tx, company_id, cursors.branch_item_rev).await?;
        let (new_branch_category_rev, branch_categories) =
            fetch_since::<BranchCategorySince, _>(&mut tx, company_id, cursors.branch_category_rev).await?;

        // Abaixo de BRANCH_MANAGER o cursor de membros volta intacto
        let (new_member_rev, employees) = if authority.permission_type().at_least(PermissionType::BranchManager) {
            fetch_since::<MemberView, _>(&mut tx, company_id, cursors.member_rev).await?
        } else {
            (cursors.member_rev, Vec::new())
        };
        tx.commit().await?;

        tracing::info!(
            "🔄 SyncEntity empresa {} usuário {}: {} criações, {} atualizações, {} remoções | cursores item {} filial {} saldo {} membro {} categoria {} filial-categoria {}",
            company_id,
            authority.user.user_id,
            creates,
            updates,
            deletes,
            new_item_rev,
            new_branch_rev,
            new_branch_item_rev,
            new_member_rev,
            new_category_rev,
            new_branch_category_rev
        );

        Ok(SyncEntityResponse {
            new_item_rev,
            new_branch_rev,
            new_branch_item_rev,
            new_member_rev,
            new_category_rev,
            new_branch_category_rev,
            updated_category_ids: IdRemap::updated_ids(&remap.categories),
            updated_item_ids: IdRemap::updated_ids(&remap.items),
            updated_branch_ids: IdRemap::updated_ids(&remap.branches),
            categories,
            items,
            branches,
            branch_items,
            branch_categories,
            employees,
        })
    }

    pub async fn sync_transactions(
        &self,
        authority: &Authority,
        request: &SyncTransactionRequest,
    ) -> Result<SyncTransactionResponse, AppError> {
        request.validate()?;
        let company_id = authority.company_id;

        let outcome = if request.transactions.is_empty() {
            TransactionOutcome::default()
        } else {
            let mut tx = self.store.begin().await?;
            let outcome = TransactionApplier::new(&mut tx, company_id, &authority.permission)
                .apply(&request.transactions)
                .await?;
            tx.commit().await?;
            outcome
        };

        let mut tx = self.store.begin_read().await?;
        let (new_trans_rev, transactions) = if authority.permission_type().at_least(PermissionType::Manager) {
            fetch_since::<TransactionView, _>(&mut tx, company_id, request.old_trans_rev).await?
        } else {
            (request.old_trans_rev, Vec::new())
        };
        let (new_branch_item_rev, branch_items) =
            fetch_since::<BranchItemSince, _>(&mut tx, company_id, request.old_branch_item_rev).await?;
        tx.commit().await?;

        tracing::info!(
            "🧾 SyncTransaction empresa {} usuário {}: {} enviadas, {} gravadas, {} saldos | cursores transação {} saldo {}",
            company_id,
            authority.user.user_id,
            request.transactions.len(),
            outcome.inserted,
            outcome.branch_items_written,
            new_trans_rev,
            new_branch_item_rev
        );

        Ok(SyncTransactionResponse {
            updated_transaction_ids: outcome.updated_ids,
            new_trans_rev,
            new_branch_item_rev,
            transactions,
            branch_items,
        })
    }
}

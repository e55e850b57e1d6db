// src/services/fetch_since.rs
//
// Materializa, por tipo de entidade, o "o que mudou desde a revisão R".
// CREATE/UPDATE leem a linha atual (sumiu = pula); DELETE vira tombstone.

use async_trait::async_trait;

use crate::{
    common::error::AppError,
    db::StoreTx,
    models::{
        inventory::{category_id_to_client, Branch, Category, CompositeId, Item},
        operations::Transaction,
        revision::{EntityKind, EntityRevision, RevisionAction},
        sync::{
            BranchCategoryKey, BranchCategoryView, BranchItemKey, BranchItemView, BranchKey, CategoryKey, ItemKey,
            MemberKey, SyncEntry,
        },
        tenancy::Member,
    },
    services::revision_log,
};

/// Como um tipo de entidade aparece na resposta.
#[async_trait]
pub trait SinceView {
    const KIND: EntityKind;
    type Entry: Send;

    /// Estado atual da entidade apontada pela revisão.
    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError>;

    /// Entrada com só as chaves e o estado REMOVED. `None` para tipos que não são apagados.
    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry>;
}

/// `(novo cursor, entradas)` de um tipo.
pub async fn fetch_since<V: SinceView, T: StoreTx>(
    tx: &mut T,
    company_id: i64,
    cursor: i64,
) -> Result<(i64, Vec<V::Entry>), AppError> {
    let (max, revisions) = revision_log::since(tx, company_id, V::KIND, cursor).await?;

    let mut entries = Vec::with_capacity(revisions.len());
    for revision in &revisions {
        let entry = match revision.action {
            RevisionAction::Delete => V::tombstone(revision),
            RevisionAction::Create | RevisionAction::Update => V::live(tx, company_id, revision).await?,
        };
        entries.extend(entry);
    }

    tracing::debug!(
        "Desde {} em {}: {} revisões, {} entradas, novo cursor {}",
        cursor,
        V::KIND.as_str(),
        revisions.len(),
        entries.len(),
        max
    );
    Ok((max, entries))
}

// ---
// Um view por tipo
// ---

pub struct CategoryView;
pub struct ItemView;
pub struct BranchView;
pub struct BranchItemSince;
pub struct BranchCategorySince;
pub struct MemberView;
pub struct TransactionView;

fn category_for_client(mut category: Category) -> Category {
    category.parent_id = category_id_to_client(category.parent_id);
    category
}

fn item_for_client(mut item: Item) -> Item {
    item.category_id = category_id_to_client(item.category_id);
    item
}

#[async_trait]
impl SinceView for CategoryView {
    const KIND: EntityKind = EntityKind::Category;
    type Entry = SyncEntry<Category, CategoryKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let category = tx.get_category(company_id, revision.affected_id).await?;
        Ok(category.map(|c| SyncEntry::Live(category_for_client(c))))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        Some(SyncEntry::removed(CategoryKey { category_id: revision.affected_id }))
    }
}

#[async_trait]
impl SinceView for ItemView {
    const KIND: EntityKind = EntityKind::Item;
    type Entry = SyncEntry<Item, ItemKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let item = tx.get_item(company_id, revision.affected_id).await?;
        Ok(item.map(|i| SyncEntry::Live(item_for_client(i))))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        Some(SyncEntry::removed(ItemKey { item_id: revision.affected_id }))
    }
}

#[async_trait]
impl SinceView for BranchView {
    const KIND: EntityKind = EntityKind::Branch;
    type Entry = SyncEntry<Branch, BranchKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let branch = tx.get_branch(company_id, revision.affected_id).await?;
        Ok(branch.map(SyncEntry::Live))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        Some(SyncEntry::removed(BranchKey { branch_id: revision.affected_id }))
    }
}

#[async_trait]
impl SinceView for BranchItemSince {
    const KIND: EntityKind = EntityKind::BranchItem;
    type Entry = SyncEntry<BranchItemView, BranchItemKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let row = tx
            .get_branch_item(company_id, revision.affected_id, revision.additional_info)
            .await?;
        Ok(row.map(|r| SyncEntry::Live(BranchItemView::from(r))))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        let (branch_id, item_id) = (revision.affected_id, revision.additional_info);
        Some(SyncEntry::removed(BranchItemKey {
            branch_item_id: CompositeId(branch_id, item_id).to_string(),
            branch_id,
            item_id,
        }))
    }
}

#[async_trait]
impl SinceView for BranchCategorySince {
    const KIND: EntityKind = EntityKind::BranchCategory;
    type Entry = SyncEntry<BranchCategoryView, BranchCategoryKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let row = tx
            .get_branch_category(company_id, revision.affected_id, revision.additional_info)
            .await?;
        Ok(row.map(|mut r| {
            r.category_id = category_id_to_client(r.category_id);
            SyncEntry::Live(BranchCategoryView::from(r))
        }))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        let branch_id = revision.affected_id;
        let category_id = category_id_to_client(revision.additional_info);
        Some(SyncEntry::removed(BranchCategoryKey {
            branch_category_id: CompositeId(branch_id, category_id).to_string(),
            branch_id,
            category_id,
        }))
    }
}

#[async_trait]
impl SinceView for MemberView {
    const KIND: EntityKind = EntityKind::Member;
    type Entry = SyncEntry<Member, MemberKey>;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        let Some(permission) = tx.get_permission(company_id, revision.affected_id).await? else {
            return Ok(None);
        };
        let Some(user) = tx.get_user(permission.user_id).await? else {
            tracing::warn!(
                "⚠️ Permissão da empresa {} aponta para o usuário {} inexistente; membro omitido",
                company_id,
                permission.user_id
            );
            return Ok(None);
        };
        Ok(Some(SyncEntry::Live(Member::new(permission, user.username))))
    }

    fn tombstone(revision: &EntityRevision) -> Option<Self::Entry> {
        Some(SyncEntry::removed(MemberKey { user_id: revision.affected_id }))
    }
}

#[async_trait]
impl SinceView for TransactionView {
    const KIND: EntityKind = EntityKind::Transaction;
    type Entry = Transaction;

    async fn live<T: StoreTx>(tx: &mut T, company_id: i64, revision: &EntityRevision) -> Result<Option<Self::Entry>, AppError> {
        tx.get_transaction(company_id, revision.affected_id).await
    }

    // Transações não são apagadas
    fn tombstone(_revision: &EntityRevision) -> Option<Self::Entry> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Store};
    use crate::models::inventory::{CLIENT_ROOT_CATEGORY_ID, ROOT_CATEGORY_ID};
    use crate::models::tenancy::Permission;
    use crate::services::test_support::{seed_branch, seed_company, seed_item, seed_quantity};

    #[tokio::test]
    async fn items_come_back_with_client_root_and_latest_state_only() {
        let store = MemoryStore::new();
        let (company_id, _owner) = seed_company(&store).await;
        let item_id = seed_item(&store, company_id, "i1").await;

        let mut tx = store.begin().await.unwrap();
        let mut item = tx.get_item(company_id, item_id).await.unwrap().unwrap();
        assert_eq!(item.category_id, ROOT_CATEGORY_ID);
        item.name = "Renomeado".into();
        tx.update_item(&item).await.unwrap();
        revision_log::record(&mut tx, company_id, EntityKind::Item, RevisionAction::Update, item_id, 0).await.unwrap();

        let (max, entries) = fetch_since::<ItemView, _>(&mut tx, company_id, 0).await.unwrap();
        assert_eq!(max, 2);
        assert_eq!(entries.len(), 1);
        let live = entries[0].live().unwrap();
        assert_eq!(live.name, "Renomeado");
        assert_eq!(live.category_id, CLIENT_ROOT_CATEGORY_ID);
    }

    #[tokio::test]
    async fn deleted_branch_items_become_tombstones() {
        let store = MemoryStore::new();
        let (company_id, _owner) = seed_company(&store).await;
        let branch_id = seed_branch(&store, company_id, "b1").await;
        let item_id = seed_item(&store, company_id, "i1").await;
        seed_quantity(&store, company_id, branch_id, item_id, 4).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_branch_item(company_id, branch_id, item_id).await.unwrap());
        revision_log::record(&mut tx, company_id, EntityKind::BranchItem, RevisionAction::Delete, branch_id, item_id)
            .await
            .unwrap();

        let (max, entries) = fetch_since::<BranchItemSince, _>(&mut tx, company_id, 0).await.unwrap();
        assert_eq!(max, 2);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_removed());

        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["branch_item_id"], format!("{}:{}", branch_id, item_id));
        assert_eq!(json["state"], "REMOVED");
    }

    #[tokio::test]
    async fn rows_missing_at_read_time_are_skipped() {
        let store = MemoryStore::new();
        let (company_id, _owner) = seed_company(&store).await;

        let mut tx = store.begin().await.unwrap();
        revision_log::record(&mut tx, company_id, EntityKind::Category, RevisionAction::Create, 77, 0).await.unwrap();

        let (max, entries) = fetch_since::<CategoryView, _>(&mut tx, company_id, 0).await.unwrap();
        assert_eq!(max, 1);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn members_carry_username_and_permission() {
        let store = MemoryStore::new();
        let (company_id, owner) = seed_company(&store).await;

        let mut tx = store.begin().await.unwrap();
        let (max, entries) = fetch_since::<MemberView, _>(&mut tx, company_id, 0).await.unwrap();
        assert_eq!(max, 1);
        let member = entries[0].live().unwrap();
        assert_eq!(member.user_id, owner.user_id);
        assert!(member.username.starts_with("dono-"));
        assert_eq!(member.encoded_permission, owner.encoded_permission);
    }

    #[tokio::test]
    async fn members_without_user_row_are_left_out() {
        let store = MemoryStore::new();
        let (company_id, owner) = seed_company(&store).await;

        let mut tx = store.begin().await.unwrap();
        let orphan = Permission { user_id: 9_999, ..owner.clone() };
        assert!(tx.insert_permission(&orphan).await.unwrap());
        revision_log::record(&mut tx, company_id, EntityKind::Member, RevisionAction::Create, orphan.user_id, 0)
            .await
            .unwrap();

        let (max, entries) = fetch_since::<MemberView, _>(&mut tx, company_id, 0).await.unwrap();
        assert_eq!(max, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].live().unwrap().user_id, owner.user_id);
    }
}

// Fixtures compartilhadas pelos testes dos serviços.

use rust_decimal::Decimal;

use crate::{
    db::{MemoryStore, Store, StoreTx},
    models::{
        auth::NewUser,
        inventory::{Branch, BranchItem, Item},
        revision::{EntityKind, RevisionAction},
        tenancy::{Permission, PermissionGrant, PermissionType},
    },
    services::{auth::Authority, revision_log},
};

pub async fn seed_user(store: &MemoryStore, name: &str) -> i64 {
    let mut tx = store.begin().await.unwrap();
    let user = tx
        .insert_user(&NewUser {
            username: name.to_string(),
            external_provider: "test".to_string(),
            external_provider_user_id: format!("ext-{name}"),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user.user_id
}

async fn grant(store: &MemoryStore, company_id: i64, user_id: i64, grant: PermissionGrant) -> Permission {
    let permission = Permission::from_grant(company_id, user_id, &grant).unwrap();
    let mut tx = store.begin().await.unwrap();
    assert!(tx.insert_permission(&permission).await.unwrap());
    revision_log::record(&mut tx, company_id, EntityKind::Member, RevisionAction::Create, user_id, 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    permission
}

/// Empresa nova com um dono; devolve `(company_id, permissão do dono)`.
pub async fn seed_company(store: &MemoryStore) -> (i64, Permission) {
    let owner_id = seed_user(store, &format!("dono-{}", uuid::Uuid::new_v4())).await;
    let mut tx = store.begin().await.unwrap();
    let company = tx.insert_company("Loja Teste", "").await.unwrap();
    tx.commit().await.unwrap();
    let owner = grant(store, company.company_id, owner_id, PermissionGrant::owner()).await;
    (company.company_id, owner)
}

pub async fn seed_member(store: &MemoryStore, company_id: i64, name: &str, permission_type: PermissionType) -> Permission {
    seed_scoped_member(store, company_id, name, permission_type, vec![]).await
}

pub async fn seed_scoped_member(
    store: &MemoryStore,
    company_id: i64,
    name: &str,
    permission_type: PermissionType,
    branches_allowed: Vec<i64>,
) -> Permission {
    let user_id = seed_user(store, name).await;
    let scoped = PermissionGrant { permission_type, branches_allowed, stores_allowed: vec![] };
    grant(store, company_id, user_id, scoped).await
}

pub async fn seed_branch(store: &MemoryStore, company_id: i64, client_uuid: &str) -> i64 {
    let mut tx = store.begin().await.unwrap();
    let branch = tx
        .insert_branch(&Branch {
            company_id,
            client_uuid: client_uuid.to_string(),
            name: client_uuid.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .unwrap();
    revision_log::record(&mut tx, company_id, EntityKind::Branch, RevisionAction::Create, branch.branch_id, 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    branch.branch_id
}

pub async fn seed_item(store: &MemoryStore, company_id: i64, client_uuid: &str) -> i64 {
    let mut tx = store.begin().await.unwrap();
    let item = tx
        .insert_item(&Item {
            company_id,
            category_id: crate::models::inventory::ROOT_CATEGORY_ID,
            client_uuid: client_uuid.to_string(),
            name: client_uuid.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .unwrap();
    revision_log::record(&mut tx, company_id, EntityKind::Item, RevisionAction::Create, item.item_id, 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    item.item_id
}

/// Grava o saldo inicial de (filial, item) sem passar por transações.
pub async fn seed_quantity(store: &MemoryStore, company_id: i64, branch_id: i64, item_id: i64, quantity: i64) {
    let mut tx = store.begin().await.unwrap();
    tx.insert_branch_item(&BranchItem {
        company_id,
        branch_id,
        item_id,
        quantity: Decimal::from(quantity),
        item_location: String::new(),
    })
    .await
    .unwrap();
    revision_log::record(&mut tx, company_id, EntityKind::BranchItem, RevisionAction::Create, branch_id, item_id)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

pub async fn quantity_of(store: &MemoryStore, branch_id: i64, item_id: i64) -> Option<Decimal> {
    store.snapshot().await.branch_items.get(&(branch_id, item_id)).map(|bi| bi.quantity)
}

/// Autoridade já resolvida para a permissão dada (sem passar pelo cookie).
pub async fn authority_for(store: &MemoryStore, permission: &Permission) -> Authority {
    let user = store.snapshot().await.users[&permission.user_id].clone();
    Authority { user, company_id: permission.company_id, permission: permission.clone() }
}

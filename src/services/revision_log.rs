// src/services/revision_log.rs
//
// Livro de revisões append-only por (empresa, tipo de entidade).

use std::collections::{BTreeSet, HashMap};

use crate::{
    common::error::AppError,
    db::StoreTx,
    models::revision::{EntityKind, EntityRevision, RevisionAction},
};

/// Grava a revisão com o próximo número da sequência do par (empresa, tipo).
/// Precisa rodar na transação de escrita da chamada: a reserva do número só é
/// liberada para o próximo escritor no commit ou no rollback.
pub async fn append<T: StoreTx>(tx: &mut T, mut revision: EntityRevision) -> Result<EntityRevision, AppError> {
    revision.revision_number = tx
        .next_revision_number(revision.company_id, revision.entity_kind)
        .await?;
    tx.insert_revision(&revision).await?;

    tracing::debug!(
        "📝 Revisão {} #{} ({:?}) em {}:{}",
        revision.entity_kind.as_str(),
        revision.revision_number,
        revision.action,
        revision.affected_id,
        revision.additional_info
    );
    Ok(revision)
}

/// Trava de uma vez, sempre na mesma ordem, os contadores que a chamada vai usar.
/// Duas escritas concorrentes esperam uma pela outra em vez de se travarem.
pub async fn lock_counters<T: StoreTx>(
    tx: &mut T,
    company_id: i64,
    kinds: impl IntoIterator<Item = EntityKind>,
) -> Result<(), AppError> {
    for kind in kinds.into_iter().collect::<BTreeSet<_>>() {
        tx.lock_revision_counter(company_id, kind).await?;
    }
    Ok(())
}

/// Atalho para o caso comum de `append`.
pub async fn record<T: StoreTx>(
    tx: &mut T,
    company_id: i64,
    kind: EntityKind,
    action: RevisionAction,
    affected_id: i64,
    additional_info: i64,
) -> Result<EntityRevision, AppError> {
    append(tx, EntityRevision::pending(company_id, kind, action, affected_id, additional_info)).await
}

/// `(max, revisões depois do cursor)`, com uma única revisão (a mais recente)
/// por `(affected_id, additional_info)`. O max é o próximo cursor do cliente.
pub async fn since<T: StoreTx>(
    tx: &mut T,
    company_id: i64,
    kind: EntityKind,
    cursor: i64,
) -> Result<(i64, Vec<EntityRevision>), AppError> {
    let max = tx.max_revision(company_id, kind).await?;
    if cursor >= max {
        return Ok((max, vec![]));
    }
    let revisions = tx.revisions_after(company_id, kind, cursor).await?;
    Ok((max, latest_per_key(revisions)))
}

/// Mantém só a última revisão de cada chave, em ordem crescente de número.
pub fn latest_per_key(revisions: Vec<EntityRevision>) -> Vec<EntityRevision> {
    let mut latest: HashMap<(i64, i64), EntityRevision> = HashMap::new();
    for revision in revisions {
        let key = (revision.affected_id, revision.additional_info);
        match latest.get(&key) {
            Some(current) if current.revision_number >= revision.revision_number => {}
            _ => {
                latest.insert(key, revision);
            }
        }
    }
    let mut collapsed: Vec<EntityRevision> = latest.into_values().collect();
    collapsed.sort_by_key(|r| r.revision_number);
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Store};

    fn rev(number: i64, action: RevisionAction, affected_id: i64, additional_info: i64) -> EntityRevision {
        EntityRevision {
            company_id: 1,
            entity_kind: EntityKind::BranchItem,
            revision_number: number,
            action,
            affected_id,
            additional_info,
        }
    }

    #[test]
    fn collapse_keeps_only_the_latest_revision_per_key() {
        let collapsed = latest_per_key(vec![
            rev(1, RevisionAction::Create, 5, 9),
            rev(2, RevisionAction::Create, 5, 10),
            rev(3, RevisionAction::Update, 5, 9),
            rev(4, RevisionAction::Delete, 5, 10),
        ]);
        assert_eq!(collapsed, vec![rev(3, RevisionAction::Update, 5, 9), rev(4, RevisionAction::Delete, 5, 10)]);
    }

    #[tokio::test]
    async fn append_numbers_are_dense_per_company_and_kind() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        for affected in 1..=3 {
            record(&mut tx, 1, EntityKind::Item, RevisionAction::Create, affected, 0).await.unwrap();
        }
        let other_kind = record(&mut tx, 1, EntityKind::Branch, RevisionAction::Create, 1, 0).await.unwrap();
        let other_company = record(&mut tx, 2, EntityKind::Item, RevisionAction::Create, 1, 0).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(other_kind.revision_number, 1);
        assert_eq!(other_company.revision_number, 1);

        let state = store.snapshot().await;
        let numbers: Vec<i64> = state.revisions_of(1, EntityKind::Item).iter().map(|r| r.revision_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rolled_back_appends_leave_no_gap() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        record(&mut tx, 1, EntityKind::Item, RevisionAction::Create, 1, 0).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        let committed = record(&mut tx, 1, EntityKind::Item, RevisionAction::Create, 2, 0).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(committed.revision_number, 1);
    }

    #[tokio::test]
    async fn since_returns_high_water_mark_and_changes_after_cursor() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        record(&mut tx, 1, EntityKind::Item, RevisionAction::Create, 10, 0).await.unwrap();
        record(&mut tx, 1, EntityKind::Item, RevisionAction::Create, 11, 0).await.unwrap();
        record(&mut tx, 1, EntityKind::Item, RevisionAction::Update, 10, 0).await.unwrap();

        let (max, revisions) = since(&mut tx, 1, EntityKind::Item, 1).await.unwrap();
        assert_eq!(max, 3);
        let affected: Vec<i64> = revisions.iter().map(|r| r.affected_id).collect();
        assert_eq!(affected, vec![11, 10]);

        let (max, revisions) = since(&mut tx, 1, EntityKind::Item, 3).await.unwrap();
        assert_eq!(max, 3);
        assert!(revisions.is_empty());

        let (max, revisions) = since(&mut tx, 1, EntityKind::Branch, 0).await.unwrap();
        assert_eq!(max, 0);
        assert!(revisions.is_empty());
    }
}

// src/services/transaction_applier.rs
//
// Grava as transações do SyncTransaction e dobra em memória todas as
// variações de saldo do lote: no fim, uma única escrita por (filial, item).

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    db::StoreTx,
    models::{
        inventory::BranchItem,
        operations::{PostedTransaction, TransType, Transaction, TransactionItem},
        revision::{EntityKind, RevisionAction},
        sync::UpdatedId,
        tenancy::Permission,
    },
    services::revision_log,
};

// Perna de transferência ainda sem par no lote: (origem, destino, item, quantidade)
type TransferLeg = (i64, i64, i64, Decimal);

// Saldo em cache durante o lote
#[derive(Debug, Clone)]
struct CachedBranchItem {
    row: BranchItem,
    exists_in_store: bool,
    visited: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOutcome {
    /// `transaction_id` local → id do servidor (inclui replays).
    pub updated_ids: Vec<UpdatedId>,
    /// Transações gravadas nesta chamada.
    pub inserted: usize,
    /// Pares (filial, item) escritos no fim do lote.
    pub branch_items_written: usize,
}

pub struct TransactionApplier<'t, T: StoreTx> {
    tx: &'t mut T,
    company_id: i64,
    caller: &'t Permission,
    cache: BTreeMap<(i64, i64), CachedBranchItem>,
    open_legs: BTreeMap<(TransferLeg, TransType), usize>,
}

impl<'t, T: StoreTx> TransactionApplier<'t, T> {
    pub fn new(tx: &'t mut T, company_id: i64, caller: &'t Permission) -> Self {
        Self { tx, company_id, caller, cache: BTreeMap::new(), open_legs: BTreeMap::new() }
    }

    pub async fn apply(mut self, posted: &[PostedTransaction]) -> Result<TransactionOutcome, AppError> {
        let mut outcome = TransactionOutcome::default();
        revision_log::lock_counters(&mut *self.tx, self.company_id, [EntityKind::Transaction, EntityKind::BranchItem]).await?;

        for transaction in posted {
            self.validate(transaction).await?;

            // --- 1. Replay pelo client_uuid ---
            if let Some(existing) = self.tx.get_transaction_by_uuid(self.company_id, &transaction.client_uuid).await? {
                outcome.updated_ids.push(UpdatedId { old_id: transaction.transaction_id, new_id: existing.transaction_id });
                continue;
            }

            // --- 2. Grava a transação e as linhas ---
            let row = Transaction {
                transaction_id: 0,
                company_id: self.company_id,
                user_id: self.caller.user_id,
                branch_id: transaction.branch_id,
                client_uuid: transaction.client_uuid.clone(),
                date: transaction.date,
                note: transaction.note.clone(),
                trans_items: transaction
                    .trans_items
                    .iter()
                    .map(|line| TransactionItem {
                        trans_type: line.trans_type,
                        item_id: line.item_id,
                        other_branch_id: line.other_branch_id.filter(|_| line.trans_type.involves_other_branch()),
                        quantity: line.quantity,
                        note: line.note.clone(),
                    })
                    .collect(),
            };

            let Some(inserted) = self.tx.insert_transaction(&row).await? else {
                // Outra chamada gravou o mesmo uuid entre a leitura e o insert
                let existing = self
                    .tx
                    .get_transaction_by_uuid(self.company_id, &transaction.client_uuid)
                    .await?
                    .ok_or_else(|| AppError::Conflict(format!("Transação '{}'", transaction.client_uuid)))?;
                outcome.updated_ids.push(UpdatedId { old_id: transaction.transaction_id, new_id: existing.transaction_id });
                continue;
            };

            outcome.updated_ids.push(UpdatedId { old_id: transaction.transaction_id, new_id: inserted.transaction_id });
            outcome.inserted += 1;
            revision_log::record(
                &mut *self.tx,
                self.company_id,
                EntityKind::Transaction,
                RevisionAction::Create,
                inserted.transaction_id,
                0,
            )
            .await?;

            // --- 3. Dobra as variações no cache ---
            for line in &inserted.trans_items {
                self.fold_line(inserted.branch_id, line).await?;
            }
        }

        // --- 4. Uma escrita por par visitado ---
        outcome.branch_items_written = self.flush().await?;
        Ok(outcome)
    }

    async fn validate(&mut self, transaction: &PostedTransaction) -> Result<(), AppError> {
        let uuid = &transaction.client_uuid;
        if uuid.is_empty() {
            return Err(AppError::InvalidArgument("Transação sem client_uuid".into()));
        }
        if transaction.branch_id <= 0 {
            return Err(AppError::InvalidArgument(format!("Transação '{}': filial {} não globalizada", uuid, transaction.branch_id)));
        }
        if !self.caller.allows_branch(transaction.branch_id) {
            return Err(AppError::PermissionDenied(format!("Sem acesso à filial {}", transaction.branch_id)));
        }
        self.require_branch(transaction.branch_id).await?;

        for line in &transaction.trans_items {
            if line.item_id <= 0 {
                return Err(AppError::InvalidArgument(format!("Transação '{}': item {} não globalizado", uuid, line.item_id)));
            }
            if self.tx.get_item(self.company_id, line.item_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Item {}", line.item_id)));
            }
            if line.trans_type.involves_other_branch() {
                let other = line.other_branch_id.ok_or_else(|| {
                    AppError::InvalidArgument(format!("Transação '{}': transferência sem other_branch_id", uuid))
                })?;
                if other <= 0 || other == transaction.branch_id {
                    return Err(AppError::InvalidArgument(format!("Transação '{}': outra filial {} inválida", uuid, other)));
                }
                self.require_branch(other).await?;
            }
        }
        Ok(())
    }

    async fn require_branch(&mut self, branch_id: i64) -> Result<(), AppError> {
        match self.tx.get_branch(self.company_id, branch_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Filial {}", branch_id))),
        }
    }

    /// Carrega (e trava) o saldo no primeiro toque; sem linha no store, começa em 0.
    async fn entry(&mut self, branch_id: i64, item_id: i64) -> Result<&mut CachedBranchItem, AppError> {
        let key = (branch_id, item_id);
        if !self.cache.contains_key(&key) {
            let cached = match self.tx.lock_branch_item(self.company_id, branch_id, item_id).await? {
                Some(row) => CachedBranchItem { row, exists_in_store: true, visited: false },
                None => CachedBranchItem {
                    row: BranchItem {
                        company_id: self.company_id,
                        branch_id,
                        item_id,
                        quantity: Decimal::ZERO,
                        item_location: String::new(),
                    },
                    exists_in_store: false,
                    visited: false,
                },
            };
            self.cache.insert(key, cached);
        }
        self.cache
            .get_mut(&key)
            .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("saldo {:?} sumiu do cache", key)))
    }

    async fn fold_line(&mut self, branch_id: i64, line: &TransactionItem) -> Result<(), AppError> {
        let trans_type = line.trans_type;
        if let Some(other_branch) = line.other_branch_id {
            if self.pairs_open_leg(branch_id, other_branch, line) {
                tracing::debug!("Transferência {}↔{} do item {} já dobrada pela outra perna", branch_id, other_branch, line.item_id);
                return Ok(());
            }
        }

        if !trans_type.is_pass_through() {
            self.add_quantity(branch_id, line.item_id, trans_type.branch_delta(line.quantity)).await?;
        }
        if let (Some(other_branch), Some(delta)) = (line.other_branch_id, trans_type.other_branch_delta(line.quantity)) {
            self.add_quantity(other_branch, line.item_id, delta).await?;
        }
        Ok(())
    }

    /// As duas pernas de uma transferência no mesmo lote movem o estoque uma vez só.
    /// Fecha a perna oposta em aberto, ou registra esta como aberta.
    fn pairs_open_leg(&mut self, branch_id: i64, other_branch: i64, line: &TransactionItem) -> bool {
        let (leg, counterpart) = match line.trans_type {
            TransType::SubTransferToOther => ((branch_id, other_branch, line.item_id, line.quantity), TransType::AddTransferFromOther),
            TransType::AddTransferFromOther => ((other_branch, branch_id, line.item_id, line.quantity), TransType::SubTransferToOther),
            _ => return false,
        };

        if let Some(open) = self.open_legs.get_mut(&(leg, counterpart)).filter(|open| **open > 0) {
            *open -= 1;
            return true;
        }
        *self.open_legs.entry((leg, line.trans_type)).or_default() += 1;
        false
    }

    async fn add_quantity(&mut self, branch_id: i64, item_id: i64, delta: Decimal) -> Result<(), AppError> {
        let entry = self.entry(branch_id, item_id).await?;
        entry.row.quantity = entry.row.quantity.checked_add(delta).ok_or_else(|| {
            AppError::InvalidArgument(format!("Saldo da filial {} item {} fora do intervalo", branch_id, item_id))
        })?;
        entry.visited = true;
        Ok(())
    }

    async fn flush(&mut self) -> Result<usize, AppError> {
        let visited: Vec<CachedBranchItem> = self.cache.values().filter(|c| c.visited).cloned().collect();

        for cached in &visited {
            let row = &cached.row;
            let action = if cached.exists_in_store {
                self.tx.update_branch_item(row).await?;
                RevisionAction::Update
            } else {
                self.tx.insert_branch_item(row).await?;
                RevisionAction::Create
            };
            revision_log::record(&mut *self.tx, self.company_id, EntityKind::BranchItem, action, row.branch_id, row.item_id)
                .await?;
            tracing::debug!("Saldo {}:{} = {}", row.branch_id, row.item_id, row.quantity);
        }
        Ok(visited.len())
    }
}

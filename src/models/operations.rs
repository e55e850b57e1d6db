// src/models/operations.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

// --- Tipos de movimentação (conjunto fechado) ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "trans_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransType {
    AddPurchased,
    SubCurrentBranchSale,
    SubSaleFromPurchaseDirect,
    AddTransferFromOther,
    SubTransferToOther,
}

impl TransType {
    /// Efeito sobre a filial da transação.
    pub fn branch_delta(&self, quantity: Decimal) -> Decimal {
        match self {
            TransType::AddPurchased => quantity,
            TransType::SubCurrentBranchSale => -quantity,
            TransType::SubSaleFromPurchaseDirect => Decimal::ZERO,
            TransType::AddTransferFromOther => quantity,
            TransType::SubTransferToOther => -quantity,
        }
    }

    /// Efeito sobre a outra filial (só nas transferências).
    pub fn other_branch_delta(&self, quantity: Decimal) -> Option<Decimal> {
        match self {
            TransType::AddTransferFromOther => Some(-quantity),
            TransType::SubTransferToOther => Some(quantity),
            _ => None,
        }
    }

    pub fn involves_other_branch(&self) -> bool {
        matches!(self, TransType::AddTransferFromOther | TransType::SubTransferToOther)
    }

    /// Venda direta da compra: passa pela filial sem mexer no saldo.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, TransType::SubSaleFromPurchaseDirect)
    }
}

// --- Linha da transação ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TransactionItem {
    pub trans_type: TransType,
    pub item_id: i64,
    pub other_branch_id: Option<i64>,
    #[schema(value_type = f64)]
    pub quantity: Decimal,
    pub note: String,
}

// --- Transação (evento de negócio) ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transaction {
    pub transaction_id: i64,
    pub company_id: i64,
    pub user_id: i64,
    pub branch_id: i64,
    pub client_uuid: String,
    pub date: DateTime<Utc>,
    pub note: String,
    #[sqlx(skip)]
    pub trans_items: Vec<TransactionItem>,
}

// ---
// O que o cliente envia (ids locais ainda negativos)
// ---
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PostedTransaction {
    pub transaction_id: i64,
    #[validate(length(min = 1, message = "O client_uuid da transação é obrigatório."))]
    pub client_uuid: String,
    pub branch_id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub trans_items: Vec<PostedTransactionItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PostedTransactionItem {
    pub trans_type: TransType,
    pub item_id: i64,
    #[serde(default)]
    pub other_branch_id: Option<i64>,
    #[schema(value_type = f64)]
    pub quantity: Decimal,
    #[serde(default)]
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfers_conserve_quantity() {
        let q = Decimal::new(155, 1);
        for t in [TransType::AddTransferFromOther, TransType::SubTransferToOther] {
            let other = t.other_branch_delta(q).unwrap();
            assert_eq!(t.branch_delta(q) + other, Decimal::ZERO);
        }
    }

    #[test]
    fn single_branch_types_do_not_touch_other_branch() {
        let q = Decimal::from(3);
        assert_eq!(TransType::AddPurchased.branch_delta(q), q);
        assert_eq!(TransType::SubCurrentBranchSale.branch_delta(q), -q);
        assert_eq!(TransType::SubSaleFromPurchaseDirect.branch_delta(q), Decimal::ZERO);
        assert!(TransType::AddPurchased.other_branch_delta(q).is_none());
        assert!(!TransType::SubCurrentBranchSale.involves_other_branch());
    }
}

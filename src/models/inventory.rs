// src/models/inventory.rs

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::common::error::AppError;

// --- Categoria raiz ---
// Toda empresa tem uma categoria ROOT implícita. O servidor usa 1, o protocolo
// usa -3. A tradução acontece só na entrada e na saída do núcleo.
pub const ROOT_CATEGORY_ID: i64 = 1;
pub const CLIENT_ROOT_CATEGORY_ID: i64 = -3;

pub fn category_id_from_client(id: i64) -> i64 {
    if id == CLIENT_ROOT_CATEGORY_ID { ROOT_CATEGORY_ID } else { id }
}

pub fn category_id_to_client(id: i64) -> i64 {
    if id == ROOT_CATEGORY_ID { CLIENT_ROOT_CATEGORY_ID } else { id }
}

// Bit de `status_flag` que marca itens e filiais removidos (tombstone).
pub const STATUS_FLAG_REMOVED: i32 = 0x1;

// --- 1. Categorias (árvore) ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub category_id: i64,
    pub company_id: i64,
    pub parent_id: i64,
    pub name: String,
    pub client_uuid: String,
}

// --- 2. Itens / Produtos ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Item {
    pub item_id: i64,
    pub company_id: i64,
    pub category_id: i64,
    pub client_uuid: String,
    pub name: String,
    pub item_code: String,
    pub unit_of_measurement: String,
    pub has_derived_unit: bool,
    pub derived_name: String,
    pub derived_factor: f64,
    pub status_flag: i32,
}

// --- 3. Filiais ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Branch {
    pub branch_id: i64,
    pub company_id: i64,
    pub client_uuid: String,
    pub name: String,
    pub location: String,
    pub status_flag: i32,
}

// --- 4. Saldo do item na filial ---
// A quantidade só muda via transações (nunca diretamente pelo sync de entidades).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BranchItem {
    pub company_id: i64,
    pub branch_id: i64,
    pub item_id: i64,
    #[schema(value_type = f64)]
    pub quantity: Decimal,
    pub item_location: String,
}

// --- 5. Relação filial-categoria (só presença) ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BranchCategory {
    pub company_id: i64,
    pub branch_id: i64,
    pub category_id: i64,
}

// ---
// Chave composta no protocolo: "<a>:<b>"
// ---
// Qualquer metade pode ser negativa (id local do cliente) ou positiva.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeId(pub i64, pub i64);

impl CompositeId {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidArgument(format!("Id composto inválido: '{}'", value));

        let (first, second) = value.split_once(':').ok_or_else(invalid)?;
        if first.is_empty() || second.is_empty() {
            return Err(invalid());
        }
        let first = first.parse::<i64>().map_err(|_| invalid())?;
        let second = second.parse::<i64>().map_err(|_| invalid())?;
        Ok(CompositeId(first, second))
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

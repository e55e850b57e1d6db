// src/common/db_utils.rs
//
// Classificação dos erros do Postgres que o núcleo trata de forma especial.

// SQLSTATE do Postgres
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Violação de chave única (23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

/// Erros em que o cliente pode simplesmente repetir a chamada (RPC `ABORTED`).
pub(crate) fn is_retryable(err: &sqlx::Error) -> bool {
    if is_unique_violation(err) {
        return true;
    }
    match err.as_database_error().and_then(|db_err| db_err.code()) {
        Some(code) => code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED,
        None => false,
    }
}

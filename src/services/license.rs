// src/services/license.rs
//
// Licença assinada devolvida em CreateCompany/SyncCompanies.
// A chave privada (PEM) é carregada uma vez na inicialização.

use anyhow::Context;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::common::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseClaims {
    pub company_id: i64,
    pub user_id: i64,
    pub permission: String,
    pub device_id: String,
    pub local_user_time: DateTime<Utc>,
    pub iat: i64,
}

pub struct LicenseSigner {
    key: EncodingKey,
    header: Header,
}

impl LicenseSigner {
    /// Chaves RSA assinam com RS256; chaves EC (P-256) com ES256.
    pub fn from_pem(pem: &[u8]) -> anyhow::Result<Self> {
        if let Ok(key) = EncodingKey::from_rsa_pem(pem) {
            return Ok(Self { key, header: Header::new(Algorithm::RS256) });
        }

        let key = EncodingKey::from_ec_pem(pem).context("A chave de licença não é uma chave RSA ou EC em PEM")?;
        Ok(Self { key, header: Header::new(Algorithm::ES256) })
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let pem = std::fs::read(path).with_context(|| format!("Não foi possível ler a chave de licença em {}", path))?;
        let signer = Self::from_pem(&pem)?;
        tracing::info!("🔑 Chave de licença carregada ({:?})", signer.algorithm());
        Ok(signer)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    pub fn sign(&self, claims: &LicenseClaims) -> Result<String, AppError> {
        Ok(encode(&self.header, claims, &self.key)?)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            key: EncodingKey::from_secret(b"licenca-de-teste"),
            header: Header::new(Algorithm::HS256),
        }
    }
}

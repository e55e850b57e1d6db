// src/db/pg_store.rs
//
// Implementação Postgres da fachada `Store`.
// Todas as queries recebem o company_id: nada atravessa a fronteira do tenant.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};

use crate::{
    common::error::AppError,
    db::store::{Store, StoreTx},
    models::{
        auth::{NewUser, User},
        inventory::{Branch, BranchCategory, BranchItem, Category, Item, STATUS_FLAG_REMOVED},
        operations::{Transaction, TransactionItem},
        revision::{EntityKind, EntityRevision},
        tenancy::{Company, Permission},
    },
};

const USER_COLUMNS: &str = "user_id, username, external_provider, external_provider_user_id, created_at";
const PERMISSION_COLUMNS: &str =
    "company_id, user_id, encoded_permission, permission_type, branches_allowed, stores_allowed";
const CATEGORY_COLUMNS: &str = "category_id, company_id, parent_id, name, client_uuid";
const ITEM_COLUMNS: &str = "item_id, company_id, category_id, client_uuid, name, item_code, \
     unit_of_measurement, has_derived_unit, derived_name, derived_factor, status_flag";
const BRANCH_COLUMNS: &str = "branch_id, company_id, client_uuid, name, location, status_flag";
const BRANCH_ITEM_COLUMNS: &str = "company_id, branch_id, item_id, quantity, item_location";
const TRANSACTION_COLUMNS: &str = "transaction_id, company_id, user_id, branch_id, client_uuid, date, note";
const REVISION_COLUMNS: &str =
    "company_id, entity_kind, revision_number, action, affected_id, additional_info";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: PgTransaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, AppError> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn begin_read(&self) -> Result<PgTx, AppError> {
        let mut tx = self.pool.begin().await?;
        // Snapshot único: o max da revisão e a lista enxergam o mesmo estado
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(PgTx { tx })
    }
}

impl PgTx {
    async fn load_transaction_items(&mut self, transaction_id: i64) -> Result<Vec<TransactionItem>, AppError> {
        let items = sqlx::query_as::<_, TransactionItem>(
            r#"
            SELECT trans_type, item_id, other_branch_id, quantity, note
            FROM transaction_items
            WHERE transaction_id = $1
            ORDER BY position ASC
            "#,
        )
            .bind(transaction_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(items)
    }

    async fn with_items(&mut self, transaction: Option<Transaction>) -> Result<Option<Transaction>, AppError> {
        match transaction {
            Some(mut t) => {
                t.trans_items = self.load_transaction_items(t.transaction_id).await?;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    //  USUÁRIOS
    // =========================================================================

    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn get_user_by_external_id(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_provider = $1 AND external_provider_user_id = $2"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (username, external_provider, external_provider_user_id)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.external_provider)
            .bind(&user.external_provider_user_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn update_username(&mut self, user_id: i64, username: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET username = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(username)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  EMPRESAS & PERMISSÕES
    // =========================================================================

    async fn insert_company(&mut self, name: &str, encoded_payment: &str) -> Result<Company, AppError> {
        let company = sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (name, encoded_payment)
            VALUES ($1, $2)
            RETURNING company_id, name, encoded_payment, created_at
            "#,
        )
            .bind(name)
            .bind(encoded_payment)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(company)
    }

    async fn get_company(&mut self, company_id: i64) -> Result<Option<Company>, AppError> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT company_id, name, encoded_payment, created_at FROM companies WHERE company_id = $1",
        )
            .bind(company_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(company)
    }

    async fn get_permission(&mut self, company_id: i64, user_id: i64) -> Result<Option<Permission>, AppError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE company_id = $1 AND user_id = $2");
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(company_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(permission)
    }

    async fn insert_permission(&mut self, permission: &Permission) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO permissions (company_id, user_id, encoded_permission, permission_type, branches_allowed, stores_allowed)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (company_id, user_id) DO NOTHING
            "#,
        )
            .bind(permission.company_id)
            .bind(permission.user_id)
            .bind(&permission.encoded_permission)
            .bind(permission.permission_type)
            .bind(&permission.branches_allowed)
            .bind(&permission.stores_allowed)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_permission(&mut self, permission: &Permission) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET encoded_permission = $3, permission_type = $4, branches_allowed = $5, stores_allowed = $6
            WHERE company_id = $1 AND user_id = $2
            "#,
        )
            .bind(permission.company_id)
            .bind(permission.user_id)
            .bind(&permission.encoded_permission)
            .bind(permission.permission_type)
            .bind(&permission.branches_allowed)
            .bind(&permission.stores_allowed)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_permission(&mut self, company_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM permissions WHERE company_id = $1 AND user_id = $2")
            .bind(company_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_permissions(&mut self, user_id: i64) -> Result<Vec<Permission>, AppError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE user_id = $1 ORDER BY company_id");
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(permissions)
    }

    // =========================================================================
    //  CATEGORIAS
    // =========================================================================

    async fn get_category(&mut self, company_id: i64, category_id: i64) -> Result<Option<Category>, AppError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE company_id = $1 AND category_id = $2");
        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(company_id)
            .bind(category_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(category)
    }

    async fn get_category_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Category>, AppError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE company_id = $1 AND client_uuid = $2");
        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(company_id)
            .bind(client_uuid)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(category)
    }

    async fn insert_category(&mut self, category: &Category) -> Result<Option<Category>, AppError> {
        // A unique (company_id, client_uuid) absorve o create repetido
        let sql = format!(
            r#"
            INSERT INTO categories (company_id, parent_id, name, client_uuid)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (company_id, client_uuid) DO NOTHING
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Category>(&sql)
            .bind(category.company_id)
            .bind(category.parent_id)
            .bind(&category.name)
            .bind(&category.client_uuid)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(inserted)
    }

    async fn update_category(&mut self, category: &Category) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE categories SET parent_id = $3, name = $4 WHERE company_id = $1 AND category_id = $2",
        )
            .bind(category.company_id)
            .bind(category.category_id)
            .bind(category.parent_id)
            .bind(&category.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&mut self, company_id: i64, category_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM categories
            WHERE company_id = $1 AND category_id = $2
              AND NOT EXISTS (SELECT 1 FROM categories WHERE company_id = $1 AND parent_id = $2)
              AND NOT EXISTS (SELECT 1 FROM items WHERE company_id = $1 AND category_id = $2 AND (status_flag & 1) = 0)
              AND NOT EXISTS (SELECT 1 FROM branch_categories WHERE company_id = $1 AND category_id = $2)
            "#,
        )
            .bind(company_id)
            .bind(category_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    async fn get_item(&mut self, company_id: i64, item_id: i64) -> Result<Option<Item>, AppError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE company_id = $1 AND item_id = $2");
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(company_id)
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(item)
    }

    async fn get_item_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Item>, AppError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE company_id = $1 AND client_uuid = $2");
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(company_id)
            .bind(client_uuid)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(item)
    }

    async fn insert_item(&mut self, item: &Item) -> Result<Option<Item>, AppError> {
        let sql = format!(
            r#"
            INSERT INTO items (
                company_id, category_id, client_uuid, name, item_code, unit_of_measurement,
                has_derived_unit, derived_name, derived_factor, status_flag
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (company_id, client_uuid) DO NOTHING
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Item>(&sql)
            .bind(item.company_id)
            .bind(item.category_id)
            .bind(&item.client_uuid)
            .bind(&item.name)
            .bind(&item.item_code)
            .bind(&item.unit_of_measurement)
            .bind(item.has_derived_unit)
            .bind(&item.derived_name)
            .bind(item.derived_factor)
            .bind(item.status_flag)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(inserted)
    }

    async fn update_item(&mut self, item: &Item) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET category_id = $3, name = $4, item_code = $5, unit_of_measurement = $6,
                has_derived_unit = $7, derived_name = $8, derived_factor = $9, status_flag = $10
            WHERE company_id = $1 AND item_id = $2
            "#,
        )
            .bind(item.company_id)
            .bind(item.item_id)
            .bind(item.category_id)
            .bind(&item.name)
            .bind(&item.item_code)
            .bind(&item.unit_of_measurement)
            .bind(item.has_derived_unit)
            .bind(&item.derived_name)
            .bind(item.derived_factor)
            .bind(item.status_flag)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_item_removed(&mut self, company_id: i64, item_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE items SET status_flag = status_flag | $3
            WHERE company_id = $1 AND item_id = $2 AND (status_flag & $3) = 0
            "#,
        )
            .bind(company_id)
            .bind(item_id)
            .bind(STATUS_FLAG_REMOVED)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  FILIAIS
    // =========================================================================

    async fn get_branch(&mut self, company_id: i64, branch_id: i64) -> Result<Option<Branch>, AppError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE company_id = $1 AND branch_id = $2");
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(company_id)
            .bind(branch_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(branch)
    }

    async fn get_branch_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Branch>, AppError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE company_id = $1 AND client_uuid = $2");
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(company_id)
            .bind(client_uuid)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(branch)
    }

    async fn insert_branch(&mut self, branch: &Branch) -> Result<Option<Branch>, AppError> {
        let sql = format!(
            r#"
            INSERT INTO branches (company_id, client_uuid, name, location, status_flag)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (company_id, client_uuid) DO NOTHING
            RETURNING {BRANCH_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Branch>(&sql)
            .bind(branch.company_id)
            .bind(&branch.client_uuid)
            .bind(&branch.name)
            .bind(&branch.location)
            .bind(branch.status_flag)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(inserted)
    }

    async fn update_branch(&mut self, branch: &Branch) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE branches SET name = $3, location = $4, status_flag = $5
            WHERE company_id = $1 AND branch_id = $2
            "#,
        )
            .bind(branch.company_id)
            .bind(branch.branch_id)
            .bind(&branch.name)
            .bind(&branch.location)
            .bind(branch.status_flag)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_branch_removed(&mut self, company_id: i64, branch_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE branches SET status_flag = status_flag | $3
            WHERE company_id = $1 AND branch_id = $2 AND (status_flag & $3) = 0
            "#,
        )
            .bind(company_id)
            .bind(branch_id)
            .bind(STATUS_FLAG_REMOVED)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  SALDOS (BRANCH-ITEMS)
    // =========================================================================

    async fn get_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError> {
        let sql = format!(
            "SELECT {BRANCH_ITEM_COLUMNS} FROM branch_items WHERE company_id = $1 AND branch_id = $2 AND item_id = $3"
        );
        let branch_item = sqlx::query_as::<_, BranchItem>(&sql)
            .bind(company_id)
            .bind(branch_id)
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(branch_item)
    }

    async fn lock_branch_item(
        &mut self,
        company_id: i64,
        branch_id: i64,
        item_id: i64,
    ) -> Result<Option<BranchItem>, AppError> {
        // FOR UPDATE: duas chamadas concorrentes no mesmo (filial, item) se
        // serializam aqui, e nenhuma mudança de quantidade se perde.
        let sql = format!(
            r#"
            SELECT {BRANCH_ITEM_COLUMNS} FROM branch_items
            WHERE company_id = $1 AND branch_id = $2 AND item_id = $3
            FOR UPDATE
            "#
        );
        let branch_item = sqlx::query_as::<_, BranchItem>(&sql)
            .bind(company_id)
            .bind(branch_id)
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(branch_item)
    }

    async fn insert_branch_item(&mut self, branch_item: &BranchItem) -> Result<BranchItem, AppError> {
        let sql = format!(
            r#"
            INSERT INTO branch_items (company_id, branch_id, item_id, quantity, item_location)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (branch_id, item_id)
            DO UPDATE SET quantity = branch_items.quantity + EXCLUDED.quantity
            RETURNING {BRANCH_ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, BranchItem>(&sql)
            .bind(branch_item.company_id)
            .bind(branch_item.branch_id)
            .bind(branch_item.item_id)
            .bind(branch_item.quantity)
            .bind(&branch_item.item_location)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn update_branch_item(&mut self, branch_item: &BranchItem) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE branch_items SET quantity = $4, item_location = $5
            WHERE company_id = $1 AND branch_id = $2 AND item_id = $3
            "#,
        )
            .bind(branch_item.company_id)
            .bind(branch_item.branch_id)
            .bind(branch_item.item_id)
            .bind(branch_item.quantity)
            .bind(&branch_item.item_location)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_branch_item(&mut self, company_id: i64, branch_id: i64, item_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM branch_items WHERE company_id = $1 AND branch_id = $2 AND item_id = $3",
        )
            .bind(company_id)
            .bind(branch_id)
            .bind(item_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  FILIAL-CATEGORIA
    // =========================================================================

    async fn get_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<Option<BranchCategory>, AppError> {
        let row = sqlx::query_as::<_, BranchCategory>(
            r#"
            SELECT company_id, branch_id, category_id FROM branch_categories
            WHERE company_id = $1 AND branch_id = $2 AND category_id = $3
            "#,
        )
            .bind(company_id)
            .bind(branch_id)
            .bind(category_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_branch_category(&mut self, branch_category: &BranchCategory) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO branch_categories (company_id, branch_id, category_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (branch_id, category_id) DO NOTHING
            "#,
        )
            .bind(branch_category.company_id)
            .bind(branch_category.branch_id)
            .bind(branch_category.category_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_branch_category(
        &mut self,
        company_id: i64,
        branch_id: i64,
        category_id: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM branch_categories WHERE company_id = $1 AND branch_id = $2 AND category_id = $3",
        )
            .bind(company_id)
            .bind(branch_id)
            .bind(category_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  TRANSAÇÕES
    // =========================================================================

    async fn get_transaction(&mut self, company_id: i64, transaction_id: i64) -> Result<Option<Transaction>, AppError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE company_id = $1 AND transaction_id = $2");
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(company_id)
            .bind(transaction_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        self.with_items(transaction).await
    }

    async fn get_transaction_by_uuid(&mut self, company_id: i64, client_uuid: &str) -> Result<Option<Transaction>, AppError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE company_id = $1 AND client_uuid = $2");
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(company_id)
            .bind(client_uuid)
            .fetch_optional(&mut *self.tx)
            .await?;
        self.with_items(transaction).await
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Option<Transaction>, AppError> {
        let sql = format!(
            r#"
            INSERT INTO transactions (company_id, user_id, branch_id, client_uuid, date, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (company_id, client_uuid) DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Transaction>(&sql)
            .bind(transaction.company_id)
            .bind(transaction.user_id)
            .bind(transaction.branch_id)
            .bind(&transaction.client_uuid)
            .bind(transaction.date)
            .bind(&transaction.note)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(mut inserted) = inserted else {
            return Ok(None);
        };

        for (position, line) in transaction.trans_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transaction_items (transaction_id, position, trans_type, item_id, other_branch_id, quantity, note)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
                .bind(inserted.transaction_id)
                .bind(position as i32)
                .bind(line.trans_type)
                .bind(line.item_id)
                .bind(line.other_branch_id)
                .bind(line.quantity)
                .bind(&line.note)
                .execute(&mut *self.tx)
                .await?;
        }

        inserted.trans_items = transaction.trans_items.clone();
        Ok(Some(inserted))
    }

    // =========================================================================
    //  REVISÕES
    // =========================================================================

    async fn next_revision_number(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError> {
        // A linha do contador fica travada até o commit: o próximo escritor do
        // mesmo par só lê o max+1 depois que este terminar.
        let next = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO revision_counters (company_id, entity_kind, last_revision)
            VALUES ($1, $2, 1)
            ON CONFLICT (company_id, entity_kind)
            DO UPDATE SET last_revision = revision_counters.last_revision + 1
            RETURNING last_revision
            "#,
        )
            .bind(company_id)
            .bind(kind)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(next)
    }

    async fn lock_revision_counter(&mut self, company_id: i64, kind: EntityKind) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO revision_counters (company_id, entity_kind, last_revision)
            VALUES ($1, $2, 0)
            ON CONFLICT (company_id, entity_kind)
            DO UPDATE SET last_revision = revision_counters.last_revision
            "#,
        )
            .bind(company_id)
            .bind(kind)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_revision(&mut self, revision: &EntityRevision) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO entity_revisions (company_id, entity_kind, revision_number, action, affected_id, additional_info)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
            .bind(revision.company_id)
            .bind(revision.entity_kind)
            .bind(revision.revision_number)
            .bind(revision.action)
            .bind(revision.affected_id)
            .bind(revision.additional_info)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn max_revision(&mut self, company_id: i64, kind: EntityKind) -> Result<i64, AppError> {
        let max = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(MAX(revision_number), 0)::BIGINT
            FROM entity_revisions
            WHERE company_id = $1 AND entity_kind = $2
            "#,
        )
            .bind(company_id)
            .bind(kind)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(max)
    }

    async fn revisions_after(
        &mut self,
        company_id: i64,
        kind: EntityKind,
        cursor: i64,
    ) -> Result<Vec<EntityRevision>, AppError> {
        let sql = format!(
            r#"
            SELECT {REVISION_COLUMNS} FROM entity_revisions
            WHERE company_id = $1 AND entity_kind = $2 AND revision_number > $3
            ORDER BY revision_number ASC
            "#
        );
        let revisions = sqlx::query_as::<_, EntityRevision>(&sql)
            .bind(company_id)
            .bind(kind)
            .bind(cursor)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(revisions)
    }
}

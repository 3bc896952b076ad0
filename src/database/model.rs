//! Database model types for Diesel ORM.

use diesel::prelude::*;

use super::schema::accounts;

/// Database row for an account.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountRow {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub exchange_address_id: String,
    pub zk_address_id: String,
    pub f4_address_id: String,
    pub ot_address_id: String,
    pub cipher: String,
    pub layer: i32,
    pub owner: String,
    pub chain_name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Database row for an account (insertable).
#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = accounts)]
pub struct NewAccountRow {
    pub name: String,
    pub address: String,
    pub exchange_address_id: String,
    pub zk_address_id: String,
    pub f4_address_id: String,
    pub ot_address_id: String,
    pub cipher: String,
    pub layer: i32,
    pub owner: String,
    pub chain_name: String,
    pub created_at: String,
    pub updated_at: String,
}

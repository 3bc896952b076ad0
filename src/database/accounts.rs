//! Account queries.

use diesel::prelude::*;
use diesel::SqliteConnection;

use super::model::{AccountRow, NewAccountRow};
use super::schema::accounts;

/// All accounts ordered by id, optionally filtered by exact name.
pub fn list(
    conn: &mut SqliteConnection,
    name: Option<&str>,
    limit: Option<i64>,
) -> QueryResult<Vec<AccountRow>> {
    let mut query = accounts::table
        .select(AccountRow::as_select())
        .order(accounts::id.asc())
        .into_boxed();
    if let Some(name) = name {
        query = query.filter(accounts::name.eq(name.to_string()));
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query.load(conn)
}

pub fn by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<AccountRow>> {
    accounts::table
        .find(id)
        .select(AccountRow::as_select())
        .first(conn)
        .optional()
}

pub fn by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<AccountRow>> {
    accounts::table
        .filter(accounts::name.eq(name))
        .select(AccountRow::as_select())
        .first(conn)
        .optional()
}

pub fn by_address(conn: &mut SqliteConnection, address: &str) -> QueryResult<Option<AccountRow>> {
    accounts::table
        .filter(accounts::address.eq(address))
        .select(AccountRow::as_select())
        .first(conn)
        .optional()
}

pub fn insert(conn: &mut SqliteConnection, row: &NewAccountRow) -> QueryResult<usize> {
    diesel::insert_into(accounts::table).values(row).execute(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::{create_pool, run_migrations};

    fn row(name: &str, address: &str) -> NewAccountRow {
        NewAccountRow {
            name: name.to_string(),
            address: address.to_string(),
            layer: 1,
            chain_name: "solana".to_string(),
            created_at: "2024-06-01T00:00:00Z".to_string(),
            updated_at: "2024-06-01T00:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("accounts.db").display().to_string()).unwrap();
        run_migrations(&pool).unwrap();
        let mut conn = pool.get().unwrap();

        insert(&mut conn, &row("alpha", "Addr1")).unwrap();
        insert(&mut conn, &row("beta", "Addr2")).unwrap();
        insert(&mut conn, &row("alpha", "Addr3")).unwrap();

        assert_eq!(list(&mut conn, None, None).unwrap().len(), 3);
        assert_eq!(list(&mut conn, Some("alpha"), None).unwrap().len(), 2);
        assert_eq!(list(&mut conn, None, Some(1)).unwrap().len(), 1);

        let beta = by_name(&mut conn, "beta").unwrap().unwrap();
        assert_eq!(beta.address, "Addr2");
        assert_eq!(by_id(&mut conn, beta.id).unwrap().unwrap().name, "beta");
        assert_eq!(by_address(&mut conn, "Addr3").unwrap().unwrap().name, "alpha");
        assert!(by_address(&mut conn, "missing").unwrap().is_none());
    }
}

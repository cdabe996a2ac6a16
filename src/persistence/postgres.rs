use super::{Connection, Persistence, Transaction};
use anyhow::{Context, Result};
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};

/// Postgres-backed persistence on top of an `r2d2` connection pool.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresPersistence {
    pub fn connect(url: &str) -> Result<Self> {
        let manager = PostgresConnectionManager::new(
            url.parse().context("invalid database url")?,
            NoTls,
        );
        Ok(Self {
            pool: r2d2::Pool::new(manager).context("failed to open database pool")?,
        })
    }
}

impl Persistence for PostgresPersistence {
    type Connection = PostgresConnection;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(self.pool.get()?)
    }
}

pub type PostgresConnection =
    r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

impl Connection<PostgresPersistence> for PostgresConnection {
    type Transaction<'a> = PostgresTransaction<'a>
    where
        Self: 'a;

    fn start_transaction(&mut self) -> Result<PostgresTransaction<'_>> {
        Ok(self.transaction()?)
    }
}

pub type PostgresTransaction<'a> = postgres::Transaction<'a>;

impl Transaction for PostgresTransaction<'_> {
    fn commit(self) -> Result<()> {
        Ok(postgres::Transaction::commit(self)?)
    }

    fn rollback(self) -> Result<()> {
        Ok(postgres::Transaction::rollback(self)?)
    }
}

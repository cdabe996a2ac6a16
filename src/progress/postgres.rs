use super::{ProgressTracker, SharedProgressTracker};
use crate::bid_log::Offset;
use crate::persistence::postgres::{
    PostgresConnection, PostgresPersistence, PostgresTransaction,
};
use crate::service::ServiceIdRef;
use anyhow::Result;
use std::sync::Arc;

const SETUP_SQL: &str = "\
CREATE TABLE IF NOT EXISTS follower_progress (
    service_id TEXT PRIMARY KEY,
    last_offset BIGINT NOT NULL
)";

pub struct PostgresProgressTracker;

impl PostgresProgressTracker {
    pub fn new_shared() -> SharedProgressTracker<PostgresPersistence> {
        Arc::new(Self)
    }

    pub fn setup(conn: &mut PostgresConnection) -> Result<()> {
        conn.batch_execute(SETUP_SQL)?;
        Ok(())
    }
}

impl ProgressTracker for PostgresProgressTracker {
    type Persistence = PostgresPersistence;

    fn load(&self, conn: &mut PostgresConnection, id: ServiceIdRef) -> Result<Option<Offset>> {
        conn.query_opt(
            "SELECT last_offset FROM follower_progress WHERE service_id = $1",
            &[&id],
        )?
        .map(|row| Ok(u64::try_from(row.get::<_, i64>("last_offset"))?))
        .transpose()
    }

    fn store_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()> {
        transaction.execute(
            "INSERT INTO follower_progress (service_id, last_offset) VALUES ($1, $2) \
             ON CONFLICT (service_id) DO UPDATE SET last_offset = EXCLUDED.last_offset",
            &[&id, &i64::try_from(offset)?],
        )?;
        Ok(())
    }
}

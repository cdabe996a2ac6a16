use super::{Eligibility, EligibilityStore, SharedEligibilityStore};
use crate::auction::BidderIdRef;
use crate::persistence::postgres::{
    PostgresConnection, PostgresPersistence, PostgresTransaction,
};
use anyhow::Result;
use std::sync::Arc;

const SETUP_SQL: &str = "\
CREATE TABLE IF NOT EXISTS eligibility (
    bidder TEXT PRIMARY KEY,
    email_confirmed BOOLEAN NOT NULL,
    phone_confirmed BOOLEAN NOT NULL,
    identity_verified BOOLEAN NOT NULL,
    payment_verified BOOLEAN NOT NULL
)";

const LOAD_SQL: &str = "\
SELECT email_confirmed, phone_confirmed, identity_verified, payment_verified \
 FROM eligibility WHERE bidder = $1";

pub struct PostgresEligibilityStore;

impl PostgresEligibilityStore {
    pub fn new_shared() -> SharedEligibilityStore<PostgresPersistence> {
        Arc::new(Self)
    }

    pub fn setup(conn: &mut PostgresConnection) -> Result<()> {
        conn.batch_execute(SETUP_SQL)?;
        Ok(())
    }
}

fn row_to_eligibility(row: &postgres::Row) -> Eligibility {
    Eligibility {
        email_confirmed: row.get("email_confirmed"),
        phone_confirmed: row.get("phone_confirmed"),
        identity_verified: row.get("identity_verified"),
        payment_verified: row.get("payment_verified"),
    }
}

impl EligibilityStore for PostgresEligibilityStore {
    type Persistence = PostgresPersistence;

    fn load(
        &self,
        conn: &mut PostgresConnection,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>> {
        Ok(conn
            .query_opt(LOAD_SQL, &[&bidder])?
            .map(|row| row_to_eligibility(&row)))
    }

    fn store(
        &self,
        conn: &mut PostgresConnection,
        bidder: BidderIdRef,
        eligibility: Eligibility,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO eligibility \
             (bidder, email_confirmed, phone_confirmed, identity_verified, payment_verified) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (bidder) DO UPDATE SET \
             email_confirmed = EXCLUDED.email_confirmed, \
             phone_confirmed = EXCLUDED.phone_confirmed, \
             identity_verified = EXCLUDED.identity_verified, \
             payment_verified = EXCLUDED.payment_verified",
            &[
                &bidder,
                &eligibility.email_confirmed,
                &eligibility.phone_confirmed,
                &eligibility.identity_verified,
                &eligibility.payment_verified,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>> {
        Ok(transaction
            .query_opt(LOAD_SQL, &[&bidder])?
            .map(|row| row_to_eligibility(&row)))
    }
}

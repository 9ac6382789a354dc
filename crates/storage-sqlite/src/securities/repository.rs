//! Securities reference store over the `securities` table.
//!
//! Writes are upserts keyed by symbol; profile fields merge with
//! COALESCE so a sparse provider response never erases stored data.

use async_trait::async_trait;
use rusqlite::params;

use fundsnap_core::errors::Result;
use fundsnap_core::securities::{Security, SecurityRepositoryTrait};
use fundsnap_market_data::SecurityProfile;

use crate::db::WriteHandle;
use crate::errors::StorageError;

pub struct SqliteSecurityRepository {
    handle: WriteHandle,
}

impl SqliteSecurityRepository {
    pub fn new(handle: WriteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl SecurityRepositoryTrait for SqliteSecurityRepository {
    async fn all_securities(&self) -> Result<Vec<Security>> {
        self.handle
            .exec(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT symbol, currency, canonical_symbol, name, sector, industry, \
                         market_cap, week_52_high, week_52_low FROM securities ORDER BY symbol",
                    )
                    .map_err(StorageError::QueryFailed)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Security {
                            symbol: row.get(0)?,
                            currency: row.get(1)?,
                            canonical_symbol: row.get(2)?,
                            name: row.get(3)?,
                            sector: row.get(4)?,
                            industry: row.get(5)?,
                            market_cap: row.get(6)?,
                            week_52_high: row.get(7)?,
                            week_52_low: row.get(8)?,
                        })
                    })
                    .map_err(StorageError::QueryFailed)?;

                let mut securities = Vec::new();
                for row in rows {
                    securities.push(row.map_err(StorageError::QueryFailed)?);
                }
                Ok(securities)
            })
            .await
    }

    async fn save_canonical_symbol(&self, symbol: &str, canonical: &str) -> Result<()> {
        let symbol = symbol.to_string();
        let canonical = canonical.to_string();
        self.handle
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO securities (symbol, canonical_symbol) VALUES (?1, ?2) \
                     ON CONFLICT(symbol) DO UPDATE SET canonical_symbol = excluded.canonical_symbol",
                    params![symbol, canonical],
                )
                .map_err(StorageError::QueryFailed)?;
                Ok(())
            })
            .await
    }

    async fn save_profile(&self, symbol: &str, profile: &SecurityProfile) -> Result<()> {
        let symbol = symbol.to_string();
        let profile = profile.clone();
        self.handle
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO securities \
                     (symbol, name, sector, industry, market_cap, week_52_high, week_52_low, profile_source) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(symbol) DO UPDATE SET \
                     name = COALESCE(excluded.name, name), \
                     sector = COALESCE(excluded.sector, sector), \
                     industry = COALESCE(excluded.industry, industry), \
                     market_cap = COALESCE(excluded.market_cap, market_cap), \
                     week_52_high = COALESCE(excluded.week_52_high, week_52_high), \
                     week_52_low = COALESCE(excluded.week_52_low, week_52_low), \
                     profile_source = COALESCE(excluded.profile_source, profile_source)",
                    params![
                        symbol,
                        profile.name,
                        profile.sector,
                        profile.industry,
                        profile.market_cap,
                        profile.week_52_high,
                        profile.week_52_low,
                        profile.source,
                    ],
                )
                .map_err(StorageError::QueryFailed)?;
                Ok(())
            })
            .await
    }
}

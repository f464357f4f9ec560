//! Get-or-create resolution of dimension rows.
use std::collections::{BTreeMap, HashMap};

use diesel_async::AsyncPgConnection;
use ethers::types::H256;
use tracing::trace;

use mcd_core::{
    bytes32_to_string,
    insertion::{ForeignKeyField, InsertionModel},
    storage::StorageError,
};

use super::{
    orm::{Address, Ilk, NewIlk},
    storage_error_from_diesel, PostgresError,
};

/// Resolves natural values (addresses, ilks) to surrogate ids.
///
/// Instances are scoped to a single database transaction: cached ids may
/// refer to rows created inside that transaction and are meaningless once
/// it rolls back.
#[derive(Default)]
pub(crate) struct ForeignKeyResolver {
    cache: HashMap<(ForeignKeyField, String), i64>,
}

impl ForeignKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every foreign key of a model, keyed by field.
    pub async fn resolve_model(
        &mut self,
        model: &InsertionModel,
        conn: &mut AsyncPgConnection,
    ) -> Result<BTreeMap<ForeignKeyField, i64>, PostgresError> {
        let mut ids = BTreeMap::new();
        for (field, natural) in model.foreign_keys.iter() {
            ids.insert(*field, self.resolve(*field, natural, conn).await?);
        }
        Ok(ids)
    }

    pub async fn resolve(
        &mut self,
        field: ForeignKeyField,
        natural: &str,
        conn: &mut AsyncPgConnection,
    ) -> Result<i64, PostgresError> {
        let cache_key = (field, natural.to_owned());
        if let Some(id) = self.cache.get(&cache_key) {
            return Ok(*id);
        }
        let id = match field {
            ForeignKeyField::Address => address_id(natural, conn).await?,
            ForeignKeyField::Ilk => ilk_id(natural, conn).await?,
        };
        trace!(?field, natural, id, "ResolvedForeignKey");
        self.cache.insert(cache_key, id);
        Ok(id)
    }
}

// A conflicting insert means a concurrent transaction created the row after
// our read, so it is read again.
async fn address_id(address: &str, conn: &mut AsyncPgConnection) -> Result<i64, PostgresError> {
    let lookup_err = |err| storage_error_from_diesel(err, "Address", address);
    if let Some(id) = Address::id_by_address(address, conn)
        .await
        .map_err(lookup_err)?
    {
        return Ok(id);
    }
    if let Some(id) = Address::insert_if_absent(address, conn)
        .await
        .map_err(lookup_err)?
    {
        return Ok(id);
    }
    Address::id_by_address(address, conn)
        .await
        .map_err(lookup_err)?
        .ok_or_else(|| PostgresError(StorageError::NotFound("Address".into(), address.into())))
}

async fn ilk_id(ilk: &str, conn: &mut AsyncPgConnection) -> Result<i64, PostgresError> {
    let lookup_err = |err| storage_error_from_diesel(err, "Ilk", ilk);
    if let Some(id) = Ilk::id_by_ilk(ilk, conn)
        .await
        .map_err(lookup_err)?
    {
        return Ok(id);
    }
    let identifier = ilk_identifier(ilk)?;
    let new = NewIlk { ilk, identifier: &identifier };
    if let Some(id) = Ilk::insert_if_absent(&new, conn)
        .await
        .map_err(lookup_err)?
    {
        return Ok(id);
    }
    Ilk::id_by_ilk(ilk, conn)
        .await
        .map_err(lookup_err)?
        .ok_or_else(|| PostgresError(StorageError::NotFound("Ilk".into(), ilk.into())))
}

fn ilk_identifier(ilk: &str) -> Result<String, PostgresError> {
    let bytes = ilk
        .strip_prefix("0x")
        .and_then(hex_word)
        .ok_or_else(|| {
            PostgresError(StorageError::DecodeError(format!("Invalid ilk `{ilk}`")))
        })?;
    Ok(bytes32_to_string(&bytes))
}

fn hex_word(stripped: &str) -> Option<H256> {
    let bytes = hex::decode(stripped).ok()?;
    (bytes.len() == 32).then(|| H256::from_slice(&bytes))
}

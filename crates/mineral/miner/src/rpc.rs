//! JSON-RPC ledger client

use alloy_primitives::B256;
use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, trace};

use crate::{
    bus::Bus,
    ledger::{
        AccountAddress, Ledger, LedgerError, MinerRecord, ObjectId, SignedTransaction,
        TransactionEffects, u64_from_str_or_num,
    },
    tx::MINER_MODULE,
};

/// Move struct name of miner objects
const MINER_STRUCT: &str = "Miner";

/// [`Ledger`] over a fullnode JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: HttpClient,
    package: ObjectId,
}

impl RpcLedger {
    /// Connect to `url`. `package` is used to recognise miner objects.
    pub fn new(url: &str, package: ObjectId) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default().build(url)?;
        Ok(Self { client, package })
    }

    fn miner_type(&self) -> String {
        format!("{}::{MINER_MODULE}::{MINER_STRUCT}", self.package)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn multi_get_buses(&self, ids: &[ObjectId]) -> Result<Vec<Bus>, LedgerError> {
        let objects: Vec<ObjectResponse> = self
            .client
            .request("sui_multiGetObjects", rpc_params![ids, json!({ "showContent": true })])
            .await?;
        trace!(target: "mineral::rpc", count = objects.len(), "Fetched bus objects");
        decode_buses(ids, objects)
    }

    async fn get_bus(&self, id: ObjectId) -> Result<Bus, LedgerError> {
        let object: ObjectResponse = self
            .client
            .request("sui_getObject", rpc_params![id, json!({ "showContent": true })])
            .await?;
        decode_bus(id, object)
    }

    async fn get_miner(&self, id: ObjectId) -> Result<MinerRecord, LedgerError> {
        let object: ObjectResponse = self
            .client
            .request("sui_getObject", rpc_params![id, json!({ "showContent": true })])
            .await?;
        decode_miner(id, object)
    }

    async fn find_miner(&self, owner: AccountAddress) -> Result<Option<ObjectId>, LedgerError> {
        let query = json!({
            "filter": { "StructType": self.miner_type() },
            "options": { "showType": true },
        });
        let page: OwnedObjectsPage = self
            .client
            .request("suix_getOwnedObjects", rpc_params![owner, query, None::<String>, 1u32])
            .await?;
        let miner = page.data.into_iter().find_map(|object| object.data).map(|data| data.object_id);
        debug!(target: "mineral::rpc", %owner, ?miner, "Looked up miner");
        Ok(miner)
    }

    async fn dry_run(&self, tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError> {
        let response: DryRunResponse = self
            .client
            .request("sui_dryRunTransactionBlock", rpc_params![&tx.tx_bytes])
            .await?;
        Ok(response.effects)
    }

    async fn execute(&self, tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError> {
        let response: ExecuteResponse = self
            .client
            .request(
                "sui_executeTransactionBlock",
                rpc_params![
                    &tx.tx_bytes,
                    [&tx.signature],
                    json!({ "showEffects": true }),
                    "WaitForLocalExecution"
                ],
            )
            .await?;
        trace!(target: "mineral::rpc", digest = %response.digest, "Executed transaction");
        response.effects.ok_or(LedgerError::MissingEffects)
    }
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    #[serde(default)]
    data: Option<ObjectData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectData {
    object_id: ObjectId,
    #[serde(default)]
    content: Option<MoveContent>,
}

#[derive(Debug, Deserialize)]
struct MoveContent {
    fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OwnedObjectsPage {
    data: Vec<ObjectResponse>,
}

#[derive(Debug, Deserialize)]
struct DryRunResponse {
    effects: TransactionEffects,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    digest: String,
    #[serde(default)]
    effects: Option<TransactionEffects>,
}

#[derive(Debug, Deserialize)]
struct BusFields {
    #[serde(deserialize_with = "balance_value")]
    rewards: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    reward_rate: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    last_reset: u64,
}

#[derive(Debug, Deserialize)]
struct MinerFields {
    current_hash: Vec<u8>,
}

fn object_fields<T: DeserializeOwned>(id: ObjectId, object: ObjectResponse) -> Result<T, LedgerError> {
    let content = object
        .data
        .and_then(|data| data.content)
        .ok_or(LedgerError::ObjectNotFound(id))?;
    serde_json::from_value(content.fields)
        .map_err(|e| LedgerError::Decode { id, reason: e.to_string() })
}

fn decode_bus(id: ObjectId, object: ObjectResponse) -> Result<Bus, LedgerError> {
    let fields: BusFields = object_fields(id, object)?;
    Ok(Bus {
        id,
        rewards: fields.rewards,
        reward_rate: fields.reward_rate,
        last_reset: fields.last_reset,
    })
}

fn decode_buses(ids: &[ObjectId], objects: Vec<ObjectResponse>) -> Result<Vec<Bus>, LedgerError> {
    if objects.len() != ids.len() {
        // Nothing ties a short response to its ids, blame the first one missing
        let missing = ids.get(objects.len()).copied().unwrap_or_default();
        return Err(LedgerError::Decode {
            id: missing,
            reason: format!("requested {} buses, node returned {}", ids.len(), objects.len()),
        });
    }
    ids.iter().zip(objects).map(|(id, object)| decode_bus(*id, object)).collect()
}

fn decode_miner(id: ObjectId, object: ObjectResponse) -> Result<MinerRecord, LedgerError> {
    let fields: MinerFields = object_fields(id, object)?;
    let current_hash = B256::try_from(fields.current_hash.as_slice()).map_err(|_| {
        LedgerError::Decode {
            id,
            reason: format!("current_hash has {} bytes", fields.current_hash.len()),
        }
    })?;
    Ok(MinerRecord { id, current_hash })
}

/// `Balance<T>` renders either as a bare amount or as `{ "value": amount }`
fn balance_value<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Amount(#[serde(deserialize_with = "u64_from_str_or_num")] u64);

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bare(Amount),
        Wrapped { value: Amount },
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bare(Amount(v)) | Raw::Wrapped { value: Amount(v) } => v,
    })
}

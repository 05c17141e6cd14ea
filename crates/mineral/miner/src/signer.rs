//! Remote signing service client.
//!
//! Keys never enter this process. Drafts are sent to a signing service that
//! sets sender and gas, and returns signed bytes.

use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    ledger::{AccountAddress, LedgerError, SignedTransaction, TransactionSigner},
    tx::TransactionDraft,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    sender: AccountAddress,
    transaction: &'a TransactionDraft,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_budget: Option<u64>,
}

/// [`TransactionSigner`] backed by a JSON-RPC signing service
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    client: HttpClient,
    address: AccountAddress,
}

impl RemoteSigner {
    /// Connect to the signing service and fetch its address
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default().build(url)?;
        let address: AccountAddress = client.request("signer_address", rpc_params![]).await?;
        info!(target: "mineral::signer", %address, "Connected to signer");
        Ok(Self { client, address })
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    fn address(&self) -> AccountAddress {
        self.address
    }

    async fn sign(
        &self,
        draft: &TransactionDraft,
        gas_budget: Option<u64>,
    ) -> Result<SignedTransaction, LedgerError> {
        let request = SignRequest { sender: self.address, transaction: draft, gas_budget };
        debug!(target: "mineral::signer", ?gas_budget, "Requesting signature");
        self.client
            .request("signer_signTransaction", rpc_params![request])
            .await
            .map_err(|e| LedgerError::Signer(e.to_string()))
    }
}

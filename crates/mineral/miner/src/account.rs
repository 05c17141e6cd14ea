//! Miner account lookup and registration

use tracing::{error, info};

use crate::{
    MinerError,
    ledger::{Ledger, ObjectId, TransactionSigner},
    tx::{TxSubmitter, build_register_transaction},
};

/// Find the signer's miner object, registering one if it has none.
///
/// A registration that executes but leaves no discoverable miner is a
/// setup failure and is not retried.
pub async fn resolve_miner<L, S>(
    submitter: &TxSubmitter<'_, L, S>,
    ledger: &L,
    signer: &S,
    package: ObjectId,
) -> Result<ObjectId, MinerError>
where
    L: Ledger + ?Sized,
    S: TransactionSigner + ?Sized,
{
    let owner = signer.address();
    if let Some(miner) = ledger.find_miner(owner).await? {
        return Ok(miner);
    }

    info!(target: "mineral::account", %owner, "No miner found, registering");
    submitter.estimate_and_submit(&build_register_transaction(package)).await?;

    match ledger.find_miner(owner).await? {
        Some(miner) => {
            info!(target: "mineral::account", %owner, %miner, "Miner registered");
            Ok(miner)
        }
        None => {
            error!(target: "mineral::account", %owner, "Miner failed to register");
            Err(MinerError::RegistrationFailed { owner })
        }
    }
}

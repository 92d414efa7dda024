use std::str::FromStr;

use async_trait::async_trait;
use tracing::info;

use crate::error::{EngineError, EngineResult};

#[derive(Clone, Debug)]
pub struct TxRef {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// On-chain settlement collaborator: burns `min(up, down)` complete sets for
/// $1 each via the CTF contract. Grounded in the alloy + CTF client pattern
/// used by the manual redeem binaries (`ProviderBuilder` + wallet signer +
/// `CtfClient`), generalized from redemption to mid-cycle merge.
#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn auto_merge(&self, market_slug: &str, condition_id_hex: &str, shares_pips: u64) -> EngineResult<TxRef>;
}

pub struct CtfSettlementClient {
    client: polymarket_client_sdk::ctf::Client<alloy::providers::RootProvider>,
}

impl CtfSettlementClient {
    pub async fn connect(private_key: &str, rpc_url: &str) -> EngineResult<Self> {
        use alloy::providers::ProviderBuilder;
        use alloy::signers::local::LocalSigner;
        use alloy::signers::Signer as _;
        use polymarket_client_sdk::ctf::Client as CtfClient;
        use polymarket_client_sdk::POLYGON;

        let signer = LocalSigner::from_str(private_key)
            .map_err(|e| EngineError::Configuration(format!("invalid private key: {e}")))?
            .with_chain_id(Some(POLYGON));

        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect(rpc_url)
            .await
            .map_err(|e| EngineError::Configuration(format!("rpc connect failed: {e}")))?;

        let client = CtfClient::new(provider, POLYGON)
            .map_err(|e| EngineError::Configuration(format!("ctf client init failed: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SettlementClient for CtfSettlementClient {
    async fn auto_merge(&self, market_slug: &str, condition_id_hex: &str, shares_pips: u64) -> EngineResult<TxRef> {
        use alloy::primitives::{B256, U256};
        use polymarket_client_sdk::ctf::types::MergePositionsRequest;

        let condition_id = B256::from_str(condition_id_hex)
            .map_err(|e| EngineError::Rejected(format!("invalid condition id: {e}")))?;
        let amount = U256::from(shares_pips);

        let request = MergePositionsRequest::for_binary_market(condition_id, amount);

        let resp = self
            .client
            .merge_positions(&request)
            .await
            .map_err(|e| EngineError::Transient(format!("merge failed: {e}")))?;

        info!(%market_slug, tx = %resp.transaction_hash, "auto-merge submitted");
        Ok(TxRef {
            transaction_hash: resp.transaction_hash.to_string(),
            block_number: resp.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    pub struct MockSettlementClient {
        pub calls: Mutex<Vec<(String, u64)>>,
        pub should_fail: bool,
    }

    impl MockSettlementClient {
        pub fn new(should_fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                should_fail,
            }
        }
    }

    #[async_trait]
    impl SettlementClient for MockSettlementClient {
        async fn auto_merge(&self, market_slug: &str, _condition_id_hex: &str, shares_pips: u64) -> EngineResult<TxRef> {
            self.calls.lock().unwrap().push((market_slug.to_string(), shares_pips));
            if self.should_fail {
                return Err(EngineError::Transient("mock merge failure".to_string()));
            }
            Ok(TxRef {
                transaction_hash: "0xmock".to_string(),
                block_number: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_mock_settlement_records_call() {
        let client = MockSettlementClient::new(false);
        let tx = client.auto_merge("btc-updown-15m-1700000000", "0xabc", 500).await.unwrap();
        assert_eq!(tx.block_number, 1);
        assert_eq!(client.calls.lock().unwrap()[0].1, 500);
    }

    #[tokio::test]
    async fn test_mock_settlement_propagates_failure() {
        let client = MockSettlementClient::new(true);
        let result = client.auto_merge("m", "0xabc", 500).await;
        assert!(result.is_err());
    }
}

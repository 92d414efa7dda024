use std::str::FromStr;

use async_trait::async_trait;
use tracing::{error, info, warn};

use polymarket_client_sdk::auth::{LocalSigner, Signer};
use polymarket_client_sdk::clob::types::{OrderType as ClobOrderType, Side as ClobSide, SignatureType};
use polymarket_client_sdk::clob::{Client as ClobClient, Config as ClobConfig};
use polymarket_client_sdk::types::{Decimal, U256};
use polymarket_client_sdk::POLYGON;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::types::{Order, OrderKind, OrderSide, OrderStatus, TokenType};

use super::ExchangeClient;

pub struct ClobCredentials {
    pub private_key: String,
    pub signature_type: u8,
    pub funder_address: Option<String>,
}

/// Live execution against the Polymarket CLOB. Token ids for UP/DOWN are
/// resolved by the caller per market and threaded through `place_order` via
/// `Order::market_slug` lookups done by the strategy layer before an order
/// reaches the OMS; this client only needs the asset id passed in
/// `token_id_for`.
pub struct ClobExchange {
    client: ClobClient,
    signer: LocalSigner,
    tick_decimals: usize,
    token_ids: std::collections::HashMap<(String, TokenTypeKey), String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum TokenTypeKey {
    Up,
    Down,
}

impl From<TokenType> for TokenTypeKey {
    fn from(t: TokenType) -> Self {
        match t {
            TokenType::Up => TokenTypeKey::Up,
            TokenType::Down => TokenTypeKey::Down,
        }
    }
}

impl ClobExchange {
    pub async fn connect(creds: ClobCredentials, tick_size: f64) -> EngineResult<Self> {
        let signer = LocalSigner::from_str(&creds.private_key)
            .map_err(|e| EngineError::Configuration(format!("invalid private key: {e}")))?
            .with_chain_id(Some(POLYGON));

        let sig_type = match creds.signature_type {
            1 => SignatureType::Proxy,
            2 => SignatureType::GnosisSafe,
            _ => SignatureType::Eoa,
        };

        let mut builder = ClobClient::new("https://clob.polymarket.com", ClobConfig::default())
            .map_err(|e| EngineError::Configuration(format!("clob client init: {e}")))?
            .authentication_builder(&signer)
            .signature_type(sig_type);

        if let Some(funder) = &creds.funder_address {
            let addr = funder
                .parse()
                .map_err(|_| EngineError::Configuration("invalid funder address".to_string()))?;
            builder = builder.funder(addr);
        }

        let client = builder
            .authenticate()
            .await
            .map_err(|e| EngineError::Configuration(format!("clob authentication failed: {e}")))?;

        info!(address = %client.address(), "clob client authenticated");

        let tick_decimals = if tick_size >= 0.1 {
            1
        } else if tick_size >= 0.01 {
            2
        } else if tick_size >= 0.001 {
            3
        } else {
            4
        };

        Ok(Self {
            client,
            signer,
            tick_decimals,
            token_ids: std::collections::HashMap::new(),
        })
    }

    pub fn register_market(&mut self, market_slug: &str, up_asset_id: String, down_asset_id: String) {
        self.token_ids
            .insert((market_slug.to_string(), TokenTypeKey::Up), up_asset_id);
        self.token_ids
            .insert((market_slug.to_string(), TokenTypeKey::Down), down_asset_id);
    }

    fn token_id_for(&self, market_slug: &str, token_type: TokenType) -> EngineResult<&str> {
        self.token_ids
            .get(&(market_slug.to_string(), token_type.into()))
            .map(|s| s.as_str())
            .ok_or_else(|| EngineError::Configuration(format!("no token id registered for {market_slug}")))
    }
}

#[async_trait]
impl ExchangeClient for ClobExchange {
    async fn place_order(&self, order: Order) -> EngineResult<Order> {
        let token_id_str = self.token_id_for(&order.market_slug, order.token_type)?;
        let token_id = U256::from_str(token_id_str)
            .map_err(|e| EngineError::Rejected(format!("bad token_id: {e}")))?;

        let price_str = format!("{:.prec$}", order.price.to_decimal(), prec = self.tick_decimals);
        let price_dec = Decimal::from_str(&price_str)
            .map_err(|e| EngineError::Rejected(format!("bad price: {e}")))?;

        let size_str = format!("{:.2}", order.size);
        let size_dec = Decimal::from_str(&size_str)
            .map_err(|e| EngineError::Rejected(format!("bad size: {e}")))?;

        let side = match order.side {
            OrderSide::Buy => ClobSide::Buy,
            OrderSide::Sell => ClobSide::Sell,
        };
        let order_type = match order.kind {
            OrderKind::Gtc => ClobOrderType::GTC,
            OrderKind::Fak => ClobOrderType::FOK,
        };

        let signable = self
            .client
            .limit_order()
            .token_id(token_id)
            .price(price_dec)
            .size(size_dec)
            .side(side)
            .order_type(order_type)
            .build()
            .await
            .map_err(|e| EngineError::Transient(format!("build: {e}")))?;

        let signed = self
            .client
            .sign(&self.signer, signable)
            .await
            .map_err(|e| EngineError::Transient(format!("sign: {e}")))?;

        let resp = self
            .client
            .post_order(signed)
            .await
            .map_err(|e| EngineError::Transient(format!("post: {e}")))?;

        if !resp.success {
            let msg = resp.error_msg.unwrap_or_else(|| "unknown error".to_string());
            warn!(order_id = order.id, %msg, "order rejected by clob");
            return Err(EngineError::Rejected(msg));
        }

        let mut acked = order;
        acked.status = OrderStatus::Open;
        Ok(acked)
    }

    async fn cancel_order(&self, order_id: u64) -> EngineResult<()> {
        self.client
            .cancel_order(&order_id.to_string())
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "cancel failed");
                EngineError::Transient(format!("cancel: {e}"))
            })?;
        Ok(())
    }

    async fn cancel_orders_for_market(&self, market_slug: &str) -> EngineResult<()> {
        let up = self.token_id_for(market_slug, TokenType::Up)?;
        let down = self.token_id_for(market_slug, TokenType::Down)?;
        for token in [up, down] {
            self.client
                .cancel_market_orders(token)
                .await
                .map_err(|e| EngineError::Transient(format!("cancel_all: {e}")))?;
        }
        Ok(())
    }
}

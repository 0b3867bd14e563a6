use crate::{
    account::Account,
    client::{ExecutionClient, OrderAck},
    error::{ExecutionError, VenueRejectKind},
    map::{OrderIdMap, Reservation},
    order::{Order, OrderKind, OrderRequest, TimeInForce, id::ClientOrderId, id::OrderId},
    position::Position,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use vela_instrument::{Side, exchange::ExchangeId, pair::TradingPair};

/// Hyperliquid REST action endpoint, mainnet.
pub const BASE_URL_API: &str = "https://api.hyperliquid.xyz";

/// Hyperliquid REST action endpoint, testnet.
pub const BASE_URL_API_TESTNET: &str = "https://api.hyperliquid-testnet.xyz";

/// Default REST submission timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Signature over an action payload, produced by an external signer.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct ActionSignature {
    pub r: String,
    pub s: String,
    pub v: u8,
}

/// Opaque venue payload signer. The execution client never holds private
/// keys; signing (EIP-712 for Hyperliquid) is delegated to this collaborator.
pub trait ActionSigner: Send + Sync {
    fn sign(
        &self,
        action: &Value,
        nonce: u64,
        vault_address: Option<&str>,
    ) -> Result<ActionSignature, ExecutionError>;
}

/// Hyperliquid execution client: signed JSON actions over HTTPS POST, plus
/// unsigned `/info` queries for order/position/account state.
pub struct HyperliquidExecutionClient {
    http: reqwest::Client,
    base_url: String,
    exchange: ExchangeId,
    signer: Arc<dyn ActionSigner>,
    /// Address whose state the `/info` queries read.
    user_address: String,
    vault_address: Option<String>,
    ids: Mutex<OrderIdMap>,
    open_orders: Mutex<Vec<ClientOrderId>>,
}

impl std::fmt::Debug for HyperliquidExecutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperliquidExecutionClient")
            .field("base_url", &self.base_url)
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl HyperliquidExecutionClient {
    pub fn new(
        signer: Arc<dyn ActionSigner>,
        user_address: String,
        vault_address: Option<String>,
        testnet: bool,
    ) -> Result<Self, ExecutionError> {
        let (base_url, exchange) = if testnet {
            (BASE_URL_API_TESTNET.to_string(), ExchangeId::HyperliquidTestnet)
        } else {
            (BASE_URL_API.to_string(), ExchangeId::Hyperliquid)
        };

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(vela_integration::error::SocketError::from)?;

        Ok(Self {
            http,
            base_url,
            exchange,
            signer,
            user_address,
            vault_address,
            ids: Mutex::new(OrderIdMap::new()),
            open_orders: Mutex::new(Vec::new()),
        })
    }

    async fn post_info(&self, query: Value) -> Result<Value, ExecutionError> {
        let response = self
            .http
            .post(format!("{}/info", self.base_url))
            .json(&query)
            .send()
            .await
            .map_err(vela_integration::error::SocketError::from)?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(vela_integration::error::SocketError::from)?;

        if !status.is_success() {
            return Err(ExecutionError::Socket(
                vela_integration::error::SocketError::HttpResponse(status, payload.to_string()),
            ));
        }
        Ok(payload)
    }

    async fn post_action(&self, action: Value) -> Result<Value, ExecutionError> {
        let nonce = Utc::now().timestamp_millis() as u64;
        let signature = self
            .signer
            .sign(&action, nonce, self.vault_address.as_deref())?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": { "r": signature.r, "s": signature.s, "v": signature.v },
            "vaultAddress": self.vault_address,
        });

        let response = self
            .http
            .post(format!("{}/exchange", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ExecutionError::Timeout {
                        timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    ExecutionError::Socket(error.into())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(vela_integration::error::SocketError::from)?;

        if !status.is_success() {
            return Err(ExecutionError::Socket(
                vela_integration::error::SocketError::HttpResponse(status, payload.to_string()),
            ));
        }
        Ok(payload)
    }

    fn order_action(&self, request: &OrderRequest) -> Value {
        json!({
            "type": "order",
            "orders": [{
                "coin": request.pair.base(),
                "is_buy": request.side == Side::Buy,
                "sz": request.quantity.to_string(),
                "limit_px": request.price.map(|price| price.to_string()),
                "order_type": order_type_field(request),
                "reduce_only": request.reduce_only,
                "cloid": request.client_id.to_string(),
            }],
            "grouping": "na",
        })
    }
}

fn order_type_field(request: &OrderRequest) -> Value {
    match request.kind {
        OrderKind::Market => json!({ "market": {} }),
        OrderKind::Limit => json!({ "limit": { "tif": tif_field(request.time_in_force) } }),
        OrderKind::Stop => json!({ "trigger": { "isMarket": true, "tpsl": "sl" } }),
        OrderKind::TakeProfit => json!({ "trigger": { "isMarket": true, "tpsl": "tp" } }),
    }
}

fn tif_field(time_in_force: TimeInForce) -> &'static str {
    match time_in_force {
        TimeInForce::GoodUntilCancelled => "Gtc",
        TimeInForce::ImmediateOrCancel => "Ioc",
        TimeInForce::FillOrKill => "Fok",
        TimeInForce::PostOnly => "Alo",
    }
}

/// Venue response to an order action.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    status: String,
    #[serde(default)]
    response: Option<ActionResponseBody>,
}

#[derive(Debug, Deserialize)]
struct ActionResponseBody {
    #[serde(default)]
    data: Option<ActionResponseData>,
}

#[derive(Debug, Deserialize)]
struct ActionResponseData {
    #[serde(default)]
    statuses: Vec<OrderActionStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OrderActionStatus {
    Resting { oid: u64 },
    Filled { oid: u64 },
    Error(String),
}

fn parse_submit_response(
    payload: &Value,
    client_id: &ClientOrderId,
) -> Result<OrderId, ExecutionError> {
    let response: ActionResponse =
        serde_json::from_value(payload.clone()).map_err(|error| {
            ExecutionError::Socket(vela_integration::error::SocketError::Deserialise {
                error,
                payload: payload.to_string(),
            })
        })?;

    if response.status != "ok" {
        return Err(ExecutionError::VenueReject {
            client_id: client_id.clone(),
            kind: VenueRejectKind::Other,
            reason: payload.to_string(),
        });
    }

    let status = response
        .response
        .and_then(|body| body.data)
        .and_then(|data| data.statuses.into_iter().next());

    match status {
        Some(OrderActionStatus::Resting { oid }) | Some(OrderActionStatus::Filled { oid }) => {
            Ok(OrderId::new(oid.to_string()))
        }
        Some(OrderActionStatus::Error(reason)) => Err(ExecutionError::VenueReject {
            client_id: client_id.clone(),
            kind: VenueRejectKind::classify(&reason),
            reason,
        }),
        None => Err(ExecutionError::VenueReject {
            client_id: client_id.clone(),
            kind: VenueRejectKind::Other,
            reason: "order action returned no status".to_string(),
        }),
    }
}

#[async_trait]
impl ExecutionClient for HyperliquidExecutionClient {
    fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    async fn submit(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError> {
        // Idempotency: a retried client id never reaches the venue twice.
        match self.ids.lock().check_or_reserve(&request.client_id) {
            Reservation::New => {}
            Reservation::InFlight => {
                debug!(client_id = %request.client_id, "submission already in flight");
                return Err(ExecutionError::VenueReject {
                    client_id: request.client_id,
                    kind: VenueRejectKind::Other,
                    reason: "submission already in flight".to_string(),
                });
            }
            Reservation::Known(exchange_id) => {
                debug!(client_id = %request.client_id, %exchange_id, "duplicate submission short-circuited");
                return Ok(OrderAck::new(request.client_id, exchange_id, Utc::now()));
            }
        }

        let action = self.order_action(&request);
        let result = self.post_action(action).await.and_then(|payload| {
            parse_submit_response(&payload, &request.client_id)
        });

        match result {
            Ok(exchange_id) => {
                self.ids.lock().confirm(&request.client_id, exchange_id.clone());
                self.open_orders.lock().push(request.client_id.clone());
                Ok(OrderAck::new(request.client_id, exchange_id, Utc::now()))
            }
            Err(error) => {
                // A timeout leaves the reservation in place: the venue may
                // have seen the order, so the user stream must reconcile
                // before this client id is reused.
                if !matches!(error, ExecutionError::Timeout { .. }) {
                    self.ids.lock().release(&request.client_id);
                }
                warn!(client_id = %request.client_id, %error, "order submission failed");
                Err(error)
            }
        }
    }

    async fn cancel(&self, client_id: &ClientOrderId) -> Result<bool, ExecutionError> {
        if self.ids.lock().exchange_id(client_id).is_none() {
            return Ok(false);
        }

        let action = json!({
            "type": "cancelByCloid",
            "cancels": [{ "cloid": client_id.to_string() }],
        });
        let payload = self.post_action(action).await?;
        let cancelled = payload
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|status| status == "ok");

        if cancelled {
            self.open_orders.lock().retain(|open| open != client_id);
        }
        Ok(cancelled)
    }

    async fn cancel_all(&self) -> Result<usize, ExecutionError> {
        let open = self.open_orders.lock().clone();
        let mut cancelled = 0;
        for client_id in open {
            if self.cancel(&client_id).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn order_status(
        &self,
        client_id: &ClientOrderId,
    ) -> Result<Option<Order>, ExecutionError> {
        // Authoritative lifecycle state arrives on the user stream; the REST
        // surface exposes resting orders only.
        let payload = self
            .post_info(json!({ "type": "openOrders", "user": self.user_address }))
            .await?;

        let Some(entries) = payload.as_array() else {
            return Ok(None);
        };

        let open = entries.iter().find(|entry| {
            entry
                .get("cloid")
                .and_then(Value::as_str)
                .is_some_and(|cloid| cloid == client_id.to_string())
        });
        let Some(open) = open else {
            return Ok(None);
        };

        let request = OrderRequest {
            client_id: client_id.clone(),
            strategy: crate::order::id::StrategyId::unknown(),
            pair: TradingPair::new(
                open.get("coin").and_then(Value::as_str).unwrap_or_default(),
                "USDC",
            ),
            side: if open.get("side").and_then(Value::as_str) == Some("B") {
                Side::Buy
            } else {
                Side::Sell
            },
            kind: OrderKind::Limit,
            quantity: parse_venue_decimal(open.get("sz"))?,
            price: Some(parse_venue_decimal(open.get("limitPx"))?),
            time_in_force: TimeInForce::GoodUntilCancelled,
            reduce_only: false,
        };

        let mut order = Order::from_request(request, Utc::now());
        order.exchange_id = open
            .get("oid")
            .and_then(Value::as_u64)
            .map(|oid| OrderId::new(oid.to_string()));
        order.transition(crate::order::OrderStatus::Submitted, Utc::now())?;
        order.transition(crate::order::OrderStatus::Accepted, Utc::now())?;
        Ok(Some(order))
    }

    async fn position(&self, pair: &TradingPair) -> Result<Option<Position>, ExecutionError> {
        let payload = self
            .post_info(json!({ "type": "clearinghouseState", "user": self.user_address }))
            .await?;

        let Some(entries) = payload.get("assetPositions").and_then(Value::as_array) else {
            return Ok(None);
        };

        let entry = entries.iter().filter_map(|entry| entry.get("position")).find(|position| {
            position.get("coin").and_then(Value::as_str) == Some(pair.base())
        });
        let Some(venue_position) = entry else {
            return Ok(None);
        };

        let mut position = Position::flat(pair.clone(), Utc::now());
        position.size = parse_venue_decimal(venue_position.get("szi"))?;
        position.entry_price = parse_venue_decimal(venue_position.get("entryPx"))?;
        position.unrealized_pnl = parse_venue_decimal(venue_position.get("unrealizedPnl"))?;
        Ok(Some(position))
    }

    async fn account(&self) -> Result<Account, ExecutionError> {
        let payload = self
            .post_info(json!({ "type": "clearinghouseState", "user": self.user_address }))
            .await?;

        let summary = payload.get("marginSummary").unwrap_or(&Value::Null);
        let equity = parse_venue_decimal(summary.get("accountValue"))?;
        let margin_used = parse_venue_decimal(summary.get("totalMarginUsed"))?;
        let withdrawable = parse_venue_decimal(payload.get("withdrawable"))?;

        let total_unrealized = payload
            .get("assetPositions")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("position"))
                    .filter_map(|position| parse_venue_decimal(position.get("unrealizedPnl")).ok())
                    .sum::<rust_decimal::Decimal>()
            })
            .unwrap_or_default();

        let mut account = Account::new(equity - total_unrealized, Utc::now());
        account.set_total_unrealized(total_unrealized, Utc::now());
        account.set_margin_used(margin_used, Utc::now());
        account.available_balance = withdrawable;
        Ok(account)
    }
}

fn parse_venue_decimal(value: Option<&Value>) -> Result<rust_decimal::Decimal, ExecutionError> {
    match value {
        None | Some(Value::Null) => Ok(rust_decimal::Decimal::ZERO),
        Some(value) => {
            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            vela_instrument::decimal::parse(&text).map_err(|error| {
                ExecutionError::Socket(vela_integration::error::SocketError::Exchange(
                    error.to_string(),
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::id::StrategyId;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            client_id: ClientOrderId::new("cloid-1"),
            strategy: StrategyId::new("test"),
            pair: TradingPair::new("ETH", "USDC"),
            side: Side::Buy,
            kind: OrderKind::Limit,
            quantity: dec!(1.5),
            price: Some(dec!(2000)),
            time_in_force: TimeInForce::PostOnly,
            reduce_only: false,
        }
    }

    #[derive(Debug)]
    struct NoopSigner;

    impl ActionSigner for NoopSigner {
        fn sign(
            &self,
            _action: &Value,
            _nonce: u64,
            _vault_address: Option<&str>,
        ) -> Result<ActionSignature, ExecutionError> {
            Ok(ActionSignature {
                r: "0x0".into(),
                s: "0x0".into(),
                v: 27,
            })
        }
    }

    #[test]
    fn test_order_action_shape() {
        let client = HyperliquidExecutionClient::new(
            Arc::new(NoopSigner),
            "0xuser".to_string(),
            None,
            true,
        )
        .unwrap();
        let action = client.order_action(&request());

        assert_eq!(action["type"], "order");
        let order = &action["orders"][0];
        assert_eq!(order["coin"], "ETH");
        assert_eq!(order["is_buy"], true);
        assert_eq!(order["sz"], "1.5");
        assert_eq!(order["limit_px"], "2000");
        assert_eq!(order["order_type"]["limit"]["tif"], "Alo");
        assert_eq!(order["cloid"], "cloid-1");
    }

    #[test]
    fn test_parse_submit_response_variants() {
        let client_id = ClientOrderId::new("cloid-1");

        let resting = json!({
            "status": "ok",
            "response": { "data": { "statuses": [{ "resting": { "oid": 77 } }] } }
        });
        assert_eq!(
            parse_submit_response(&resting, &client_id).unwrap(),
            OrderId::new("77")
        );

        let rejected = json!({
            "status": "ok",
            "response": { "data": { "statuses": [{ "error": "Insufficient margin" }] } }
        });
        let error = parse_submit_response(&rejected, &client_id).unwrap_err();
        assert!(matches!(
            error,
            ExecutionError::VenueReject {
                kind: VenueRejectKind::InsufficientBalance,
                ..
            }
        ));
    }
}

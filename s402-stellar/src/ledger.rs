//! Narrow adapter over the Stellar network endpoints.
//!
//! [`LedgerOps`] is the only capability the rest of the stack sees:
//! account lookup, current ledger sequence, simulation, submission, and
//! confirmation polling. [`HttpLedger`] implements it over Horizon (account
//! state and history) and Soroban RPC (everything transactional).

use serde::{Deserialize, Serialize};
use stellar_xdr::curr::{AlphaNum12, AlphaNum4, Asset, AssetCode12, AssetCode4};

use s402_proto::amount::decimal_to_atomic;
use s402_proto::Network;

use crate::tx;

/// Errors from ledger endpoints.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport-level HTTP failure.
    #[error("ledger transport error: {0}")]
    Http(String),

    /// The RPC endpoint returned a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// Horizon returned an unexpected status or body.
    #[error("horizon error: {0}")]
    Horizon(String),

    /// A response did not parse into the expected shape.
    #[error("malformed ledger response: {0}")]
    Parse(String),
}

/// A trust line of an account, keyed by the asset's contract id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustLine {
    /// Stellar Asset Contract id of the trusted asset (`C...`).
    pub asset_contract: String,
    /// Current balance in the asset's smallest unit.
    pub balance: i128,
}

/// Ledger state of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    /// The account id (`G...`).
    pub account_id: String,
    /// Current sequence number.
    pub sequence: i64,
    /// Native balance in stroops.
    pub native_balance: i128,
    /// Trust lines held by the account.
    pub trust_lines: Vec<TrustLine>,
}

impl AccountEntry {
    /// Balance of an asset identified by contract id, if a trust line exists.
    #[must_use]
    pub fn trust_line_balance(&self, asset_contract: &str) -> Option<i128> {
        self.trust_lines
            .iter()
            .find(|line| line.asset_contract == asset_contract)
            .map(|line| line.balance)
    }
}

/// Output of transaction simulation.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    /// Base64 `SorobanTransactionData` for the transaction extension.
    pub transaction_data: Option<String>,
    /// Minimum resource fee in stroops.
    pub min_resource_fee: Option<String>,
    /// Base64 authorization entries required by the invocation.
    pub auth: Vec<String>,
    /// Simulation failure, if any.
    pub error: Option<String>,
}

/// Outcome of submitting a transaction envelope.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Hex hash the network assigned to the submission.
    pub hash: String,
    /// Whether the submission was accepted into the queue.
    pub accepted: bool,
    /// Error detail when not accepted.
    pub error: Option<String>,
}

/// Confirmation state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Applied successfully.
    Success,
    /// Applied and failed; carries the result XDR or status string.
    Failed(String),
    /// Not (yet) known to the network.
    NotFound,
    /// Known but not yet final.
    Pending,
}

/// The ledger capability used by the payment builder and the facilitator.
#[async_trait::async_trait]
pub trait LedgerOps: Send + Sync {
    /// Loads an account's sequence, balances, and trust lines.
    /// Returns `None` if the account does not exist.
    async fn account(&self, account_id: &str) -> Result<Option<AccountEntry>, LedgerError>;

    /// Current ledger sequence number.
    async fn latest_ledger(&self) -> Result<u32, LedgerError>;

    /// Simulates a transaction envelope.
    async fn simulate(&self, envelope_xdr: &str) -> Result<Simulation, LedgerError>;

    /// Submits a transaction envelope.
    async fn submit(&self, envelope_xdr: &str) -> Result<SubmitOutcome, LedgerError>;

    /// Polls the confirmation state of a transaction by hex hash.
    async fn transaction_status(&self, hash: &str) -> Result<TxStatus, LedgerError>;
}

/// [`LedgerOps`] over Horizon and Soroban RPC.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    network: Network,
    horizon_url: String,
    soroban_url: String,
}

impl HttpLedger {
    /// Creates an adapter using the network's default endpoints.
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self::with_urls(
            network,
            network.horizon_url().to_owned(),
            network.soroban_rpc_url().to_owned(),
        )
    }

    /// Creates an adapter with explicit endpoint URLs.
    #[must_use]
    pub fn with_urls(network: Network, horizon_url: String, soroban_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            network,
            horizon_url: horizon_url.trim_end_matches('/').to_owned(),
            soroban_url,
        }
    }

    /// The network this adapter talks to.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    async fn rpc<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        params: Option<P>,
    ) -> Result<R, LedgerError> {
        #[derive(Serialize)]
        struct RpcRequest<T: Serialize> {
            jsonrpc: &'static str,
            id: u64,
            method: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            params: Option<T>,
        }

        #[derive(Deserialize)]
        struct RpcResponse<T> {
            result: Option<T>,
            error: Option<RpcError>,
        }

        #[derive(Deserialize)]
        struct RpcError {
            code: i64,
            message: String,
        }

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.soroban_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        let parsed: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| LedgerError::Parse("empty RPC result".to_owned()))
    }
}

/// Horizon's account representation, reduced to what the adapter needs.
#[derive(Debug, Deserialize)]
struct HorizonAccount {
    sequence: String,
    #[serde(default)]
    balances: Vec<HorizonBalance>,
}

#[derive(Debug, Deserialize)]
struct HorizonBalance {
    balance: String,
    asset_type: String,
    #[serde(default)]
    asset_code: Option<String>,
    #[serde(default)]
    asset_issuer: Option<String>,
}

impl HorizonBalance {
    /// Reconstructs the classic asset, if this is a credit balance.
    fn classic_asset(&self) -> Option<Asset> {
        let code = self.asset_code.as_deref()?;
        let issuer = tx::account_id(self.asset_issuer.as_deref()?).ok()?;
        match self.asset_type.as_str() {
            "credit_alphanum4" if code.len() <= 4 => {
                let mut bytes = [0u8; 4];
                bytes[..code.len()].copy_from_slice(code.as_bytes());
                Some(Asset::CreditAlphanum4(AlphaNum4 {
                    asset_code: AssetCode4(bytes),
                    issuer,
                }))
            }
            "credit_alphanum12" if code.len() <= 12 => {
                let mut bytes = [0u8; 12];
                bytes[..code.len()].copy_from_slice(code.as_bytes());
                Some(Asset::CreditAlphanum12(AlphaNum12 {
                    asset_code: AssetCode12(bytes),
                    issuer,
                }))
            }
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl LedgerOps for HttpLedger {
    async fn account(&self, account_id: &str) -> Result<Option<AccountEntry>, LedgerError> {
        let url = format!("{}/accounts/{account_id}", self.horizon_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Horizon(format!(
                "account fetch returned {}",
                response.status()
            )));
        }

        let account: HorizonAccount = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;

        let sequence = account
            .sequence
            .parse::<i64>()
            .map_err(|e| LedgerError::Parse(format!("sequence: {e}")))?;

        let mut native_balance = 0_i128;
        let mut trust_lines = Vec::new();
        for entry in &account.balances {
            // Horizon renders balances with 7 decimal places.
            let atomic = decimal_to_atomic(&entry.balance, 7)
                .map_err(|e| LedgerError::Parse(format!("balance: {e}")))?;
            if entry.asset_type == "native" {
                native_balance = atomic;
            } else if let Some(asset) = entry.classic_asset() {
                trust_lines.push(TrustLine {
                    asset_contract: tx::asset_contract_id(&asset, self.network),
                    balance: atomic,
                });
            }
        }

        Ok(Some(AccountEntry {
            account_id: account_id.to_owned(),
            sequence,
            native_balance,
            trust_lines,
        }))
    }

    async fn latest_ledger(&self) -> Result<u32, LedgerError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct LatestLedger {
            sequence: u32,
        }

        let result: LatestLedger = self.rpc::<(), _>("getLatestLedger", None).await?;
        Ok(result.sequence)
    }

    async fn simulate(&self, envelope_xdr: &str) -> Result<Simulation, LedgerError> {
        #[derive(Serialize)]
        struct Params<'a> {
            transaction: &'a str,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SimulateResult {
            transaction_data: Option<String>,
            min_resource_fee: Option<String>,
            error: Option<String>,
            #[serde(default)]
            results: Vec<SimulateHostFunctionResult>,
        }

        #[derive(Deserialize)]
        struct SimulateHostFunctionResult {
            #[serde(default)]
            auth: Option<Vec<String>>,
        }

        let result: SimulateResult = self
            .rpc(
                "simulateTransaction",
                Some(Params {
                    transaction: envelope_xdr,
                }),
            )
            .await?;

        Ok(Simulation {
            transaction_data: result.transaction_data,
            min_resource_fee: result.min_resource_fee,
            auth: result
                .results
                .into_iter()
                .filter_map(|r| r.auth)
                .flatten()
                .collect(),
            error: result.error,
        })
    }

    async fn submit(&self, envelope_xdr: &str) -> Result<SubmitOutcome, LedgerError> {
        #[derive(Serialize)]
        struct Params<'a> {
            transaction: &'a str,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SendResult {
            status: String,
            hash: String,
            error_result_xdr: Option<String>,
        }

        let result: SendResult = self
            .rpc(
                "sendTransaction",
                Some(Params {
                    transaction: envelope_xdr,
                }),
            )
            .await?;

        let accepted = result.status != "ERROR";
        Ok(SubmitOutcome {
            hash: result.hash,
            accepted,
            error: if accepted { None } else { result.error_result_xdr },
        })
    }

    async fn transaction_status(&self, hash: &str) -> Result<TxStatus, LedgerError> {
        #[derive(Serialize)]
        struct Params<'a> {
            hash: &'a str,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct GetTransactionResult {
            status: String,
            result_xdr: Option<String>,
        }

        let result: GetTransactionResult =
            self.rpc("getTransaction", Some(Params { hash })).await?;

        Ok(match result.status.as_str() {
            "SUCCESS" => TxStatus::Success,
            "FAILED" => TxStatus::Failed(result.result_xdr.unwrap_or_else(|| "FAILED".to_owned())),
            "NOT_FOUND" => TxStatus::NotFound,
            _ => TxStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCOUNT: &str = "GDQNY3PBOJOKYZSRMK2S7LHHGWZIUISD4QORETLMXEWXBI7KFZZMKTL3";
    const ISSUER: &str = "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA";

    fn ledger(horizon: &str, soroban: &str) -> HttpLedger {
        HttpLedger::with_urls(
            Network::StellarTestnet,
            horizon.to_owned(),
            soroban.to_owned(),
        )
    }

    #[tokio::test]
    async fn parses_horizon_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts/{ACCOUNT}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sequence": "103720918407102567",
                "balances": [
                    {
                        "balance": "42.5000000",
                        "asset_type": "credit_alphanum4",
                        "asset_code": "USDC",
                        "asset_issuer": ISSUER,
                    },
                    { "balance": "100.0000000", "asset_type": "native" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = ledger(&server.uri(), &server.uri());
        let entry = adapter.account(ACCOUNT).await.unwrap().unwrap();

        assert_eq!(entry.sequence, 103_720_918_407_102_567);
        assert_eq!(entry.native_balance, 1_000_000_000);
        assert_eq!(entry.trust_lines.len(), 1);
        assert_eq!(entry.trust_lines[0].balance, 425_000_000);
        assert!(entry.trust_lines[0].asset_contract.starts_with('C'));
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = ledger(&server.uri(), &server.uri());
        assert!(adapter.account(ACCOUNT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_ledger_and_rpc_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getLatestLedger"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "sequence": 912_345, "id": "abc" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32600, "message": "bad request" }
            })))
            .mount(&server)
            .await;

        let adapter = ledger(&server.uri(), &server.uri());
        assert_eq!(adapter.latest_ledger().await.unwrap(), 912_345);
        assert!(matches!(
            adapter.transaction_status("00").await,
            Err(LedgerError::Rpc { code: -32600, .. })
        ));
    }

    #[tokio::test]
    async fn submit_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "status": "ERROR",
                    "hash": "deadbeef",
                    "latestLedger": 1,
                    "errorResultXdr": "AAAA"
                }
            })))
            .mount(&server)
            .await;

        let adapter = ledger(&server.uri(), &server.uri());
        let outcome = adapter.submit("AAAA").await.unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.error.as_deref(), Some("AAAA"));
    }
}

//! Typed endpoints of the custodial wallet API

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::{ApiResponse, RetryPolicy, RetryingClient};
use crate::error::{Error, Result};
use crate::wallet::TokenAsset;

pub const PATH_ACCOUNTS: &str = "/api/v5/wallet/account/accounts";
pub const PATH_TOTAL_VALUE: &str = "/api/v5/wallet/asset/total-value";
pub const PATH_TOKEN_BALANCES: &str = "/api/v5/wallet/asset/wallet-all-token-balances";
pub const PATH_CREATE_ACCOUNT: &str = "/api/v5/wallet/account/create-wallet-account";
pub const PATH_DELETE_ACCOUNT: &str = "/api/v5/wallet/account/delete-account";

/// One address registered under a chainIndex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEntry {
    pub address: String,
    pub chain_index: String,
}

impl AddressEntry {
    pub fn new(address: impl Into<String>, chain_index: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain_index: chain_index.into(),
        }
    }
}

pub struct WalletApi {
    client: RetryingClient,
}

impl WalletApi {
    pub fn new(client: RetryingClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RetryingClient {
        &self.client
    }

    /// Remote account ids, in the order the API lists them
    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.accounts_with_policy(self.client.policy()).await
    }

    pub async fn accounts_with_policy(&self, policy: RetryPolicy) -> Result<Vec<String>> {
        let response = self
            .client
            .get_with_policy(PATH_ACCOUNTS, &[], policy)
            .await?;

        let ids: Vec<String> = first_item(&response)
            .and_then(|item| item.get("accounts"))
            .and_then(Value::as_array)
            .map(|accounts| {
                accounts
                    .iter()
                    .filter_map(|a| a.get("accountId").and_then(Value::as_str))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        info!("Fetched {} remote accounts", ids.len());
        Ok(ids)
    }

    /// Total account value formatted to two decimals; `"0"` when the API has no data.
    ///
    /// A non-numeric `totalValue` is a `Parse` failure and is retried.
    pub async fn total_value(&self, account_id: &str) -> Result<String> {
        self.client
            .get_decoded(
                PATH_TOTAL_VALUE,
                &[("accountId", account_id)],
                self.client.policy(),
                |response| parse_total_value(account_id, &response),
            )
            .await
    }

    pub async fn token_balances(&self, account_id: &str) -> Result<Vec<TokenAsset>> {
        let response = self
            .client
            .get(PATH_TOKEN_BALANCES, &[("accountId", account_id)])
            .await?;

        match first_item(&response).and_then(|item| item.get("tokenAssets")) {
            Some(assets) => Ok(serde_json::from_value(assets.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Register `addresses` as one remote account and return its id.
    ///
    /// Single attempt: creation is not idempotent.
    pub async fn create_wallet_account(&self, addresses: &[AddressEntry]) -> Result<String> {
        let body = json!({ "addresses": addresses });
        let response = self.client.post(PATH_CREATE_ACCOUNT, Some(&body)).await?;

        first_item(&response)
            .and_then(|item| item.get("accountId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("No accountId in response: {}", response.data)))
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        let body = json!({ "accountId": account_id });
        self.client.post(PATH_DELETE_ACCOUNT, Some(&body)).await?;
        Ok(())
    }
}

fn first_item(response: &ApiResponse) -> Option<&Value> {
    response.data_items().first()
}

fn parse_total_value(account_id: &str, response: &ApiResponse) -> Result<String> {
    let Some(item) = first_item(response) else {
        debug!("No total value reported for {}", account_id);
        return Ok("0".to_string());
    };

    let value = item
        .get("totalValue")
        .and_then(number_like)
        .ok_or_else(|| {
            Error::Parse(format!(
                "totalValue missing or not numeric for {}: {}",
                account_id, item
            ))
        })?;

    Ok(format!("{:.2}", value))
}

fn number_like(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

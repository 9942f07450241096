use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Shown when the backend returns neither `awsAccountId` nor `accountId`.
pub const UNKNOWN_AWS_ACCOUNT_ID: &str = "Unknown";

/// Wrapper keys the accounts listing has been seen to use, in lookup order.
const ACCOUNT_LIST_KEYS: [&str; 3] = ["accounts", "data", "Items"];

/// IAM credentials submitted for validation and linking.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccountRequest {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub account_alias: String,
}

impl fmt::Debug for AwsAccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsAccountRequest")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("account_alias", &self.account_alias)
            .finish()
    }
}

/// Reply to validate/add and remove.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsAccountResponse {
    pub success: bool,
    pub message: String,
    pub account_id: Option<String>,
    pub account_alias: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Validating,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A linked AWS account.
///
/// `account_id` is CostGuard's identifier (used for removal);
/// `aws_account_id` is the 12-digit AWS account number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct AwsAccount {
    pub account_id: String,
    pub aws_account_id: String,
    pub account_alias: String,
    pub region: String,
    pub status: AccountStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl AwsAccount {
    /// Accept a bare array or one wrapped in `accounts`, `data` or `Items`.
    /// Any other shape is an empty listing.
    pub fn list_from_value(value: Value) -> Result<Vec<AwsAccount>, serde_json::Error> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => ACCOUNT_LIST_KEYS
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        items
            .into_iter()
            .map(|item| serde_json::from_value::<AwsAccount>(item).map(AwsAccount::with_aws_id_fallback))
            .collect()
    }

    fn with_aws_id_fallback(mut self) -> Self {
        if self.aws_account_id.is_empty() {
            self.aws_account_id = if self.account_id.is_empty() {
                UNKNOWN_AWS_ACCOUNT_ID.to_string()
            } else {
                self.account_id.clone()
            };
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_shapes() {
        let account = json!({ "accountId": "a1", "awsAccountId": "123456789012", "status": "active" });

        for body in [
            json!([account]),
            json!({ "accounts": [account] }),
            json!({ "data": [account] }),
            json!({ "Items": [account] }),
        ] {
            let accounts = AwsAccount::list_from_value(body).unwrap();
            assert_eq!(accounts.len(), 1);
            assert_eq!(accounts[0].aws_account_id, "123456789012");
            assert_eq!(accounts[0].status, AccountStatus::Active);
        }

        assert!(AwsAccount::list_from_value(json!({ "count": 0 })).unwrap().is_empty());
        assert!(AwsAccount::list_from_value(json!("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_aws_account_id_fallback() {
        let accounts = AwsAccount::list_from_value(json!([
            { "accountId": "a1" },
            { "accountAlias": "orphan" },
        ]))
        .unwrap();
        assert_eq!(accounts[0].aws_account_id, "a1");
        assert_eq!(accounts[1].aws_account_id, UNKNOWN_AWS_ACCOUNT_ID);
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let account: AwsAccount = serde_json::from_value(json!({ "status": "suspended" })).unwrap();
        assert_eq!(account.status, AccountStatus::Unknown);
    }

    #[test]
    fn test_request_debug_hides_secret() {
        let request = AwsAccountRequest {
            access_key_id: "AKIA123".into(),
            secret_access_key: "very-secret".into(),
            region: "us-east-1".into(),
            account_alias: "prod".into(),
        };
        let debug = format!("{request:?}");
        assert!(debug.contains("AKIA123"));
        assert!(!debug.contains("very-secret"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["secretAccessKey"], "very-secret");
        assert_eq!(json["accountAlias"], "prod");
    }
}

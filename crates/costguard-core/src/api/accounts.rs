//! Linked AWS accounts.
//!
//! A 401 from validate/list means the submitted AWS credentials were bad,
//! not that the CostGuard session died, so those calls never sign out.

use serde_json::Value;
use tracing::{debug, info};

use crate::models::{AwsAccount, AwsAccountRequest, AwsAccountResponse};

use super::{ApiClient, ApiError, AWS_ACCOUNTS, AWS_VALIDATE_ACCOUNT};

const ADD_FAILED: &str = "Failed to add AWS account";
const REMOVE_FAILED: &str = "Failed to remove AWS account";

/// Turn `success: false` into an error carrying the server's message.
fn accepted(response: AwsAccountResponse, fallback: &str) -> Result<AwsAccountResponse, ApiError> {
    if response.success {
        return Ok(response);
    }
    let message = if response.message.is_empty() {
        fallback.to_string()
    } else {
        response.message
    };
    Err(ApiError::Rejected(message))
}

impl ApiClient {
    /// Validate IAM credentials server-side and link the account.
    pub async fn validate_and_add_account(
        &self,
        request: &AwsAccountRequest,
    ) -> Result<AwsAccountResponse, ApiError> {
        info!(alias = %request.account_alias, region = %request.region, "Linking AWS account");
        let response: AwsAccountResponse = self.post(AWS_VALIDATE_ACCOUNT, request).await?;
        accepted(response, ADD_FAILED)
    }

    pub async fn list_accounts(&self) -> Result<Vec<AwsAccount>, ApiError> {
        let value: Value = self.get(AWS_ACCOUNTS).await?;
        let accounts = AwsAccount::list_from_value(value)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        debug!(count = accounts.len(), "Fetched AWS accounts");
        Ok(accounts)
    }

    /// Unlink by CostGuard account id (not the AWS account number).
    pub async fn remove_account(&self, account_id: &str) -> Result<AwsAccountResponse, ApiError> {
        info!(account_id, "Removing AWS account");
        let endpoint = format!("{}/{}", AWS_ACCOUNTS, account_id);
        let response: AwsAccountResponse = self.delete(&endpoint).await?;
        accepted(response, REMOVE_FAILED)
    }
}

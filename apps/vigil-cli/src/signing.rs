//! `sign` and `verify` commands.

use anyhow::{Context, bail};
use clap::Args;
use serde_json::json;

use vigil_core::domain::SignedRequest;
use vigil_core::ports::RequestSigner;
use vigil_infra::HmacRequestSigner;

/// Request fields covered by the signature.
#[derive(Debug, Clone, Args)]
pub struct RequestArgs {
    /// HTTP method
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request path, including the query string if it is signed
    #[arg(long)]
    pub path: String,

    /// Raw request body
    #[arg(long)]
    pub body: Option<String>,

    /// Signed header as `name=value` (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE")]
    pub headers: Vec<String>,

    /// Shared signing secret
    #[arg(long, env = "REQUEST_SIGNING_SECRET", hide_env_values = true)]
    pub secret: String,
}

impl RequestArgs {
    pub fn to_request(&self, timestamp: i64) -> anyhow::Result<SignedRequest> {
        let headers = self
            .headers
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .or_else(|| raw.split_once(':'))
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .with_context(|| format!("header '{raw}' is not NAME=VALUE"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(SignedRequest::from_parts(
            &self.method,
            &self.path,
            self.body.as_deref().map(str::as_bytes),
            timestamp,
            headers,
        ))
    }

    fn signer(&self) -> anyhow::Result<HmacRequestSigner> {
        HmacRequestSigner::new(self.secret.as_bytes()).context("invalid signing secret")
    }
}

/// Sign a request and print the headers to attach.
pub fn sign(args: &RequestArgs, timestamp: Option<i64>) -> anyhow::Result<serde_json::Value> {
    let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let request = args.to_request(timestamp)?;
    let signer = args.signer()?;

    let mut output = serde_json::Map::new();
    for (name, value) in signer.signature_headers(&request) {
        output.insert(name.to_string(), json!(value));
    }
    output.insert("canonical".to_string(), json!(request.canonical_string()));
    Ok(serde_json::Value::Object(output))
}

/// Verify a signature. Fails with the HTTP status the gateway would use.
pub fn verify(
    args: &RequestArgs,
    signature: &str,
    timestamp: i64,
    max_age_secs: i64,
) -> anyhow::Result<serde_json::Value> {
    let request = args.to_request(timestamp)?;
    let signer = args.signer()?;

    match signer.verify(signature, &request, max_age_secs) {
        Ok(()) => Ok(json!({ "valid": true })),
        Err(e) => {
            tracing::warn!(error = %e, path = %request.path, "Signature rejected");
            bail!("{} ({})", e, e.status_code())
        }
    }
}

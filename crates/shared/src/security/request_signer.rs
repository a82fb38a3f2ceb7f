use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A request body plus the headers a client must attach for the coordinator
/// to resolve its identity.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub address: String,
    pub signature: String,
    pub data: Option<Value>,
    pub nonce: String,
}

/// The exact byte string that gets signed: the request path followed by the
/// JSON body with its keys in sorted order.
pub fn signing_message(path: &str, body: Option<&Value>) -> Result<String> {
    match body {
        Some(value) => Ok(format!("{path}{}", serde_json::to_string(&sorted(value))?)),
        None => Ok(path.to_string()),
    }
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in ordered {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

pub fn sign_message(message: &str, signer: &PrivateKeySigner) -> Result<String> {
    let signature = signer.sign_message_sync(message.as_bytes())?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

/// Signs `path` + body, injecting a fresh `nonce` and `timestamp` so the
/// request cannot be replayed. A missing body becomes an object holding just
/// those two fields; non-object bodies cannot carry them and are rejected.
pub fn sign_request_with_nonce(
    path: &str,
    signer: &PrivateKeySigner,
    body: Option<&Value>,
) -> Result<SignedRequest> {
    let nonce = Uuid::new_v4().to_string();
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let mut map = match body {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => anyhow::bail!("signed request bodies must be JSON objects"),
        None => serde_json::Map::new(),
    };
    map.insert("nonce".to_string(), Value::String(nonce.clone()));
    map.insert("timestamp".to_string(), Value::from(timestamp));
    let data = Some(Value::Object(map));

    let message = signing_message(path, data.as_ref())?;
    let signature = sign_message(&message, signer)?;

    Ok(SignedRequest {
        address: signer.address().to_string(),
        signature,
        data,
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::Signature;
    use std::str::FromStr;

    #[test]
    fn test_signature_recovers_signer_address() {
        let signer = PrivateKeySigner::random();
        let body = serde_json::json!({"b": 1, "a": "x"});
        let signed = sign_request_with_nonce("/jobs", &signer, Some(&body)).unwrap();

        let message = signing_message("/jobs", signed.data.as_ref()).unwrap();
        let signature =
            Signature::from_str(signed.signature.trim_start_matches("0x")).unwrap();
        let recovered = signature.recover_address_from_msg(message).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_bodiless_request_carries_nonce_and_timestamp() {
        let signer = PrivateKeySigner::random();
        let signed = sign_request_with_nonce("/jobs/job-1/heartbeat", &signer, None).unwrap();
        let data = signed.data.unwrap();
        assert_eq!(data["nonce"], signed.nonce.as_str());
        assert!(data["timestamp"].as_u64().is_some());

        assert!(sign_request_with_nonce("/jobs", &signer, Some(&serde_json::json!([1]))).is_err());
    }

    #[test]
    fn test_signing_message_sorts_keys() {
        let body = serde_json::json!({"zeta": 1, "alpha": 2});
        let message = signing_message("/workers", Some(&body)).unwrap();
        assert_eq!(message, r#"/workers{"alpha":2,"zeta":1}"#);
    }
}

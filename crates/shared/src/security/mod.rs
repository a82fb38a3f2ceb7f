pub mod api_key;
pub mod caller;
pub mod request_signer;

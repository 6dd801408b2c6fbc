use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::config;
use crate::types::push::VapidConfig;

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub(crate) enum VapidConfigStatus {
    Missing,
    Incomplete,
    Invalid(&'static str),
    Ready(VapidConfig),
}

pub(crate) fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = config.vapid_private_key.as_deref().map(str::trim);
    let public_key = config.vapid_public_key.as_deref().map(str::trim);
    let subject = config.vapid_subject.as_deref().map(str::trim);
    let has_any = private_key.is_some() || public_key.is_some() || subject.is_some();

    match (private_key, public_key, subject) {
        (Some(private_key), Some(public_key), Some(subject)) => {
            if private_key.is_empty() || public_key.is_empty() {
                return VapidConfigStatus::Invalid("VAPID keys cannot be empty");
            }
            if !subject.starts_with("mailto:") && !subject.starts_with("https:") {
                return VapidConfigStatus::Invalid("VAPID subject must be a mailto: or https: URI");
            }
            VapidConfigStatus::Ready(VapidConfig {
                private_key: private_key.to_string(),
                public_key: public_key.to_string(),
                subject: subject.to_string(),
            })
        }
        _ if has_any => VapidConfigStatus::Incomplete,
        _ => VapidConfigStatus::Missing,
    }
}

impl VapidCredentials {
    /// A fresh P-256 key pair, both halves URL-safe base64 without padding
    /// as browsers expect for `applicationServerKey`.
    pub fn generate() -> Result<Self, web_push::WebPushError> {
        Self::generate_with_rng(&mut OsRng)
    }

    pub(crate) fn generate_with_rng<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> Result<Self, web_push::WebPushError> {
        let private_key = encode_config(random_signing_key(rng).to_bytes(), URL_SAFE_NO_PAD);
        let signer =
            web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?;
        let public_key = encode_config(signer.get_public_key(), URL_SAFE_NO_PAD);
        Ok(Self {
            private_key,
            public_key,
        })
    }
}

/// Not every 32-byte string is a valid P-256 scalar; draw until one is.
fn random_signing_key<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut scalar = [0u8; 32];
    loop {
        rng.fill_bytes(&mut scalar);
        match ES256KeyPair::from_bytes(&scalar) {
            Ok(key_pair) => break key_pair,
            Err(_) => continue,
        }
    }
}

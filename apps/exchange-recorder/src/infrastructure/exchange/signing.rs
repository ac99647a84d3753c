//! Request signing.
//!
//! `FTX-SIGN` is the lowercase hex HMAC-SHA256 of
//! `timestamp_ms + METHOD + path_with_query + body`, keyed by the API secret.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the request signature.
///
/// # Errors
///
/// Returns [`InvalidLength`] if the key is rejected by the MAC.
pub fn sign_request(
    secret: &str,
    timestamp_ms: i64,
    method: &str,
    path_with_query: &str,
    body: &str,
) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(format!("{timestamp_ms}{method}{path_with_query}{body}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_published_example() {
        let signature = sign_request(
            "T4lPid48QtjNxjLUFOcUZghD7CUJ7sTVsfuvQZF2",
            1_588_591_511_721,
            "GET",
            "/api/markets",
            "",
        )
        .unwrap();

        assert_eq!(
            signature,
            "dbc62ec300b2624c580611858d94f2332ac636bb86eccfa1167a7777c496ee6f"
        );
    }

    #[test]
    fn query_string_is_signed() {
        let signature = sign_request(
            "secret",
            1_609_459_200_000,
            "GET",
            "/api/fills?start_time=1609459080",
            "",
        )
        .unwrap();

        assert_eq!(
            signature,
            "589309a22a55f677cfdd3863837c9938a84bc96e4f7cb4baefdfdf4ceae2c666"
        );
    }
}

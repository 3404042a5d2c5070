//! Indirection tokens: reversible, path-safe encodings of upstream image URLs.
//!
//! A token is the URL-safe base64 encoding of the upstream URL's bytes. Nothing is stored;
//! the relay recovers the upstream address from the token alone whenever `/images/{token}`
//! is requested, so the same URL always yields the same token and tokens never expire.
//!
//! Decoding is lenient about the alphabet and padding: tokens produced by a plain standard
//! base64 encoder (with `+` and `/`) resolve to the same URL as their URL-safe equivalents.

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE},
};
use thiserror::Error;
use url::Url;

/// URL-safe decoder that accepts both padded and unpadded input
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token does not decode to UTF-8 text")]
    NotUtf8,

    #[error("decoded token is not an absolute URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Encode an upstream URL into a token usable as a single path segment.
pub fn encode(url: &str) -> String {
    URL_SAFE.encode(url.as_bytes())
}

/// Recover the exact string that was passed to [`encode`].
pub fn decode(token: &str) -> Result<String, TokenError> {
    let normalized: String = token
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let bytes = LENIENT_URL_SAFE.decode(normalized.as_bytes())?;
    String::from_utf8(bytes).map_err(|_| TokenError::NotUtf8)
}

/// Decode a token and check it names something the proxy can fetch.
///
/// Only absolute `http` and `https` URLs are accepted; anything else is rejected before any
/// outbound request is made.
pub fn resolve_target(token: &str) -> Result<Url, TokenError> {
    let raw = decode(token)?;
    let url = Url::parse(&raw)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TokenError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    const URLS: &[&str] = &[
        "https://i.example/raw/x.jpg",
        "https://i.example/raw/x.jpg?size=large&v=2",
        "http://localhost:8080/a/b/c.png",
        "https://i.example/???~~~",
        "https://i.example/caf%C3%A9/ünïcödé.webp",
        "https://i.example/x.jpg#fragment",
    ];

    #[test]
    fn test_decode_inverts_encode() {
        for url in URLS {
            assert_eq!(decode(&encode(url)).unwrap(), *url);
        }
    }

    #[test]
    fn test_encode_is_injective() {
        let mut tokens: Vec<String> = URLS.iter().map(|u| encode(u)).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), URLS.len());

        // Near-identical inputs still produce different tokens
        assert_ne!(encode("https://i.example/a.jpg"), encode("https://i.example/b.jpg"));
        assert_ne!(encode("https://i.example/a.jpg"), encode("https://i.example/a.jpg/"));
    }

    #[test]
    fn test_tokens_are_single_path_segments() {
        for url in URLS {
            let token = encode(url);
            assert!(!token.contains('/'), "token {token} contains a path separator");
            assert!(!token.contains('+'), "token {token} contains '+'");
            assert!(!token.contains('?') && !token.contains('#'));
        }
    }

    #[test]
    fn test_plain_base64_token_matches_known_value() {
        // No '+' or '/' in this one, so URL-safe and standard encodings agree
        let url = "https://i.example/raw/x.jpg";
        assert_eq!(encode(url), STANDARD.encode(url));
        assert_eq!(encode(url), "aHR0cHM6Ly9pLmV4YW1wbGUvcmF3L3guanBn");
    }

    #[test]
    fn test_decode_accepts_standard_alphabet() {
        let url = "https://i.example/???~~~";
        let standard = STANDARD.encode(url);
        assert!(standard.contains('/') && standard.contains('+'));

        assert_eq!(decode(&standard).unwrap(), url);
    }

    #[test]
    fn test_decode_accepts_unpadded_tokens() {
        let url = "https://i.example/x.jpg";
        let unpadded = URL_SAFE_NO_PAD.encode(url);
        assert!(!unpadded.ends_with('='));

        assert_eq!(decode(&unpadded).unwrap(), url);
    }

    #[test]
    fn test_decode_rejects_malformed_base64() {
        assert!(matches!(decode("not*base64!"), Err(TokenError::Encoding(_))));
    }

    #[test]
    fn test_decode_rejects_non_utf8_payload() {
        let token = URL_SAFE.encode([0xff, 0xfe, 0xfd]);
        assert!(matches!(decode(&token), Err(TokenError::NotUtf8)));
    }

    #[test]
    fn test_resolve_target_returns_parsed_url() {
        let target = resolve_target(&encode("https://i.example/raw/x.jpg?w=10")).unwrap();
        assert_eq!(target.host_str(), Some("i.example"));
        assert_eq!(target.path(), "/raw/x.jpg");
        assert_eq!(target.query(), Some("w=10"));
    }

    #[test]
    fn test_resolve_target_rejects_relative_urls() {
        let result = resolve_target(&encode("/raw/x.jpg"));
        assert!(matches!(result, Err(TokenError::InvalidUrl(_))));
    }

    #[test]
    fn test_resolve_target_rejects_non_http_schemes() {
        for url in ["file:///etc/passwd", "ftp://i.example/x.jpg", "data:image/png;base64,AAAA"] {
            let result = resolve_target(&encode(url));
            assert!(
                matches!(result, Err(TokenError::UnsupportedScheme(_))),
                "{url} should be rejected, got {result:?}"
            );
        }
    }
}

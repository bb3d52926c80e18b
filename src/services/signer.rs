//! AWS Signature Version 4 query-string signing for R2 presigned URLs.
//!
//! Every presigned URL in the crate (uploads, downloads, migration PUTs,
//! staging cleanup) goes through [`Presigner::presign`].

use crate::config::R2Config;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
pub const SERVICE: &str = "s3";
pub const SIGNED_HEADERS: &str = "host";

/// Longest lifetime S3-compatible stores accept for a presigned URL (7 days)
pub const MAX_EXPIRES_SECS: u64 = 7 * 24 * 60 * 60;

const R2_HOST_SUFFIX: &str = "r2.cloudflarestorage.com";

/// Everything except the SigV4 unreserved characters
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PATH_ENCODE_SET: &AsciiSet = &URI_ENCODE_SET.remove(b'/');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("expiry must be between 1 and 604800 seconds, got {0}")]
    InvalidExpiry(u64),

    #[error("invalid endpoint '{0}': expected http:// or https:// URL")]
    InvalidEndpoint(String),

    #[error("object key cannot be empty")]
    EmptyKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Put,
    Get,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Put => "PUT",
            Operation::Get => "GET",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresignOptions {
    pub expires_in: u64,
    /// Content type the client must send with a PUT; not part of the signature.
    pub content_type: Option<String>,
    /// Embedded as `response-content-disposition` on GETs.
    pub response_disposition: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresignedUrl {
    pub url: String,
    pub method: Operation,
    pub key: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE_SET).to_string()
}

pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

/// Sorted, fully encoded query string used only as signing input.
pub fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Seven lines: method, path, query, headers, blank, signed headers, payload hash.
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    host: &str,
) -> String {
    [
        method.to_string(),
        encode_path(path),
        canonical_query_string(query),
        format!("host:{}", host.trim()),
        String::new(),
        SIGNED_HEADERS.to_string(),
        UNSIGNED_PAYLOAD.to_string(),
    ]
    .join("\n")
}

pub fn credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date_stamp, region, service)
}

pub fn build_string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    let hashed = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{}\n{}\n{}\n{}", ALGORITHM, amz_date, scope, hashed)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn derive_signing_key(
    secret_access_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let secret = format!("AWS4{}", secret_access_key);
    let date_key = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, service.as_bytes());
    hmac_sha256(&service_key, b"aws4_request")
}

pub fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

fn encode_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Where an object lives: base URL, host header and unencoded request path.
struct ObjectLocation {
    base: String,
    host: String,
    path: String,
}

pub struct Presigner {
    config: R2Config,
}

impl Presigner {
    pub fn new(config: R2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &R2Config {
        &self.config
    }

    fn locate(&self, key: &str) -> Result<ObjectLocation, SigningError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(SigningError::EmptyKey);
        }

        match &self.config.endpoint {
            Some(endpoint) => {
                let (scheme, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
                    ("https://", rest)
                } else if let Some(rest) = endpoint.strip_prefix("http://") {
                    ("http://", rest)
                } else {
                    return Err(SigningError::InvalidEndpoint(endpoint.clone()));
                };
                // Any path on the endpoint is ignored; only scheme and authority are used.
                let host = rest.split('/').next().unwrap_or_default();
                if host.is_empty() {
                    return Err(SigningError::InvalidEndpoint(endpoint.clone()));
                }
                Ok(ObjectLocation {
                    base: format!("{}{}", scheme, host),
                    host: host.to_string(),
                    path: format!("/{}/{}", self.config.bucket_name, key),
                })
            }
            None => {
                let host = format!(
                    "{}.{}.{}",
                    self.config.bucket_name, self.config.account_id, R2_HOST_SUFFIX
                );
                Ok(ObjectLocation {
                    base: format!("https://{}", host),
                    host,
                    path: format!("/{}", key),
                })
            }
        }
    }

    pub fn presign(
        &self,
        operation: Operation,
        key: &str,
        options: &PresignOptions,
    ) -> Result<PresignedUrl, SigningError> {
        self.presign_at(operation, key, options, Utc::now())
    }

    pub fn presign_at(
        &self,
        operation: Operation,
        key: &str,
        options: &PresignOptions,
        now: DateTime<Utc>,
    ) -> Result<PresignedUrl, SigningError> {
        if options.expires_in == 0 || options.expires_in > MAX_EXPIRES_SECS {
            return Err(SigningError::InvalidExpiry(options.expires_in));
        }
        let location = self.locate(key)?;

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = credential_scope(&date_stamp, &self.config.region, SERVICE);

        let mut query = vec![
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{}", self.config.access_key_id, scope),
            ),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), options.expires_in.to_string()),
            ("X-Amz-SignedHeaders".to_string(), SIGNED_HEADERS.to_string()),
        ];
        if let Some(disposition) = &options.response_disposition {
            query.push((
                "response-content-disposition".to_string(),
                disposition.clone(),
            ));
        }

        let canonical_request =
            build_canonical_request(operation.as_str(), &location.path, &query, &location.host);
        let string_to_sign = build_string_to_sign(&amz_date, &scope, &canonical_request);
        let signing_key = derive_signing_key(
            &self.config.secret_access_key,
            &date_stamp,
            &self.config.region,
            SERVICE,
        );
        let signature = compute_signature(&signing_key, &string_to_sign);

        // Signature goes last; it covers everything before it.
        query.push(("X-Amz-Signature".to_string(), signature));

        let url = format!(
            "{}{}?{}",
            location.base,
            encode_path(&location.path),
            encode_query(&query)
        );

        tracing::debug!(
            "✍️  Presigned {} for {} (expires in {}s)",
            operation,
            key,
            options.expires_in
        );

        Ok(PresignedUrl {
            url,
            method: operation,
            key: key.trim_start_matches('/').to_string(),
            expires_at: now + Duration::seconds(options.expires_in as i64),
            content_type: options.content_type.clone(),
        })
    }

    /// PUT URL with the long upload lifetime.
    pub fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<PresignedUrl, SigningError> {
        self.presign(
            Operation::Put,
            key,
            &PresignOptions {
                expires_in: self.config.upload_expires_secs,
                content_type: Some(content_type.to_string()),
                response_disposition: None,
            },
        )
    }

    /// GET URL that makes browsers save the object as `filename`.
    pub fn presign_download(
        &self,
        key: &str,
        filename: &str,
    ) -> Result<PresignedUrl, SigningError> {
        self.presign(
            Operation::Get,
            key,
            &PresignOptions {
                expires_in: self.config.download_expires_secs,
                content_type: None,
                response_disposition: Some(attachment_disposition(filename)),
            },
        )
    }

    /// Anonymous URL through the public bucket alias, if one is configured.
    pub fn public_url(&self, key: &str) -> Option<String> {
        self.config.public_url.as_ref().map(|base| {
            format!(
                "{}/{}",
                base,
                encode_path(key.trim_start_matches('/'))
            )
        })
    }
}

pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

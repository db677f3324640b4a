//! Wire codec for the blocklist service
//!
//! Builds requests for every endpoint and decodes response bodies into
//! typed lookups and outcomes. The transport itself lives outside the core:
//! the native runtime uses an HTTP client, the in-page session hands the
//! request to the userscript transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{IdKind, Lookup, LookupShape, Verdict};

// =============================================================================
// Endpoints
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Service endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// `GET /isExist?mid=` -> `True` / `False`
    IsExist,
    /// `POST /isExistS` (`mids`) -> `["True", ...]`
    IsExistBatch,
    /// `GET /blockBV?bv=` -> `{msg, mid, result}`
    BlockBv,
    /// `POST /isBlockedBVS` (`bvs`) -> `{msg, mid: [...], result: [...]}`
    BlockedBvBatch,
    /// `POST /block` (`mid`, `username`)
    Block,
    /// `POST /remove` (`mid`)
    Remove,
    /// `GET /ok`
    Alive,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::IsExist => "/isExist",
            Self::IsExistBatch => "/isExistS",
            Self::BlockBv => "/blockBV",
            Self::BlockedBvBatch => "/isBlockedBVS",
            Self::Block => "/block",
            Self::Remove => "/remove",
            Self::Alive => "/ok",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::IsExist | Self::BlockBv | Self::Alive => Method::Get,
            _ => Method::Post,
        }
    }

    /// Lookup endpoint for an identifier kind and call shape.
    pub fn for_lookup(kind: IdKind, shape: LookupShape) -> Self {
        match (kind, shape) {
            (IdKind::Subject, LookupShape::Single) => Self::IsExist,
            (IdKind::Subject, LookupShape::Batched) => Self::IsExistBatch,
            (IdKind::Content, LookupShape::Single) => Self::BlockBv,
            (IdKind::Content, LookupShape::Batched) => Self::BlockedBvBatch,
        }
    }
}

/// A request ready for a transport. GET params go in the query string,
/// POST params are sent as a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRequest {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
}

impl ServiceRequest {
    fn new(endpoint: Endpoint, params: &[(&str, &str)]) -> Self {
        Self {
            endpoint,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.endpoint.method()
    }

    #[inline]
    pub fn path(&self) -> &'static str {
        self.endpoint.path()
    }
}

// =============================================================================
// Request Builders
// =============================================================================

/// Build a lookup request. Single shapes take exactly one id; batched
/// shapes join ids with commas in request order.
pub fn lookup_request(kind: IdKind, shape: LookupShape, ids: &[String]) -> ServiceRequest {
    let endpoint = Endpoint::for_lookup(kind, shape);
    let key = match endpoint {
        Endpoint::IsExist => "mid",
        Endpoint::IsExistBatch => "mids",
        Endpoint::BlockBv => "bv",
        _ => "bvs",
    };
    let value = ids.join(",");
    ServiceRequest::new(endpoint, &[(key, &value)])
}

pub fn block_request(subject: &str, name: &str) -> ServiceRequest {
    ServiceRequest::new(Endpoint::Block, &[("mid", subject), ("username", name)])
}

pub fn remove_request(subject: &str) -> ServiceRequest {
    ServiceRequest::new(Endpoint::Remove, &[("mid", subject)])
}

pub fn alive_request() -> ServiceRequest {
    ServiceRequest::new(Endpoint::Alive, &[])
}

// =============================================================================
// Errors
// =============================================================================

/// Malformed response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Response length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Unexpected response body: {0}")]
    UnexpectedBody(String),
    #[error("Endpoint {0:?} does not return lookups")]
    NotLookup(Endpoint),
}

/// Failure of one service call. Both variants count as the service being
/// unavailable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

// =============================================================================
// Lookup Decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct BvReply {
    msg: String,
    #[serde(default)]
    mid: Option<Value>,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BvBatchReply {
    msg: String,
    #[serde(default)]
    mid: Vec<Option<Value>>,
    #[serde(default)]
    result: Vec<String>,
}

/// Decode a lookup response for `ids`, in request order.
///
/// Per-id error flags (`ERR1`, `ERR2`, `None`) decode to unresolved lookups.
/// Shape problems are errors and the whole response must be discarded.
pub fn decode_lookups(endpoint: Endpoint, ids: &[String], body: &str) -> Result<Vec<Lookup>, DecodeError> {
    match endpoint {
        Endpoint::IsExist => {
            let id = single_id(ids)?;
            let flag = body.trim();
            match flag {
                "True" | "False" | "ERR1" | "ERR2" => Ok(vec![Lookup {
                    id: id.clone(),
                    verdict: Verdict::from_flag(flag),
                    owner: None,
                }]),
                other => Err(DecodeError::UnexpectedBody(truncate(other))),
            }
        }
        Endpoint::IsExistBatch => {
            let flags: Vec<String> =
                serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
            check_len(ids.len(), flags.len())?;
            Ok(ids
                .iter()
                .zip(flags.iter())
                .map(|(id, flag)| Lookup {
                    id: id.clone(),
                    verdict: Verdict::from_flag(flag),
                    owner: None,
                })
                .collect())
        }
        Endpoint::BlockBv => {
            let id = single_id(ids)?;
            let reply: BvReply =
                serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
            if reply.msg != "OK" {
                return Ok(vec![Lookup::unresolved(id.as_str())]);
            }
            Ok(vec![Lookup {
                id: id.clone(),
                verdict: reply.result.as_deref().and_then(Verdict::from_flag),
                owner: reply.mid.as_ref().and_then(owner_string),
            }])
        }
        Endpoint::BlockedBvBatch => {
            let reply: BvBatchReply =
                serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
            if reply.msg != "OK" {
                return Ok(ids.iter().map(|id| Lookup::unresolved(id.as_str())).collect());
            }
            check_len(ids.len(), reply.result.len())?;
            check_len(ids.len(), reply.mid.len())?;
            Ok(ids
                .iter()
                .zip(reply.result.iter().zip(reply.mid.iter()))
                .map(|(id, (flag, mid))| Lookup {
                    id: id.clone(),
                    verdict: Verdict::from_flag(flag),
                    owner: mid.as_ref().and_then(owner_string),
                })
                .collect())
        }
        other => Err(DecodeError::NotLookup(other)),
    }
}

fn single_id(ids: &[String]) -> Result<&String, DecodeError> {
    match ids {
        [id] => Ok(id),
        _ => Err(DecodeError::LengthMismatch {
            expected: 1,
            actual: ids.len(),
        }),
    }
}

#[inline]
fn check_len(expected: usize, actual: usize) -> Result<(), DecodeError> {
    if expected != actual {
        return Err(DecodeError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// Owner ids arrive as numbers from one backend and strings from another.
fn owner_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(64).collect()
}

// =============================================================================
// Mutation Decoding
// =============================================================================

/// Response of `POST /block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReply {
    Ok,
    /// `ERR1`
    InvalidIdentifier,
    /// `ERR2`
    StorageFailure,
    Other(String),
}

impl BlockReply {
    pub fn decode(body: &str) -> Self {
        match body.trim() {
            "OK" => Self::Ok,
            "ERR1" => Self::InvalidIdentifier,
            "ERR2" => Self::StorageFailure,
            other => Self::Other(truncate(other)),
        }
    }
}

/// Response of `POST /remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveReply {
    Ok,
    /// `ERR1`
    InvalidIdentifier,
    /// `ERR2`
    Failed,
    Other(String),
}

impl RemoveReply {
    pub fn decode(body: &str) -> Self {
        match body.trim() {
            "OK" => Self::Ok,
            "ERR1" => Self::InvalidIdentifier,
            "ERR2" => Self::Failed,
            other => Self::Other(truncate(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lookup_request_shapes() {
        let req = lookup_request(IdKind::Subject, LookupShape::Batched, &ids(&["1", "2", "3"]));
        assert_eq!(req.path(), "/isExistS");
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.params, vec![("mids".to_string(), "1,2,3".to_string())]);

        let req = lookup_request(IdKind::Subject, LookupShape::Single, &ids(&["7"]));
        assert_eq!(req.path(), "/isExist");
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.params, vec![("mid".to_string(), "7".to_string())]);

        let req = lookup_request(IdKind::Content, LookupShape::Batched, &ids(&["BV1", "BV2"]));
        assert_eq!(req.path(), "/isBlockedBVS");
        assert_eq!(req.params, vec![("bvs".to_string(), "BV1,BV2".to_string())]);

        let req = lookup_request(IdKind::Content, LookupShape::Single, &ids(&["BV1"]));
        assert_eq!(req.path(), "/blockBV");
        assert_eq!(req.params, vec![("bv".to_string(), "BV1".to_string())]);
    }

    #[test]
    fn test_mutation_requests() {
        let req = block_request("7", "x");
        assert_eq!(req.path(), "/block");
        assert_eq!(
            req.params,
            vec![("mid".to_string(), "7".to_string()), ("username".to_string(), "x".to_string())]
        );
        assert_eq!(remove_request("7").path(), "/remove");
        assert_eq!(alive_request().method(), Method::Get);
    }

    #[test]
    fn test_decode_batch_positional() {
        let lookups = decode_lookups(
            Endpoint::IsExistBatch,
            &ids(&["A", "B", "C"]),
            r#"["False","True","False"]"#,
        )
        .unwrap();
        let verdicts: Vec<_> = lookups.iter().map(|l| (l.id.as_str(), l.verdict)).collect();
        assert_eq!(
            verdicts,
            vec![
                ("A", Some(Verdict::NotBlocked)),
                ("B", Some(Verdict::Blocked)),
                ("C", Some(Verdict::NotBlocked)),
            ]
        );
    }

    #[test]
    fn test_decode_batch_length_mismatch() {
        let err = decode_lookups(Endpoint::IsExistBatch, &ids(&["A", "B"]), r#"["True"]"#).unwrap_err();
        assert_eq!(err, DecodeError::LengthMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_decode_error_flags_are_unresolved() {
        let lookups =
            decode_lookups(Endpoint::IsExistBatch, &ids(&["A", "x"]), r#"["True","ERR1"]"#).unwrap();
        assert_eq!(lookups[0].verdict, Some(Verdict::Blocked));
        assert_eq!(lookups[1].verdict, None);
    }

    #[test]
    fn test_decode_single() {
        let lookups = decode_lookups(Endpoint::IsExist, &ids(&["7"]), "True").unwrap();
        assert_eq!(lookups[0].verdict, Some(Verdict::Blocked));

        let err = decode_lookups(Endpoint::IsExist, &ids(&["7"]), "<html>").unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedBody(_)));
    }

    #[test]
    fn test_decode_content_batch_with_owners() {
        let body = r#"{"msg":"OK","mid":[555,null,"777"],"result":["True","None","False"]}"#;
        let lookups =
            decode_lookups(Endpoint::BlockedBvBatch, &ids(&["BV123", "BV9", "BV5"]), body).unwrap();

        assert_eq!(lookups[0].owner.as_deref(), Some("555"));
        assert_eq!(lookups[0].verdict, Some(Verdict::Blocked));
        assert_eq!(lookups[1], Lookup::unresolved("BV9"));
        assert_eq!(lookups[2].owner.as_deref(), Some("777"));
        assert_eq!(lookups[2].verdict, Some(Verdict::NotBlocked));
    }

    #[test]
    fn test_decode_content_batch_not_ready() {
        let lookups =
            decode_lookups(Endpoint::BlockedBvBatch, &ids(&["BV1", "BV2"]), r#"{"msg":"just wait..."}"#)
                .unwrap();
        assert!(lookups.iter().all(|l| l.verdict.is_none() && l.owner.is_none()));
    }

    #[test]
    fn test_decode_content_batch_mismatch() {
        let body = r#"{"msg":"OK","mid":[1],"result":["True","False"]}"#;
        let err = decode_lookups(Endpoint::BlockedBvBatch, &ids(&["BV1", "BV2"]), body).unwrap_err();
        assert_eq!(err, DecodeError::LengthMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_decode_single_content() {
        let lookups = decode_lookups(
            Endpoint::BlockBv,
            &ids(&["BV1"]),
            r#"{"msg":"OK","mid":"42","result":"True"}"#,
        )
        .unwrap();
        assert_eq!(lookups[0].owner.as_deref(), Some("42"));
        assert_eq!(lookups[0].verdict, Some(Verdict::Blocked));
    }

    #[test]
    fn test_decode_replies() {
        assert_eq!(BlockReply::decode("OK"), BlockReply::Ok);
        assert_eq!(BlockReply::decode("ERR1"), BlockReply::InvalidIdentifier);
        assert_eq!(BlockReply::decode("ERR2"), BlockReply::StorageFailure);
        assert_eq!(BlockReply::decode("boom"), BlockReply::Other("boom".to_string()));
        assert_eq!(RemoveReply::decode("ERR2"), RemoveReply::Failed);
    }
}

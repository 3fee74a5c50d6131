//! Finding model: the parsed view of a raw threat-detection record.
//!
//! Raw records arrive as GuardDuty-shaped JSON. Only the handful of fields the
//! containment workflows need are extracted; everything else stays in the raw
//! document and is never consulted.

use crate::error::FindingError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON pointer to the finding type (the dispatch key).
pub const TYPE_POINTER: &str = "/Type";
/// JSON pointer to the opaque finding identifier.
pub const ID_POINTER: &str = "/Id";
/// JSON pointer to the targeted compute instance.
pub const RESOURCE_ID_POINTER: &str = "/Resource/InstanceDetails/InstanceId";
/// JSON pointer to the remote peer observed in a network-connection action.
pub const REMOTE_PEER_POINTER: &str =
    "/Service/Action/NetworkConnectionAction/RemoteIpDetails/IpAddressV4";

/// An immutable, parsed security finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Threat category, e.g. `Backdoor:EC2/C&CActivity.B`.
    pub finding_type: String,
    /// Opaque finding identifier used for the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Identifier of the compromised compute instance.
    pub resource_id: String,
    /// Network peer associated with the observed activity, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_peer_address: Option<String>,
}

impl Finding {
    /// Build a finding directly, bypassing raw-record extraction.
    pub fn new(finding_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            finding_type: finding_type.into(),
            id: None,
            resource_id: resource_id.into(),
            remote_peer_address: None,
        }
    }

    /// Set the finding identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the remote peer address.
    pub fn with_remote_peer(mut self, address: impl Into<String>) -> Self {
        self.remote_peer_address = Some(address.into());
        self
    }

    /// Extract a finding from a raw record.
    ///
    /// `Type` and the instance identifier are mandatory; `Id` and the remote
    /// peer address are optional and simply left empty when absent.
    pub fn parse(raw: &Value) -> Result<Self, FindingError> {
        let finding_type = required_str(raw, TYPE_POINTER, "Type")?;
        let resource_id = required_str(raw, RESOURCE_ID_POINTER, "InstanceId")?;
        let id = raw
            .pointer(ID_POINTER)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            finding_type,
            id,
            resource_id,
            remote_peer_address: remote_peer_address(raw),
        })
    }

    /// The finding identifier, or `"unknown"` when the record carried none.
    pub fn id_or_unknown(&self) -> &str {
        self.id.as_deref().unwrap_or("unknown")
    }
}

/// Read the finding type from a raw record without parsing the rest.
pub fn finding_type(raw: &Value) -> Option<&str> {
    raw.pointer(TYPE_POINTER).and_then(Value::as_str)
}

/// Extract the optional remote peer address. Absence is not an error: not
/// every finding type carries network-action detail.
pub fn remote_peer_address(raw: &Value) -> Option<String> {
    raw.pointer(REMOTE_PEER_POINTER)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_str(raw: &Value, pointer: &str, field: &'static str) -> Result<String, FindingError> {
    match raw.pointer(pointer) {
        None | Some(Value::Null) => Err(FindingError::MissingField { field }),
        Some(Value::String(s)) if s.is_empty() => Err(FindingError::MissingField { field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(FindingError::InvalidField {
            field,
            reason: format!("expected a string, found {}", json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

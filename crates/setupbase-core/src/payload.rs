use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SetupError;

/// Identifies a trailer written by the packaging tool.
pub const MAGIC_COOKIE: u64 = 0xc263_0a1c_99d6_68f8;

const DIGEST_LEN: usize = 32;
const U64_LEN: usize = 8;
// digest + body length + marker + cookie
const TRAILER_FIXED_LEN: usize = DIGEST_LEN + U64_LEN * 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicMarker {
    Installer,
    Uninstaller,
}

impl MagicMarker {
    pub const INSTALLER_VALUE: u64 = 0x1202_3233;
    pub const UNINSTALLER_VALUE: u64 = 0x1202_3234;

    pub fn value(self) -> u64 {
        match self {
            Self::Installer => Self::INSTALLER_VALUE,
            Self::Uninstaller => Self::UNINSTALLER_VALUE,
        }
    }

    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            Self::INSTALLER_VALUE => Some(Self::Installer),
            Self::UNINSTALLER_VALUE => Some(Self::Uninstaller),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installer => "installer",
            Self::Uninstaller => "uninstaller",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadSettings {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub target_dir: Option<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// One recorded operation together with the values it captured while running,
/// which undo needs later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerformedOperation {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl PerformedOperation {
    pub fn new(name: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            values: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledComponent {
    pub name: String,
    pub version: String,
    /// Hidden from listings unless virtual components are shown.
    #[serde(default, rename = "virtual", skip_serializing_if = "is_false")]
    pub is_virtual: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadBody {
    pub settings: PayloadSettings,
    #[serde(default)]
    pub operations: Vec<PerformedOperation>,
    #[serde(default)]
    pub components: Vec<InstalledComponent>,
}

/// The resource appended to the installer binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadContent {
    pub magic_marker: MagicMarker,
    pub body: PayloadBody,
}

impl PayloadContent {
    pub fn new(magic_marker: MagicMarker, body: PayloadBody) -> Self {
        Self { magic_marker, body }
    }

    pub fn settings(&self) -> &PayloadSettings {
        &self.body.settings
    }

    pub fn performed_operations(&self) -> &[PerformedOperation] {
        &self.body.operations
    }

    pub fn components(&self) -> &[InstalledComponent] {
        &self.body.components
    }
}

/// Layout: `[body][sha256(body)][body_len u64][marker u64][cookie u64]`, integers little endian.
pub fn encode_payload_trailer(content: &PayloadContent) -> Result<Vec<u8>> {
    let body =
        serde_json::to_vec(&content.body).context("failed to serialize installer payload")?;
    let digest = Sha256::digest(&body);

    let mut out = Vec::with_capacity(body.len() + TRAILER_FIXED_LEN);
    out.extend_from_slice(&body);
    out.extend_from_slice(&digest);
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(&content.magic_marker.value().to_le_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_le_bytes());
    Ok(out)
}

/// Byte offset at which the trailer starts, if `bytes` ends with a well-formed one.
pub fn payload_trailer_offset(bytes: &[u8]) -> Option<usize> {
    locate_trailer(bytes).ok().map(|located| located.body_start)
}

pub fn decode_payload_trailer(bytes: &[u8]) -> Result<PayloadContent> {
    let located = locate_trailer(bytes)?;
    let body = &bytes[located.body_start..located.body_start + located.body_len];
    let digest = &bytes[located.body_start + located.body_len..][..DIGEST_LEN];

    let actual = Sha256::digest(body);
    if actual.as_slice() != digest {
        return Err(SetupError::invalid_payload(format!(
            "payload digest mismatch: expected={} actual={}",
            hex::encode(digest),
            hex::encode(actual)
        ))
        .into());
    }

    let body: PayloadBody = serde_json::from_slice(body)
        .map_err(|err| SetupError::invalid_payload(format!("malformed payload body: {err}")))?;

    Ok(PayloadContent {
        magic_marker: located.marker,
        body,
    })
}

struct LocatedTrailer {
    marker: MagicMarker,
    body_start: usize,
    body_len: usize,
}

fn locate_trailer(bytes: &[u8]) -> Result<LocatedTrailer, SetupError> {
    if bytes.len() < TRAILER_FIXED_LEN {
        return Err(SetupError::invalid_payload("resource too small"));
    }

    let end = bytes.len();
    let cookie = read_u64_le(&bytes[end - U64_LEN..]);
    if cookie != MAGIC_COOKIE {
        return Err(SetupError::invalid_payload("magic cookie not found"));
    }

    let marker_value = read_u64_le(&bytes[end - U64_LEN * 2..end - U64_LEN]);
    let marker = MagicMarker::from_value(marker_value).ok_or_else(|| {
        SetupError::invalid_payload(format!("unknown magic marker {marker_value:#x}"))
    })?;

    let body_len = read_u64_le(&bytes[end - U64_LEN * 3..end - U64_LEN * 2]);
    let available = (end - TRAILER_FIXED_LEN) as u64;
    if body_len > available {
        return Err(SetupError::invalid_payload(format!(
            "truncated payload body (declared={body_len} available={available})"
        )));
    }

    let body_len = body_len as usize;
    Ok(LocatedTrailer {
        marker,
        body_start: end - TRAILER_FIXED_LEN - body_len,
        body_len,
    })
}

fn read_u64_le(slice: &[u8]) -> u64 {
    let mut buf = [0_u8; U64_LEN];
    buf.copy_from_slice(&slice[..U64_LEN]);
    u64::from_le_bytes(buf)
}

//! Subscription handshake payloads
//!
//! The streaming endpoint expects a single compact JSON record as the first
//! bytes on a fresh connection. Its exact shape is undocumented, so several
//! shapes are probed in a fixed order, from least to most detailed.

use crate::account::SessionContext;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// One guess at the subscription record the endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeCandidate {
    /// `{type, session, camera_id, network_id}`
    Simple,
    /// Simple plus `auth_token` and `account_id`
    WithAuth,
    /// Channel addressing, `client_id` and `type = "live"`
    Full,
    /// Subscription with client id and video options
    SubscriptionOptions,
}

impl HandshakeCandidate {
    /// Probe order used when nothing else is configured
    pub const DEFAULT_ORDER: [HandshakeCandidate; 4] = [
        HandshakeCandidate::Simple,
        HandshakeCandidate::WithAuth,
        HandshakeCandidate::Full,
        HandshakeCandidate::SubscriptionOptions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HandshakeCandidate::Simple => "simple",
            HandshakeCandidate::WithAuth => "with-auth",
            HandshakeCandidate::Full => "full",
            HandshakeCandidate::SubscriptionOptions => "subscription-options",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::DEFAULT_ORDER
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Serialize the record for `ctx`. Pure; the output is byte-for-byte
    /// deterministic for a given context.
    pub fn build(&self, ctx: &SessionContext) -> Result<Bytes, serde_json::Error> {
        let session = ctx.session_id.as_deref();
        let encoded = match self {
            HandshakeCandidate::Simple => serde_json::to_vec(&SimpleRecord {
                kind: "subscribe",
                session,
                camera_id: ctx.camera_id,
                network_id: ctx.network_id,
            }),
            HandshakeCandidate::WithAuth => serde_json::to_vec(&AuthRecord {
                kind: "subscribe",
                session,
                auth_token: &ctx.auth_token,
                account_id: ctx.account_id,
                camera_id: ctx.camera_id,
                network_id: ctx.network_id,
            }),
            HandshakeCandidate::Full => serde_json::to_vec(&ChannelRecord {
                action: "subscribe",
                channel: format!("liveview/{}/{}", ctx.network_id, ctx.camera_id),
                auth_token: &ctx.auth_token,
                account_id: ctx.account_id,
                client_id: ClientId::from(ctx.client_id.as_str()),
                network_id: ctx.network_id,
                camera_id: ctx.camera_id,
                kind: "live",
            }),
            HandshakeCandidate::SubscriptionOptions => serde_json::to_vec(&OptionsRecord {
                kind: "subscribe",
                session,
                auth_token: &ctx.auth_token,
                account_id: ctx.account_id,
                client_id: ClientId::from(ctx.client_id.as_str()),
                network_id: ctx.network_id,
                camera_id: ctx.camera_id,
                options: StreamOptions {
                    video_profile: "hd",
                    include_audio: false,
                },
            }),
        }?;
        Ok(Bytes::from(encoded))
    }
}

impl fmt::Display for HandshakeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client ids made only of digits go on the wire as numbers
#[derive(Serialize)]
#[serde(untagged)]
enum ClientId<'a> {
    Numeric(u64),
    Text(&'a str),
}

impl<'a> From<&'a str> for ClientId<'a> {
    fn from(value: &'a str) -> Self {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = value.parse() {
                return ClientId::Numeric(n);
            }
        }
        ClientId::Text(value)
    }
}

#[derive(Serialize)]
struct SimpleRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    session: Option<&'a str>,
    camera_id: u64,
    network_id: u64,
}

#[derive(Serialize)]
struct AuthRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    session: Option<&'a str>,
    auth_token: &'a str,
    account_id: u64,
    camera_id: u64,
    network_id: u64,
}

#[derive(Serialize)]
struct ChannelRecord<'a> {
    action: &'a str,
    channel: String,
    auth_token: &'a str,
    account_id: u64,
    client_id: ClientId<'a>,
    network_id: u64,
    camera_id: u64,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct OptionsRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    session: Option<&'a str>,
    auth_token: &'a str,
    account_id: u64,
    client_id: ClientId<'a>,
    network_id: u64,
    camera_id: u64,
    options: StreamOptions<'a>,
}

#[derive(Serialize)]
struct StreamOptions<'a> {
    video_profile: &'a str,
    include_audio: bool,
}

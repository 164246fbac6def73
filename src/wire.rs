//! Wire framing and message envelope (spec §6).
//!
//! The length-prefixed frame is lifted straight from
//! `melnet::common::{write_len_bts, read_len_bts}`: a big-endian `u32`
//! length prefix followed by the payload, serialized with `stdcode` rather
//! than melnet's bincode-direct calls (this crate has no RPC verb table to
//! route through, just a flat message enum).

use serde::{Deserialize, Serialize};
use smol::prelude::*;

use crate::entities::{Breadcrumb, Header, SCStatus, StampingCertificate, Vote};
use crate::error::PeerError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandshakeData {
    pub version: u32,
    pub network_id: u64,
    pub genesis: crate::entities::Hash,
    pub sc_status: SCStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HasVoteData {
    pub height: u64,
    pub voter_idx: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StampingVoteData {
    pub height: u64,
    pub voter: u16,
    pub signature: Vec<u8>,
}

impl StampingVoteData {
    pub fn vote(&self) -> Vote {
        Vote {
            height: self.height,
            voter: self.voter,
        }
    }
}

/// One variant per message code in spec §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Handshake(HandshakeData),
    StampingVote(StampingVoteData),
    StampingStatus(SCStatus),
    HasSCVote(HasVoteData),
    GetBreadcrumb { from_height: u64 },
    Breadcrumb(Option<Breadcrumb>),
    GetHeaders { begin: u64, end: u64 },
    Headers(Vec<Header>),
}

impl Message {
    pub fn stamping_certificate_in_breadcrumb(&self) -> Option<StampingCertificate> {
        match self {
            Message::Breadcrumb(Some(bc)) => Some(bc.tail_sc),
            _ => None,
        }
    }
}

/// Writes a length-prefixed frame: 4-byte big-endian length, then payload.
pub async fn send_frame<T: AsyncWrite + Unpin>(
    conn: &mut T,
    msg: &Message,
    max_msg_size: u32,
) -> Result<(), PeerError> {
    let payload = stdcode::serialize(msg).map_err(|e| PeerError::Decode(e.to_string()))?;
    if payload.len() as u32 > max_msg_size {
        return Err(PeerError::MsgTooLarge {
            size: payload.len() as u32,
            limit: max_msg_size,
        });
    }
    conn.write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(|e| PeerError::Transport(e.to_string()))?;
    conn.write_all(&payload)
        .await
        .map_err(|e| PeerError::Transport(e.to_string()))?;
    conn.flush().await.map_err(|e| PeerError::Transport(e.to_string()))?;
    Ok(())
}

/// Reads a length-prefixed frame, rejecting anything over `max_msg_size`.
pub async fn recv_frame<T: AsyncRead + Unpin>(
    conn: &mut T,
    max_msg_size: u32,
) -> Result<Message, PeerError> {
    let mut len_bytes = [0u8; 4];
    conn.read_exact(&mut len_bytes)
        .await
        .map_err(|e| PeerError::Transport(e.to_string()))?;
    let len = u32::from_be_bytes(len_bytes);
    if len > max_msg_size {
        return Err(PeerError::MsgTooLarge {
            size: len,
            limit: max_msg_size,
        });
    }
    let mut buf = vec![0u8; len as usize];
    conn.read_exact(&mut buf)
        .await
        .map_err(|e| PeerError::Transport(e.to_string()))?;
    stdcode::deserialize(&buf).map_err(|e| PeerError::Decode(e.to_string()))
}

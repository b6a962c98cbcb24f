use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::session::session_registry::SessionId;


/// Well-known rendezvous service ids
pub const SERVICE_FILE_SEND: &str = "09461343-4C7F-11D1-8222-444553540000";
pub const SERVICE_FILE_GET: &str = "09461348-4C7F-11D1-8222-444553540000";
pub const SERVICE_BUDDY_ICON: &str = "09461346-4C7F-11D1-8222-444553540000";
pub const SERVICE_CHAT: &str = "748F2420-6287-11D1-8222-444553540000";


/// A peer's proposal to start (or continue) a rendezvous session. Interpreting the payload of a
///  specific service is up to the application.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RendezvousProposal {
    pub peer: String,
    pub service: String,
    /// base64 as received: replies must echo it verbatim
    pub cookie: String,
    pub session_id: SessionId,
    pub sequence: u32,
    pub remote_ip: String,
    pub proposer_ip: String,
    pub verified_ip: String,
    pub port: u16,
    pub tlvs: Vec<(String, String)>,
}
impl RendezvousProposal {
    /// Parses the arguments of `RVOUS_PROPOSE:<peer>:<service>:<cookie>:<seq>:<remote ip>:
    ///  <proposer ip>:<verified ip>:<port>[:<tag>:<value>]*`
    pub fn parse(args: &[&str]) -> anyhow::Result<RendezvousProposal> {
        if args.len() < 8 {
            bail!("rendezvous proposal has {} fields, expected at least 8", args.len());
        }

        let tlvs = args[8..].chunks(2)
            .map(|tlv| (tlv[0].to_string(), tlv.get(1).unwrap_or(&"").to_string()))
            .collect();

        Ok(RendezvousProposal {
            peer: args[0].to_string(),
            service: args[1].to_string(),
            cookie: args[2].to_string(),
            session_id: session_id_from_cookie(args[2])?,
            sequence: args[3].parse().map_err(|e| anyhow!("invalid rendezvous sequence {:?}: {}", args[3], e))?,
            remote_ip: args[4].to_string(),
            proposer_ip: args[5].to_string(),
            verified_ip: args[6].to_string(),
            port: args[7].parse().map_err(|e| anyhow!("invalid rendezvous port {:?}: {}", args[7], e))?,
            tlvs,
        })
    }

    pub fn tlv(&self, tag: &str) -> Option<&str> {
        self.tlvs.iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }
}

/// The cookie is the session id: eight bytes, big endian, base64 encoded
pub fn session_id_from_cookie(cookie: &str) -> anyhow::Result<SessionId> {
    let bytes = STANDARD.decode(cookie.trim())
        .map_err(|e| anyhow!("invalid rendezvous cookie {:?}: {}", cookie, e))?;
    let bytes: [u8; 8] = bytes.as_slice().try_into()
        .map_err(|_| anyhow!("rendezvous cookie {:?} has {} bytes, expected 8", cookie, bytes.len()))?;
    Ok(SessionId::from_be_bytes(bytes))
}

pub fn cookie_from_session_id(session_id: SessionId) -> String {
    STANDARD.encode(session_id.to_be_bytes())
}

//! Protocol tag exchanged once per tunnel

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Length of the preamble in bytes
pub const TAG_LEN: usize = 3;

/// Which agent protocol a tunnel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    /// SSH agent protocol
    Ssh,
    /// GPG agent (Assuan) protocol
    Gpg,
}

impl ProtocolTag {
    /// Both tags, in listener creation order
    pub const ALL: [ProtocolTag; 2] = [ProtocolTag::Gpg, ProtocolTag::Ssh];

    /// Wire encoding of the tag
    pub const fn as_bytes(&self) -> &'static [u8; TAG_LEN] {
        match self {
            ProtocolTag::Ssh => b"SSH",
            ProtocolTag::Gpg => b"GPG",
        }
    }

    /// Parse a tag from its wire encoding
    pub fn from_bytes(bytes: [u8; TAG_LEN]) -> Result<Self, ProtocolError> {
        match &bytes {
            b"SSH" => Ok(ProtocolTag::Ssh),
            b"GPG" => Ok(ProtocolTag::Gpg),
            _ => Err(ProtocolError::UnknownTag(bytes)),
        }
    }

    /// File name of the agent socket this protocol is normally served on
    pub const fn socket_name(&self) -> &'static str {
        match self {
            ProtocolTag::Ssh => "S.gpg-agent.ssh",
            ProtocolTag::Gpg => "S.gpg-agent",
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolTag::Ssh => write!(f, "SSH"),
            ProtocolTag::Gpg => write!(f, "GPG"),
        }
    }
}

/// Write the tag and flush, so it leaves before any payload
pub async fn write_tag<W>(writer: &mut W, tag: ProtocolTag) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(tag.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly [`TAG_LEN`] bytes and decode them.
///
/// Blocks until the full tag has arrived or the peer closes.
pub async fn read_tag<R>(reader: &mut R) -> Result<ProtocolTag, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; TAG_LEN];
    let mut got = 0;
    while got < TAG_LEN {
        let n = reader.read(&mut buf[got..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortTag {
                got,
                expected: TAG_LEN,
            });
        }
        got += n;
    }
    tracing::trace!("Read protocol tag {:?}", buf);
    ProtocolTag::from_bytes(buf)
}

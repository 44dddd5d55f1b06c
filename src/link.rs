//! The capture and injection session a scan runs over.
//!
//! A scan needs two handles on the same link: one that the background
//! listener reads frames from and one that the scan loop writes requests to.
//! On Linux both are clones of one AF_PACKET socket bound to the interface.

use std::io;

use afpacket::tokio::RawPacketStream;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Reads whole link-layer frames.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Waits for the next frame and copies it into `buf`, returning its length.
    async fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Writes whole link-layer frames.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

#[async_trait]
impl FrameReader for RawPacketStream {
    async fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await
    }
}

#[async_trait]
impl FrameWriter for RawPacketStream {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame).await
    }
}

/// Opens a raw packet socket bound to `interface_name` and puts the
/// interface into promiscuous mode for the lifetime of the socket.
///
/// Must be called from within a tokio runtime.
pub fn open(interface_name: &str) -> Result<RawPacketStream> {
    let open_err = |source| Error::Open {
        interface: interface_name.to_string(),
        source,
    };
    let mut stream = RawPacketStream::new().map_err(open_err)?;
    stream.bind(interface_name).map_err(open_err)?;
    stream.set_promisc(interface_name, true).map_err(open_err)?;
    Ok(stream)
}

//! Owned DISCON call buffers and their binary encoding.
//!
//! A [`Payload`] carries one call's worth of buffers between a simulation
//! process and the process hosting the controller. Encoding, little endian:
//!
//! ```text
//! u32 swap_len | u32 in_file_len | u32 out_name_len | u32 msg_len
//! u32 file_content_len | u32 server_file_path_len
//! f32 * swap_len | i32 fail
//! in_file | out_name | msg | file_content | server_file_path
//! ```
//!
//! Lengths count elements: `f32` values for `swap`, bytes for the rest.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::PayloadError;
use crate::registry::DisconArgs;

const HEADER_FIELDS: usize = 6;

/// Buffers for one controller call, plus an optional input file transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub swap: Vec<f32>,
    pub fail: i32,
    pub in_file: Vec<u8>,
    pub out_name: Vec<u8>,
    pub msg: Vec<u8>,
    /// Contents of the controller input file when it is shipped along.
    pub file_content: Vec<u8>,
    /// Where the receiving side should store `file_content`.
    pub server_file_path: Vec<u8>,
}

impl Payload {
    /// Zeroed payload with a `swap_len` swap array and three `char_len` byte
    /// string buffers.
    #[must_use]
    pub fn with_capacity(swap_len: usize, char_len: usize) -> Self {
        Self {
            swap: vec![0.0; swap_len],
            fail: 0,
            in_file: vec![0; char_len],
            out_name: vec![0; char_len],
            msg: vec![0; char_len],
            file_content: Vec::new(),
            server_file_path: Vec::new(),
        }
    }

    /// Borrow the five call buffers.
    pub fn as_args(&mut self) -> DisconArgs<'_> {
        DisconArgs {
            swap: &mut self.swap,
            fail: &mut self.fail,
            in_file: &mut self.in_file,
            out_name: &mut self.out_name,
            msg: &mut self.msg,
        }
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_FIELDS * 4
            + self.swap.len() * 4
            + 4
            + self.in_file.len()
            + self.out_name.len()
            + self.msg.len()
            + self.file_content.len()
            + self.server_file_path.len()
    }

    pub fn encode(&self) -> Result<Bytes, PayloadError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32_le(field_len("swap", self.swap.len())?);
        buf.put_u32_le(field_len("in_file", self.in_file.len())?);
        buf.put_u32_le(field_len("out_name", self.out_name.len())?);
        buf.put_u32_le(field_len("msg", self.msg.len())?);
        buf.put_u32_le(field_len("file_content", self.file_content.len())?);
        buf.put_u32_le(field_len("server_file_path", self.server_file_path.len())?);
        for value in &self.swap {
            buf.put_f32_le(*value);
        }
        buf.put_i32_le(self.fail);
        buf.put_slice(&self.in_file);
        buf.put_slice(&self.out_name);
        buf.put_slice(&self.msg);
        buf.put_slice(&self.file_content);
        buf.put_slice(&self.server_file_path);
        Ok(buf.freeze())
    }

    /// Decode `data` into `self`, reusing existing buffers whose length
    /// already matches. Bytes past the last field are ignored.
    ///
    /// On error `self` may be partially overwritten.
    pub fn decode(&mut self, mut data: &[u8]) -> Result<(), PayloadError> {
        need(&data, "header", HEADER_FIELDS * 4)?;
        let swap_len = data.get_u32_le() as usize;
        let in_file_len = data.get_u32_le() as usize;
        let out_name_len = data.get_u32_le() as usize;
        let msg_len = data.get_u32_le() as usize;
        let file_content_len = data.get_u32_le() as usize;
        let server_file_path_len = data.get_u32_le() as usize;

        need(&data, "swap", swap_len.saturating_mul(4))?;
        self.swap.resize(swap_len, 0.0);
        for value in &mut self.swap {
            *value = data.get_f32_le();
        }
        need(&data, "fail", 4)?;
        self.fail = data.get_i32_le();

        read_field(&mut data, "in_file", in_file_len, &mut self.in_file)?;
        read_field(&mut data, "out_name", out_name_len, &mut self.out_name)?;
        read_field(&mut data, "msg", msg_len, &mut self.msg)?;
        read_field(&mut data, "file_content", file_content_len, &mut self.file_content)?;
        read_field(
            &mut data,
            "server_file_path",
            server_file_path_len,
            &mut self.server_file_path,
        )?;
        Ok(())
    }

    /// Decode a fresh payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PayloadError> {
        let mut payload = Self::default();
        payload.decode(data)?;
        Ok(payload)
    }
}

fn field_len(field: &'static str, len: usize) -> Result<u32, PayloadError> {
    u32::try_from(len).map_err(|_| PayloadError::TooLarge { field, len })
}

fn need(data: &&[u8], field: &'static str, needed: usize) -> Result<(), PayloadError> {
    if data.remaining() < needed {
        return Err(PayloadError::Truncated {
            field,
            needed,
            remaining: data.remaining(),
        });
    }
    Ok(())
}

fn read_field(
    data: &mut &[u8],
    field: &'static str,
    len: usize,
    target: &mut Vec<u8>,
) -> Result<(), PayloadError> {
    need(data, field, len)?;
    target.resize(len, 0);
    data.copy_to_slice(target);
    Ok(())
}

/// Text up to the first NUL, or the whole buffer.
fn c_str_lossy(buf: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "avrSWAP:    {:?}", self.swap)?;
        writeln!(f, "aviFAIL:    {}", self.fail)?;
        writeln!(f, "accINFILE:  '{}'", c_str_lossy(&self.in_file))?;
        writeln!(f, "avcOUTNAME: '{}'", c_str_lossy(&self.out_name))?;
        writeln!(f, "avcMSG:     '{}'", c_str_lossy(&self.msg))?;
        writeln!(f, "ServerFilePath: '{}'", c_str_lossy(&self.server_file_path))?;
        write!(f, "FileContent: [{} bytes]", self.file_content.len())
    }
}

//! Length-prefixed encoding of requests and responses

use bytes::Bytes;

use crate::message::{Request, Response};
use crate::{Result, TapedeckError};

/// Encode a request block
///
/// # Errors
///
/// Returns error if a field exceeds its length prefix
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(64 + request.uri.len() + request.body.len());

    put_u16_prefixed(&mut data, request.method.as_bytes())?;
    put_u32_prefixed(&mut data, request.uri.as_bytes())?;
    put_headers(&mut data, &request.headers)?;
    put_u32_prefixed(&mut data, &request.body)?;

    Ok(data)
}

/// Encode a response block
///
/// # Errors
///
/// Returns error if a field exceeds its length prefix
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(64 + response.body.len());

    data.extend_from_slice(&response.status.to_le_bytes());
    put_headers(&mut data, &response.headers)?;
    put_u32_prefixed(&mut data, &response.body)?;

    Ok(data)
}

/// Decode a request block
///
/// # Errors
///
/// Returns error if the block is truncated, has trailing bytes, or holds invalid UTF-8
pub fn decode_request(data: &[u8]) -> Result<Request> {
    let mut decoder = Decoder::new(data);

    let len = decoder.u16()? as usize;
    let method = decoder.string(len)?;
    let len = decoder.u32()? as usize;
    let uri = decoder.string(len)?;
    let headers = decoder.headers()?;
    let len = decoder.u32()? as usize;
    let body = Bytes::copy_from_slice(decoder.bytes(len)?);
    decoder.finish()?;

    Ok(Request {
        method,
        uri,
        headers,
        body,
    })
}

/// Decode a response block
///
/// # Errors
///
/// Returns error if the block is truncated, has trailing bytes, or holds invalid UTF-8
pub fn decode_response(data: &[u8]) -> Result<Response> {
    let mut decoder = Decoder::new(data);

    let status = decoder.u16()?;
    let headers = decoder.headers()?;
    let len = decoder.u32()? as usize;
    let body = Bytes::copy_from_slice(decoder.bytes(len)?);
    decoder.finish()?;

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn put_headers(data: &mut Vec<u8>, headers: &[(String, String)]) -> Result<()> {
    let count = u16::try_from(headers.len()).map_err(|_| TapedeckError::DataTooLarge {
        size: headers.len(),
        limit: u16::MAX as usize,
    })?;
    data.extend_from_slice(&count.to_le_bytes());

    for (name, value) in headers {
        put_u16_prefixed(data, name.as_bytes())?;
        put_u32_prefixed(data, value.as_bytes())?;
    }
    Ok(())
}

fn put_u16_prefixed(data: &mut Vec<u8>, field: &[u8]) -> Result<()> {
    let len = u16::try_from(field.len()).map_err(|_| TapedeckError::DataTooLarge {
        size: field.len(),
        limit: u16::MAX as usize,
    })?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(field);
    Ok(())
}

fn put_u32_prefixed(data: &mut Vec<u8>, field: &[u8]) -> Result<()> {
    let len = u32::try_from(field.len()).map_err(|_| TapedeckError::DataTooLarge {
        size: field.len(),
        limit: u32::MAX as usize,
    })?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(field);
    Ok(())
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                TapedeckError::InvalidFormat(format!(
                    "Block truncated: need {len} bytes at {}, have {}",
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TapedeckError::InvalidFormat(format!("Invalid UTF-8 in block: {e}")))
    }

    fn headers(&mut self) -> Result<Vec<(String, String)>> {
        let count = self.u16()? as usize;
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.u16()? as usize;
            let name = self.string(len)?;
            let len = self.u32()? as usize;
            let value = self.string(len)?;
            headers.push((name, value));
        }
        Ok(headers)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(TapedeckError::InvalidFormat(format!(
                "{} trailing bytes after block",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

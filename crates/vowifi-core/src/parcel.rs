//! Fixed-order binary encoding of a session for cross-process transfer
//!
//! The layout is compatible with an Android `Parcel` written field by field:
//!
//! ```text
//! i32 network_id
//! i32 session_id
//! i32 sub_id
//! i32 apn_type
//! str state            CONNECTING | CONNECTED | DISCONNECTED | UNKNOWN
//! str local_ipv4
//! str local_ipv6
//! str pcscf_ipv4
//! str pcscf_ipv6
//! str dns_ipv4
//! str dns_ipv6
//! i32 prefer_ipv4      0 or 1
//! ```
//!
//! Integers are little-endian. A string is its UTF-16 length as i32 (-1 for
//! null), the UTF-16LE code units, a NUL unit, then zero padding up to a
//! multiple of four bytes. Both sides must use exactly this order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::state::{ApnType, SessionSnapshot, SessionState};

const NULL_STRING: i32 = -1;

/// Encode every field of `snapshot`
pub fn encode(snapshot: &SessionSnapshot) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_i32_le(snapshot.network_id);
    buf.put_i32_le(snapshot.session_id);
    buf.put_i32_le(snapshot.sub_id);
    buf.put_i32_le(snapshot.apn_type.value());
    put_string(&mut buf, Some(snapshot.state.as_str()));
    put_string(&mut buf, snapshot.local_ipv4.as_deref());
    put_string(&mut buf, snapshot.local_ipv6.as_deref());
    put_string(&mut buf, snapshot.pcscf_ipv4.as_deref());
    put_string(&mut buf, snapshot.pcscf_ipv6.as_deref());
    put_string(&mut buf, snapshot.dns_ipv4.as_deref());
    put_string(&mut buf, snapshot.dns_ipv6.as_deref());
    buf.put_i32_le(if snapshot.prefer_ipv4 { 1 } else { 0 });

    buf.freeze()
}

/// Decode a snapshot written by [`encode`]
///
/// Trailing bytes after the last field are ignored.
pub fn decode(data: &[u8]) -> Result<SessionSnapshot> {
    let mut buf = data;

    let network_id = get_i32(&mut buf, "network_id")?;
    let session_id = get_i32(&mut buf, "session_id")?;
    let sub_id = get_i32(&mut buf, "sub_id")?;
    let apn_type = ApnType(get_i32(&mut buf, "apn_type")?);
    let state: SessionState = get_string(&mut buf, "state")?
        .ok_or_else(|| Error::decode("missing session state"))?
        .parse()?;

    let mut snapshot = SessionSnapshot::new(network_id, session_id, sub_id, apn_type, state);
    snapshot.local_ipv4 = get_string(&mut buf, "local_ipv4")?;
    snapshot.local_ipv6 = get_string(&mut buf, "local_ipv6")?;
    snapshot.pcscf_ipv4 = get_string(&mut buf, "pcscf_ipv4")?;
    snapshot.pcscf_ipv6 = get_string(&mut buf, "pcscf_ipv6")?;
    snapshot.dns_ipv4 = get_string(&mut buf, "dns_ipv4")?;
    snapshot.dns_ipv6 = get_string(&mut buf, "dns_ipv6")?;
    snapshot.prefer_ipv4 = get_i32(&mut buf, "prefer_ipv4")? != 0;

    Ok(snapshot)
}

fn put_string(buf: &mut BytesMut, value: Option<&str>) {
    let Some(value) = value else {
        buf.put_i32_le(NULL_STRING);
        return;
    };

    let units: Vec<u16> = value.encode_utf16().collect();
    buf.put_i32_le(units.len() as i32);
    for unit in &units {
        buf.put_u16_le(*unit);
    }
    buf.put_u16_le(0);

    let written = (units.len() + 1) * 2;
    buf.put_bytes(0, padding(written));
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn get_i32(buf: &mut &[u8], field: &str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::decode(format!("truncated parcel reading {}", field)));
    }
    Ok(buf.get_i32_le())
}

fn get_string(buf: &mut &[u8], field: &str) -> Result<Option<String>> {
    let len = get_i32(buf, field)?;
    if len == NULL_STRING {
        return Ok(None);
    }
    if len < 0 {
        return Err(Error::decode(format!("negative string length {} for {}", len, field)));
    }

    let len = len as usize;
    let written = (len + 1) * 2;
    if buf.remaining() < written + padding(written) {
        return Err(Error::decode(format!("truncated parcel reading {}", field)));
    }

    let units: Vec<u16> = (0..len).map(|_| buf.get_u16_le()).collect();
    if buf.get_u16_le() != 0 {
        return Err(Error::decode(format!("unterminated string for {}", field)));
    }
    buf.advance(padding(written));

    String::from_utf16(&units)
        .map(Some)
        .map_err(|_| Error::decode(format!("invalid UTF-16 in {}", field)))
}

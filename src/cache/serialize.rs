//! Entry persistence: a self-describing binary record per entry.
//!
//! Record layout:
//! `magic | version | request_date | response_date | protocol |
//! status_code | reason | header_count | (name,value)* | body_len |
//! body_bytes | variant_count | (variant_key, target_key)*`
//!
//! Timestamps are nanoseconds since the Unix epoch; integers are
//! big-endian; strings are length-prefixed. Header order and body bytes
//! are preserved exactly.

use crate::base::error::CoreError;
use crate::cache::entry::CacheEntry;
use crate::http::body::EntityBody;
use crate::http::headers::HeaderBag;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAGIC: [u8; 4] = *b"crnt";
const FORMAT_VERSION: u8 = 1;

/// Serializes entries to and from byte sinks/sources.
#[derive(Debug, Clone, Default)]
pub struct EntrySerializer;

impl EntrySerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn write_to(&self, entry: &CacheEntry, sink: &mut dyn Write) -> Result<(), CoreError> {
        let io = |e: std::io::Error| CoreError::cache_store(format!("serialize: {e}"));

        sink.write_all(&MAGIC).map_err(io)?;
        sink.write_all(&[FORMAT_VERSION]).map_err(io)?;
        sink.write_all(&timestamp_nanos(entry.request_date())?.to_be_bytes()).map_err(io)?;
        sink.write_all(&timestamp_nanos(entry.response_date())?.to_be_bytes()).map_err(io)?;
        sink.write_all(&[protocol_code(entry.version())]).map_err(io)?;
        sink.write_all(&entry.status().as_u16().to_be_bytes()).map_err(io)?;

        match entry.reason() {
            Some(reason) => {
                sink.write_all(&[1]).map_err(io)?;
                write_str(sink, reason).map_err(io)?;
            }
            None => sink.write_all(&[0]).map_err(io)?,
        }

        sink.write_all(&(entry.headers().len() as u32).to_be_bytes()).map_err(io)?;
        for (name, value) in entry.headers().iter() {
            write_bytes(sink, name.as_str().as_bytes()).map_err(io)?;
            write_bytes(sink, value.as_bytes()).map_err(io)?;
        }

        let mut body = Vec::new();
        entry.body().write_to(&mut body)?;
        sink.write_all(&(body.len() as u64).to_be_bytes()).map_err(io)?;
        sink.write_all(&body).map_err(io)?;

        sink.write_all(&(entry.variant_map().len() as u32).to_be_bytes()).map_err(io)?;
        for (variant, target) in entry.variant_map() {
            write_str(sink, variant).map_err(io)?;
            write_str(sink, target).map_err(io)?;
        }
        Ok(())
    }

    pub fn read_from(&self, source: &mut dyn Read) -> Result<CacheEntry, CoreError> {
        let io = |e: std::io::Error| CoreError::cache_store(format!("deserialize: {e}"));

        let mut magic = [0u8; 4];
        source.read_exact(&mut magic).map_err(io)?;
        if magic != MAGIC {
            return Err(CoreError::cache_store("bad record magic"));
        }
        let version = read_u8(source).map_err(io)?;
        if version != FORMAT_VERSION {
            return Err(CoreError::cache_store(format!("unsupported record version {version}")));
        }

        let request_date = UNIX_EPOCH + Duration::from_nanos(read_u64(source).map_err(io)?);
        let response_date = UNIX_EPOCH + Duration::from_nanos(read_u64(source).map_err(io)?);
        let protocol = protocol_from_code(read_u8(source).map_err(io)?)?;
        let status = StatusCode::from_u16(read_u16(source).map_err(io)?)
            .map_err(|_| CoreError::cache_store("bad status code in record"))?;

        let reason = match read_u8(source).map_err(io)? {
            0 => None,
            _ => Some(read_string(source).map_err(io)?),
        };

        let header_count = read_u32(source).map_err(io)?;
        let mut headers = HeaderBag::new();
        for _ in 0..header_count {
            let name = read_len_bytes(source).map_err(io)?;
            let value = read_len_bytes(source).map_err(io)?;
            let name = HeaderName::from_bytes(&name)
                .map_err(|_| CoreError::cache_store("bad header name in record"))?;
            let value = HeaderValue::from_bytes(&value)
                .map_err(|_| CoreError::cache_store("bad header value in record"))?;
            headers.append_pair(name, value);
        }

        let body_len = read_u64(source).map_err(io)?;
        let mut body = vec![0u8; body_len as usize];
        source.read_exact(&mut body).map_err(io)?;

        let variant_count = read_u32(source).map_err(io)?;
        let mut variant_map = BTreeMap::new();
        for _ in 0..variant_count {
            let variant = read_string(source).map_err(io)?;
            let target = read_string(source).map_err(io)?;
            variant_map.insert(variant, target);
        }

        let entry = CacheEntry::new(
            request_date,
            response_date,
            protocol,
            status,
            reason,
            headers,
            EntityBody::Bytes(Bytes::from(body)),
            Method::GET,
        );
        Ok(if variant_map.is_empty() { entry } else { entry.with_variant_map(variant_map) })
    }
}

fn timestamp_nanos(t: SystemTime) -> Result<u64, CoreError> {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .map_err(|_| CoreError::cache_store("timestamp precedes the epoch"))
}

fn protocol_code(v: Version) -> u8 {
    if v == Version::HTTP_09 {
        9
    } else if v == Version::HTTP_10 {
        10
    } else if v == Version::HTTP_2 {
        20
    } else if v == Version::HTTP_3 {
        30
    } else {
        11
    }
}

fn protocol_from_code(code: u8) -> Result<Version, CoreError> {
    match code {
        9 => Ok(Version::HTTP_09),
        10 => Ok(Version::HTTP_10),
        11 => Ok(Version::HTTP_11),
        20 => Ok(Version::HTTP_2),
        30 => Ok(Version::HTTP_3),
        _ => Err(CoreError::cache_store(format!("unknown protocol code {code}"))),
    }
}

fn write_bytes(sink: &mut dyn Write, data: &[u8]) -> std::io::Result<()> {
    sink.write_all(&(data.len() as u32).to_be_bytes())?;
    sink.write_all(data)
}

fn write_str(sink: &mut dyn Write, s: &str) -> std::io::Result<()> {
    write_bytes(sink, s.as_bytes())
}

fn read_u8(source: &mut dyn Read) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    source.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(source: &mut dyn Read) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(source: &mut dyn Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(source: &mut dyn Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_len_bytes(source: &mut dyn Read) -> std::io::Result<Vec<u8>> {
    let len = read_u32(source)? as usize;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string(source: &mut dyn Read) -> std::io::Result<String> {
    let bytes = read_len_bytes(source)?;
    String::from_utf8(bytes)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "non-utf8 string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        let mut headers = HeaderBag::new();
        headers.append("Date", "Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        headers.append("Cache-Control", "max-age=60").unwrap();
        headers.append("Vary", "Accept").unwrap();
        headers.append("Vary", "User-Agent").unwrap();
        CacheEntry::new(
            UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789),
            UNIX_EPOCH + Duration::from_nanos(1_700_000_001_987_654_321),
            Version::HTTP_2,
            StatusCode::OK,
            Some("OK".to_string()),
            headers,
            EntityBody::Bytes(Bytes::from_static(b"\x00\x01body bytes\xff")),
            Method::GET,
        )
    }

    #[test]
    fn test_round_trip_leaf() {
        let entry = sample_entry();
        let mut buf = Vec::new();
        EntrySerializer::new().write_to(&entry, &mut buf).unwrap();
        let restored = EntrySerializer::new().read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.request_date(), entry.request_date());
        assert_eq!(restored.response_date(), entry.response_date());
        assert_eq!(restored.version(), entry.version());
        assert_eq!(restored.status(), entry.status());
        assert_eq!(restored.reason(), entry.reason());
        assert_eq!(restored.headers(), entry.headers());

        let mut original = Vec::new();
        entry.body().write_to(&mut original).unwrap();
        let mut round_tripped = Vec::new();
        restored.body().write_to(&mut round_tripped).unwrap();
        assert_eq!(original, round_tripped);
    }

    #[test]
    fn test_round_trip_index() {
        let mut map = BTreeMap::new();
        map.insert("{a=1}".to_string(), "{a=1}http://h/r".to_string());
        map.insert("{a=2}".to_string(), "{a=2}http://h/r".to_string());
        let index = sample_entry().with_variant_map(map.clone());

        let mut buf = Vec::new();
        EntrySerializer::new().write_to(&index, &mut buf).unwrap();
        let restored = EntrySerializer::new().read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.variant_map(), &map);
        assert_eq!(restored.body_len(), 0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        EntrySerializer::new().write_to(&sample_entry(), &mut buf).unwrap();
        buf[0] ^= 0xff;
        assert!(EntrySerializer::new().read_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let mut buf = Vec::new();
        EntrySerializer::new().write_to(&sample_entry(), &mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(EntrySerializer::new().read_from(&mut buf.as_slice()).is_err());
    }
}

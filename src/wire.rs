//! # Wire — Chunk Serialization and Registry Snapshot Format
//!
//! Two independent binary formats, both length-prefixed and big-endian,
//! per spec.md §6:
//!
//! - **Chunk wire format**: a chunk is a positive bigint, serialized as a
//!   minimal-length big-endian byte sequence of its magnitude prefixed by
//!   a 4-byte big-endian length. A stream is a concatenation of such
//!   units — [`write_chunk`]/[`read_chunk`] do one unit at a time.
//! - **Registry snapshot format**: a length-prefixed sequence of
//!   varint-encoded primes in ascending order (spec.md §6's "required
//!   format" for a durable registry snapshot). [`registry::PrimeRegistry`]
//!   wraps this with a SHA-256 trailer and the atomic-write-then-rename,
//!   generational-backup discipline this lineage already uses for
//!   checkpoint persistence.

use std::io::{self, Read, Write};

use rug::Integer;

/// Writes `value`'s magnitude as a 4-byte big-endian length prefix
/// followed by its minimal big-endian byte representation. `value` MUST
/// be positive (chunks are never zero or negative).
pub fn write_chunk<W: Write>(w: &mut W, value: &Integer) -> io::Result<()> {
    debug_assert!(value.cmp0().is_gt(), "chunks are always positive");
    let bytes = value.to_digits::<u8>(rug::integer::Order::MsfBe);
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk too large to serialize"))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Reads one length-prefixed chunk back into an [`Integer`].
pub fn read_chunk<R: Read>(r: &mut R) -> io::Result<Integer> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(Integer::from_digits(&bytes, rug::integer::Order::MsfBe))
}

/// Writes an entire slice of chunks as a concatenation of wire units.
pub fn write_chunks<W: Write>(w: &mut W, values: &[Integer]) -> io::Result<()> {
    for v in values {
        write_chunk(w, v)?;
    }
    Ok(())
}

/// Reads chunks from `r` until EOF, failing on a truncated final unit.
pub fn read_chunks<R: Read>(r: &mut R) -> io::Result<Vec<Integer>> {
    let mut out = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match r.read(&mut len_buf[..1])? {
            0 => break,
            _ => {
                r.read_exact(&mut len_buf[1..])?;
            }
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut bytes = vec![0u8; len];
        r.read_exact(&mut bytes)?;
        out.push(Integer::from_digits(&bytes, rug::integer::Order::MsfBe));
    }
    Ok(out)
}

/// Tag byte preceding every snapshot entry: `0` for a LEB128 varint `u64`,
/// `1` for a length-prefixed big-endian bigint. A varint's own leading
/// byte can legitimately take any value in `0..=0xFF` (e.g. the prime 383
/// encodes as `[0xFF, 0x02]`), so the tag must live outside the varint's
/// byte stream rather than be carved out of it.
const VARINT_TAG: u8 = 0;
const BIGINT_TAG: u8 = 1;

/// LEB128-style unsigned varint encoding of a `u64`, little-endian
/// base-128 with a continuation bit — the registry snapshot's per-prime
/// encoding for primes that fit in 64 bits. Primes beyond `u64` (the
/// registry has no ceiling) fall back to a length-prefixed big-endian
/// bigint. Which form follows is marked by a dedicated tag byte
/// ([`VARINT_TAG`]/[`BIGINT_TAG`]) rather than a reserved varint byte
/// value, since LEB128 can emit any byte value as its leading byte.
pub fn write_varint_prime<W: Write>(w: &mut W, p: &Integer) -> io::Result<()> {
    if let Some(small) = p.to_u64() {
        w.write_all(&[VARINT_TAG])?;
        let mut v = small;
        loop {
            let mut byte = (v & 0x7F) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            w.write_all(&[byte])?;
            if v == 0 {
                break;
            }
        }
    } else {
        w.write_all(&[BIGINT_TAG])?;
        write_chunk(w, p)?;
    }
    Ok(())
}

/// Reads back one prime written by [`write_varint_prime`]. Returns `None`
/// at a clean end-of-stream (no bytes available before the tag byte of
/// the next entry).
pub fn read_varint_prime<R: Read>(r: &mut R) -> io::Result<Option<Integer>> {
    let mut tag = [0u8; 1];
    match r.read(&mut tag)? {
        0 => return Ok(None),
        _ => {}
    }
    match tag[0] {
        BIGINT_TAG => Ok(Some(read_chunk(r)?)),
        VARINT_TAG => {
            let mut value: u64 = 0;
            let mut shift = 0u32;
            loop {
                let mut byte = [0u8; 1];
                r.read_exact(&mut byte)?;
                value |= ((byte[0] & 0x7F) as u64) << shift;
                if byte[0] & 0x80 == 0 {
                    break;
                }
                shift += 7;
            }
            Ok(Some(Integer::from(value)))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown snapshot entry tag {other}"),
        )),
    }
}

/// Serializes an ascending prime sequence as a count prefix followed by
/// that many varint-encoded primes — the registry snapshot body (the
/// SHA-256 trailer and atomic-write discipline live in
/// `registry::PrimeRegistry::save_to`).
pub fn write_snapshot_body<W: Write>(w: &mut W, primes: &[Integer]) -> io::Result<()> {
    let count = u64::try_from(primes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "snapshot too large"))?;
    w.write_all(&count.to_be_bytes())?;
    for p in primes {
        write_varint_prime(w, p)?;
    }
    Ok(())
}

pub fn read_snapshot_body<R: Read>(r: &mut R) -> io::Result<Vec<Integer>> {
    let mut count_buf = [0u8; 8];
    r.read_exact(&mut count_buf)?;
    let count = u64::from_be_bytes(count_buf);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let p = read_varint_prime(r)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "snapshot truncated")
        })?;
        out.push(p);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trip() {
        for n in [1u64, 2, 255, 256, 65536, u64::MAX] {
            let v = Integer::from(n);
            let mut buf = Vec::new();
            write_chunk(&mut buf, &v).unwrap();
            let mut cursor = io::Cursor::new(buf);
            let back = read_chunk(&mut cursor).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn chunk_round_trip_bigint_beyond_u64() {
        let v = Integer::from(2).pow(300) + 7;
        let mut buf = Vec::new();
        write_chunk(&mut buf, &v).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_chunk(&mut cursor).unwrap(), v);
    }

    #[test]
    fn chunk_stream_round_trip() {
        let values: Vec<Integer> = [2u64, 3, 5, 7, 104729].iter().map(|&n| Integer::from(n)).collect();
        let mut buf = Vec::new();
        write_chunks(&mut buf, &values).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_chunks(&mut cursor).unwrap(), values);
    }

    #[test]
    fn varint_prime_round_trip_small() {
        for n in [2u64, 3, 127, 128, 16384, u64::MAX] {
            let mut buf = Vec::new();
            write_varint_prime(&mut buf, &Integer::from(n)).unwrap();
            let mut cursor = io::Cursor::new(buf);
            assert_eq!(read_varint_prime(&mut cursor).unwrap(), Some(Integer::from(n)));
        }
    }

    #[test]
    fn varint_prime_round_trip_bigint() {
        let big = Integer::from(2).pow(200) + 1;
        let mut buf = Vec::new();
        write_varint_prime(&mut buf, &big).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_varint_prime(&mut cursor).unwrap(), Some(big));
    }

    #[test]
    fn snapshot_body_round_trip() {
        let primes: Vec<Integer> = [2u64, 3, 5, 7, 11, 13].iter().map(|&n| Integer::from(n)).collect();
        let mut buf = Vec::new();
        write_snapshot_body(&mut buf, &primes).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_snapshot_body(&mut cursor).unwrap(), primes);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let mut buf = Vec::new();
        write_snapshot_body(&mut buf, &[]).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_snapshot_body(&mut cursor).unwrap(), Vec::<Integer>::new());
    }
}

//! journal/codec — кадрирование записей журнала.
//!
//! Формат кадра (BE):
//!   [magic u32 = 0xDEADBEEF][checksum 16B][len u32][body len B]
//!
//! checksum = первые 16 байт SHA-256(body). Заголовок в хэш не входит.
//!
//! Функции здесь чистые: работают над срезом буфера и ничего не читают сами.
//! Дочитывание и resync по потоку — в reader.rs.

use byteorder::{BigEndian, ByteOrder};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::record::{decode_body, LogicalRecord};
use crate::consts::{
    CHECKSUM_LEN, FRAME_HDR_SIZE, FRAME_OFF_CHECKSUM, FRAME_OFF_LEN, FRAME_OFF_MAGIC,
    JOURNAL_MAGIC, MAGIC_BYTES, MAGIC_LEN, MAX_BODY_LEN,
};

/// Why a candidate frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("bad frame magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("frame length {0} exceeds limit")]
    Oversized(u32),
    #[error("frame checksum mismatch")]
    ChecksumMismatch,
    #[error("frame body is not a valid record: {0}")]
    PayloadCorrupt(String),
    #[error("unsupported record format version {0}")]
    UnsupportedVersion(u32),
    #[error("body of {0} bytes does not fit a frame")]
    TooLarge(usize),
    #[error("record serialization failed: {0}")]
    Serialize(String),
}

/// Successful outcome of a decode attempt.
#[derive(Debug)]
pub enum Decoded<P> {
    /// Buffer holds only part of a frame; read more and retry.
    NeedMore,
    Frame {
        record: LogicalRecord<P>,
        /// Bytes consumed: header + body.
        frame_len: usize,
    },
}

/// 128-битный дайджест body.
#[inline]
pub fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let full = Sha256::digest(body);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&full[..CHECKSUM_LEN]);
    out
}

/// Построить заголовок кадра для body.
pub fn build_header(body: &[u8]) -> Result<[u8; FRAME_HDR_SIZE], FrameError> {
    if body.len() > MAX_BODY_LEN as usize {
        return Err(FrameError::TooLarge(body.len()));
    }
    let mut hdr = [0u8; FRAME_HDR_SIZE];
    BigEndian::write_u32(&mut hdr[FRAME_OFF_MAGIC..FRAME_OFF_MAGIC + 4], JOURNAL_MAGIC);
    hdr[FRAME_OFF_CHECKSUM..FRAME_OFF_CHECKSUM + CHECKSUM_LEN].copy_from_slice(&checksum(body));
    BigEndian::write_u32(&mut hdr[FRAME_OFF_LEN..FRAME_OFF_LEN + 4], body.len() as u32);
    Ok(hdr)
}

/// magic || checksum || len || body.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let hdr = build_header(body)?;
    let mut out = Vec::with_capacity(FRAME_HDR_SIZE + body.len());
    out.extend_from_slice(&hdr);
    out.extend_from_slice(body);
    Ok(out)
}

/// Попытка разобрать кадр с начала `buf`.
///
/// Порядок проверок: полный заголовок → magic → лимит длины → полный body →
/// checksum → десериализация body. Ok(NeedMore) — не ошибка: нужно дочитать.
pub fn try_decode_frame<P: DeserializeOwned>(buf: &[u8]) -> Result<Decoded<P>, FrameError> {
    if buf.len() < FRAME_HDR_SIZE {
        return Ok(Decoded::NeedMore);
    }

    let magic = BigEndian::read_u32(&buf[FRAME_OFF_MAGIC..FRAME_OFF_MAGIC + 4]);
    if magic != JOURNAL_MAGIC {
        return Err(FrameError::BadMagic(magic));
    }

    let len = BigEndian::read_u32(&buf[FRAME_OFF_LEN..FRAME_OFF_LEN + 4]);
    if len > MAX_BODY_LEN {
        return Err(FrameError::Oversized(len));
    }
    let frame_len = FRAME_HDR_SIZE + len as usize;
    if buf.len() < frame_len {
        return Ok(Decoded::NeedMore);
    }

    let body = &buf[FRAME_HDR_SIZE..frame_len];
    let stored = &buf[FRAME_OFF_CHECKSUM..FRAME_OFF_CHECKSUM + CHECKSUM_LEN];
    if stored != checksum(body) {
        return Err(FrameError::ChecksumMismatch);
    }

    let record = decode_body::<P>(body)?;
    Ok(Decoded::Frame { record, frame_len })
}

/// Позиция первого вхождения magic в `buf` (с начала).
#[inline]
pub fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC_LEN).position(|w| w == MAGIC_BYTES)
}

/// Resync внутри буфера: отбросить первый байт и найти следующий magic.
/// Возвращает смещение от начала `buf`; None — в буфере magic больше нет.
pub fn resynchronize(buf: &[u8]) -> Option<usize> {
    if buf.len() <= 1 {
        return None;
    }
    find_magic(&buf[1..]).map(|off| off + 1)
}

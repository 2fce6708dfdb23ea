//! PostgreSQL binary COPY codec for sample rows.
//!
//! Every row carries four fixed-width fields: AppId (int2), CounterId (int2),
//! Timestamp (int8, microseconds since 2000-01-01) and Value (float4).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, NaiveDateTime};

use crate::data::{AppId, CounterId, SampleRow};

pub const SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

/// Seconds between the Unix epoch and the PostgreSQL epoch (2000-01-01).
const PG_EPOCH_OFFSET_MICROS: i64 = 946_684_800 * 1_000_000;

const FIELD_COUNT: i16 = 4;
const TRAILER: i16 = -1;
const HEADER_LEN: usize = SIGNATURE.len() + 4 + 4;
const ROW_LEN: usize = 2 + (4 + 2) + (4 + 2) + (4 + 8) + (4 + 4);

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("missing binary copy signature")]
    BadSignature,

    #[error("unexpected end of copy data")]
    Truncated,

    #[error("row has {0} fields, expected 4")]
    FieldCount(i16),

    #[error("field {field} has length {len}, expected {expected}")]
    FieldLength { field: usize, len: i32, expected: i32 },

    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(String),

    #[error("trailing bytes after copy trailer")]
    TrailingData,
}

fn to_pg_micros(ts: NaiveDateTime) -> Result<i64, CopyError> {
    ts.and_utc()
        .timestamp_micros()
        .checked_sub(PG_EPOCH_OFFSET_MICROS)
        .ok_or_else(|| CopyError::TimestampOutOfRange(ts.to_string()))
}

fn from_pg_micros(micros: i64) -> Result<NaiveDateTime, CopyError> {
    micros
        .checked_add(PG_EPOCH_OFFSET_MICROS)
        .and_then(DateTime::from_timestamp_micros)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| CopyError::TimestampOutOfRange(format!("{}us", micros)))
}

/// Encode rows as one complete binary COPY stream (header, rows, trailer).
pub fn encode_rows(rows: &[SampleRow]) -> Result<Bytes, CopyError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + rows.len() * ROW_LEN + 2);

    buf.put_slice(SIGNATURE);
    buf.put_i32(0); // flags
    buf.put_i32(0); // header extension length

    for row in rows {
        buf.put_i16(FIELD_COUNT);
        buf.put_i32(2);
        buf.put_i16(row.app_id.get());
        buf.put_i32(2);
        buf.put_i16(row.counter_id.get());
        buf.put_i32(8);
        buf.put_i64(to_pg_micros(row.timestamp)?);
        buf.put_i32(4);
        buf.put_f32(row.value);
    }

    buf.put_i16(TRAILER);
    Ok(buf.freeze())
}

fn need(data: &[u8], n: usize) -> Result<(), CopyError> {
    if data.remaining() < n {
        Err(CopyError::Truncated)
    } else {
        Ok(())
    }
}

fn read_field_len(data: &mut &[u8], field: usize, expected: i32) -> Result<(), CopyError> {
    need(data, 4)?;
    let len = data.get_i32();
    if len != expected {
        return Err(CopyError::FieldLength {
            field,
            len,
            expected,
        });
    }
    need(data, expected as usize)
}

/// Decode a complete binary COPY stream produced by [`encode_rows`].
pub fn decode_rows(mut data: &[u8]) -> Result<Vec<SampleRow>, CopyError> {
    need(data, HEADER_LEN)?;
    if &data[..SIGNATURE.len()] != SIGNATURE {
        return Err(CopyError::BadSignature);
    }
    data.advance(SIGNATURE.len());
    let _flags = data.get_i32();
    let extension = data.get_i32().max(0) as usize;
    need(data, extension)?;
    data.advance(extension);

    let mut rows = Vec::with_capacity(data.remaining() / ROW_LEN);
    loop {
        need(data, 2)?;
        let fields = data.get_i16();
        if fields == TRAILER {
            break;
        }
        if fields != FIELD_COUNT {
            return Err(CopyError::FieldCount(fields));
        }

        read_field_len(&mut data, 0, 2)?;
        let app_id = AppId::new(data.get_i16());
        read_field_len(&mut data, 1, 2)?;
        let counter_id = CounterId::from_raw(data.get_i16());
        read_field_len(&mut data, 2, 8)?;
        let timestamp = from_pg_micros(data.get_i64())?;
        read_field_len(&mut data, 3, 4)?;
        let value = data.get_f32();

        rows.push(SampleRow {
            app_id,
            counter_id,
            timestamp,
            value,
        });
    }

    if data.has_remaining() {
        return Err(CopyError::TrailingData);
    }
    Ok(rows)
}

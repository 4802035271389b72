//! Key and value layout of the bucket hierarchy inside a single sled tree.
//!
//! A bucket path `a/b` encodes as `a 0x00 b 0x00`. A direct entry `k` of that
//! bucket is stored under `a 0x00 b 0x00 0x01 k`, so a prefix scan over
//! `<bucket> 0x01` yields exactly the bucket's direct entries, in key order.
//! Values carry a one-byte tag: sub-bucket marker or record.

use crate::error::StoreError;
use crate::types::BucketPath;

const SEGMENT_END: u8 = 0x00;
const ENTRY_MARK: u8 = 0x01;

const BUCKET_TAG: u8 = 0x00;
const RECORD_TAG: u8 = 0x01;

/// Decoded value of a bucket entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Bucket,
    Record(Vec<u8>),
}

pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.bytes().any(|b| b == SEGMENT_END || b == ENTRY_MARK) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn bucket_prefix(bucket: &BucketPath) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    for segment in bucket.segments() {
        validate_name(segment)?;
        out.extend_from_slice(segment.as_bytes());
        out.push(SEGMENT_END);
    }
    Ok(out)
}

/// Prefix shared by every direct entry of `bucket`.
pub fn entries_prefix(bucket: &BucketPath) -> Result<Vec<u8>, StoreError> {
    let mut out = bucket_prefix(bucket)?;
    out.push(ENTRY_MARK);
    Ok(out)
}

pub fn entry_key(bucket: &BucketPath, key: &str) -> Result<Vec<u8>, StoreError> {
    validate_name(key)?;
    let mut out = entries_prefix(bucket)?;
    out.extend_from_slice(key.as_bytes());
    Ok(out)
}

pub fn encode_bucket_marker() -> Vec<u8> {
    vec![BUCKET_TAG]
}

pub fn encode_record(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(RECORD_TAG);
    out.extend_from_slice(value);
    out
}

pub fn decode_value(raw: &[u8]) -> Result<StoredValue, StoreError> {
    match raw.split_first() {
        Some((&BUCKET_TAG, [])) => Ok(StoredValue::Bucket),
        Some((&RECORD_TAG, rest)) => Ok(StoredValue::Record(rest.to_vec())),
        Some((tag, _)) => Err(StoreError::Corrupt(format!("unknown value tag {:#04x}", tag))),
        None => Err(StoreError::Corrupt("empty value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_entries_do_not_share_prefix_with_nested() {
        let playlists = BucketPath::playlists();
        let direct = entries_prefix(&playlists).unwrap();
        let nested = entry_key(&playlists.child("mix"), "song").unwrap();
        assert!(!nested.starts_with(&direct));
        let own = entry_key(&playlists, "mix").unwrap();
        assert!(own.starts_with(&direct));
    }

    #[test]
    fn test_rejects_separator_bytes() {
        assert!(validate_name("").is_err());
        assert!(validate_name("a\u{0}b").is_err());
        assert!(validate_name("\u{1}a").is_err());
        assert!(validate_name("fine name.mp3").is_ok());
    }

    #[test]
    fn test_value_tags() {
        assert_eq!(
            decode_value(&encode_bucket_marker()).unwrap(),
            StoredValue::Bucket
        );
        assert_eq!(
            decode_value(&encode_record(b"{}")).unwrap(),
            StoredValue::Record(b"{}".to_vec())
        );
        assert!(decode_value(&[]).is_err());
        assert!(decode_value(&[0x07]).is_err());
    }
}

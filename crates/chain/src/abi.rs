//! Minimal ABI word decoding for the registry event payloads.
//!
//! Only the shapes the three registry events actually use are supported:
//! static words (`uint256`, `bytes32`, `bool`) and dynamic `string`,
//! `bytes`, and `string[]` referenced through head offsets. Every access is
//! bounds-checked; a malformed payload yields `None` and the log is skipped
//! upstream.

use alloy_primitives::{B256, U256};

const WORD: usize = 32;

/// Cursor over an ABI-encoded payload.
pub(crate) struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, index: usize) -> Option<&'a [u8]> {
        let start = index.checked_mul(WORD)?;
        let end = start.checked_add(WORD)?;
        self.data.get(start..end)
    }

    /// Read the static word at head position `index` as a U256.
    pub(crate) fn u256(&self, index: usize) -> Option<U256> {
        self.word(index).map(U256::from_be_slice)
    }

    /// Read the static word at head position `index` as a B256.
    pub(crate) fn b256(&self, index: usize) -> Option<B256> {
        self.word(index).map(B256::from_slice)
    }

    /// Read the static word at head position `index` as a bool.
    ///
    /// Strict: anything other than 0 or 1 is malformed.
    pub(crate) fn bool(&self, index: usize) -> Option<bool> {
        let value = self.u256(index)?;
        if value == U256::ZERO {
            Some(false)
        } else if value == U256::from(1u8) {
            Some(true)
        } else {
            None
        }
    }

    /// Read the head word at `index` as a byte offset into the payload.
    fn offset(&self, index: usize) -> Option<usize> {
        let value = self.u256(index)?;
        // Offsets in any real payload fit comfortably in usize.
        if value > U256::from(u32::MAX) {
            return None;
        }
        Some(value.to::<u64>() as usize)
    }

    /// Length-prefixed byte sequence at absolute offset `at`.
    fn dynamic_bytes_at(&self, at: usize) -> Option<&'a [u8]> {
        let len_word = self.data.get(at..at.checked_add(WORD)?)?;
        let len = U256::from_be_slice(len_word);
        if len > U256::from(u32::MAX) {
            return None;
        }
        let len = len.to::<u64>() as usize;
        let start = at.checked_add(WORD)?;
        self.data.get(start..start.checked_add(len)?)
    }

    /// `bytes` value whose offset lives at head position `index`.
    pub(crate) fn bytes(&self, index: usize) -> Option<Vec<u8>> {
        let at = self.offset(index)?;
        self.dynamic_bytes_at(at).map(|b| b.to_vec())
    }

    /// `string` value whose offset lives at head position `index`.
    pub(crate) fn string(&self, index: usize) -> Option<String> {
        let at = self.offset(index)?;
        let bytes = self.dynamic_bytes_at(at)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    /// `string[]` value whose offset lives at head position `index`.
    ///
    /// Element offsets are relative to the start of the array body, per the
    /// ABI spec for arrays of dynamic types.
    pub(crate) fn string_array(&self, index: usize) -> Option<Vec<String>> {
        let at = self.offset(index)?;
        let len_word = self.data.get(at..at.checked_add(WORD)?)?;
        let len = U256::from_be_slice(len_word);
        if len > U256::from(1u64 << 16) {
            return None;
        }
        let len = len.to::<u64>() as usize;

        let body = at.checked_add(WORD)?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let slot = body.checked_add(i.checked_mul(WORD)?)?;
            let offset_word = self.data.get(slot..slot.checked_add(WORD)?)?;
            let rel = U256::from_be_slice(offset_word);
            if rel > U256::from(u32::MAX) {
                return None;
            }
            let abs = body.checked_add(rel.to::<u64>() as usize)?;
            let bytes = self.dynamic_bytes_at(abs)?;
            out.push(String::from_utf8(bytes.to_vec()).ok()?);
        }
        Some(out)
    }
}

/// ABI encoder for building event payloads (fixtures and mock delivery).
#[cfg(any(test, feature = "test-utils"))]
pub(crate) mod encode {
    use super::WORD;
    use alloy_primitives::{B256, U256};

    fn push_word(out: &mut Vec<u8>, value: U256) {
        out.extend_from_slice(&value.to_be_bytes::<WORD>());
    }

    fn padded(bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        let rem = out.len() % WORD;
        if rem != 0 {
            out.resize(out.len() + (WORD - rem), 0);
        }
        out
    }

    fn dynamic_bytes(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(WORD + bytes.len() + WORD);
        push_word(&mut out, U256::from(bytes.len()));
        out.extend_from_slice(&padded(bytes));
        out
    }

    fn string_array(items: &[String]) -> Vec<u8> {
        let mut body = Vec::new();
        push_word(&mut body, U256::from(items.len()));
        let tails: Vec<Vec<u8>> = items
            .iter()
            .map(|item| dynamic_bytes(item.as_bytes()))
            .collect();
        // Offsets are relative to the start of the array body (after the
        // length word).
        let head_len = items.len() * WORD;
        let mut offset = head_len;
        for tail in &tails {
            push_word(&mut body, U256::from(offset));
            offset += tail.len();
        }
        for tail in tails {
            body.extend_from_slice(&tail);
        }
        body
    }

    /// Head slot for ABI tuple encoding: either a static word or a pointer
    /// to dynamic tail data.
    pub(crate) enum Value {
        Word(U256),
        Bytes32(B256),
        Bool(bool),
        Bytes(Vec<u8>),
        Str(String),
        StrArray(Vec<String>),
    }

    /// Encode a tuple of values into an ABI payload.
    pub(crate) fn tuple(values: &[Value]) -> Vec<u8> {
        let head_len = values.len() * WORD;
        let mut head = Vec::with_capacity(head_len);
        let mut tail = Vec::new();
        for value in values {
            match value {
                Value::Word(v) => push_word(&mut head, *v),
                Value::Bytes32(v) => head.extend_from_slice(v.as_slice()),
                Value::Bool(v) => push_word(&mut head, U256::from(u8::from(*v))),
                Value::Bytes(v) => {
                    push_word(&mut head, U256::from(head_len + tail.len()));
                    tail.extend_from_slice(&dynamic_bytes(v));
                }
                Value::Str(v) => {
                    push_word(&mut head, U256::from(head_len + tail.len()));
                    tail.extend_from_slice(&dynamic_bytes(v.as_bytes()));
                }
                Value::StrArray(v) => {
                    push_word(&mut head, U256::from(head_len + tail.len()));
                    tail.extend_from_slice(&string_array(v));
                }
            }
        }
        head.extend_from_slice(&tail);
        head
    }
}

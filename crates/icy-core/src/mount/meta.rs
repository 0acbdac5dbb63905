//! ICY in-band metadata block encoding.
//!
//! Wire format (see `getIcyMeta` in the original server): one length byte `N`, followed by
//! `16*N` bytes of ASCII/UTF-8 text, NUL-padded to fill the block. `N` counts 16-byte chunks,
//! so the block's total size on the wire is always `1 + 16*N` bytes, with `N == 0` meaning
//! "no title change" (a single zero byte, no payload).

use crate::constants::{META_BLOCK_MAX_PAYLOAD, META_BLOCK_STRIDE};

/// An encoded ICY metadata block, ready to be spliced into a listener's audio stream.
#[derive(Clone, Debug)]
pub struct MetaBlock {
    bytes: Vec<u8>,
}

impl MetaBlock {
    /// The empty block: a single zero byte, meaning "nothing changed".
    pub fn empty() -> Self {
        Self { bytes: vec![0u8] }
    }

    /// Encodes `title` as a `StreamTitle` metadata block, truncating if the formatted text
    /// would not fit in the largest encodable block (255 chunks of 16 bytes).
    pub fn encode_title(title: &str) -> Self {
        let mut text = format!("StreamTitle='{}';", sanitize(title)).into_bytes();
        if text.len() > META_BLOCK_MAX_PAYLOAD {
            text.truncate(META_BLOCK_MAX_PAYLOAD);
        }
        let chunks = (text.len() + META_BLOCK_STRIDE - 1) / META_BLOCK_STRIDE;
        let payload_len = chunks * META_BLOCK_STRIDE;
        text.resize(payload_len, 0u8);

        let mut bytes = Vec::with_capacity(1 + payload_len);
        bytes.push(chunks as u8);
        bytes.extend_from_slice(&text);
        Self { bytes }
    }

    /// The block as it should be written to the wire, header byte included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total size on the wire, `1 + 16*N`.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether this is the empty "nothing changed" block.
    pub fn is_empty_block(&self) -> bool {
        self.bytes.len() == 1 && self.bytes[0] == 0
    }
}

impl Default for MetaBlock {
    fn default() -> Self {
        Self::empty()
    }
}

/// Strips characters that would break the `StreamTitle='...'` quoting the block's readers
/// expect: embedded single quotes and control characters.
fn sanitize(title: &str) -> String {
    title
        .chars()
        .filter(|c| *c != '\'' && !c.is_control())
        .collect()
}

/// Best-effort decode of a raw `song=`/title query value into UTF-8.
///
/// Mirrors `updateMeta`'s use of `golang.org/x/net/html/charset` to cope with sources that
/// send metadata in a legacy encoding rather than UTF-8: most modern sources already send
/// valid UTF-8, but a sizable fraction of real-world ICY sources (particularly older Winamp
/// and SAM Broadcaster encoders outside English-speaking markets) send Windows-1251. Anything
/// that decodes as neither is reported as `None`, which callers treat as "drop the update".
pub fn decode_song_text(raw: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(raw) {
        return Some(s.to_string());
    }
    let (decoded, _encoding, had_errors) = encoding_rs::WINDOWS_1251.decode(raw);
    if had_errors {
        None
    } else {
        Some(decoded.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_is_one_zero_byte() {
        let block = MetaBlock::empty();
        assert_eq!(block.bytes(), &[0u8]);
        assert!(block.is_empty_block());
    }

    #[test]
    fn short_title_pads_to_one_chunk() {
        let block = MetaBlock::encode_title("Hello");
        // "StreamTitle='Hello';" is 21 bytes, needs 2 chunks (32 bytes).
        assert_eq!(block.bytes()[0], 2);
        assert_eq!(block.len(), 1 + 32);
        let text = &block.bytes()[1..];
        assert!(text.starts_with(b"StreamTitle='Hello';"));
        assert!(text[21..].iter().all(|&b| b == 0));
    }

    #[test]
    fn title_with_quote_is_sanitized() {
        let block = MetaBlock::encode_title("Guns N' Roses");
        let chunks = block.bytes()[0] as usize;
        let text = &block.bytes()[1..1 + chunks * 16];
        let as_str = std::str::from_utf8(text).unwrap().trim_end_matches('\0');
        assert_eq!(as_str, "StreamTitle='Guns N Roses';");
    }

    #[test]
    fn overlong_title_is_truncated_to_max_block() {
        let long = "x".repeat(10_000);
        let block = MetaBlock::encode_title(&long);
        assert_eq!(block.bytes()[0], 255);
        assert_eq!(block.len(), 1 + META_BLOCK_MAX_PAYLOAD);
    }

    #[test]
    fn decode_song_text_accepts_utf8() {
        assert_eq!(decode_song_text("Déjà Vu".as_bytes()).as_deref(), Some("Déjà Vu"));
    }

    #[test]
    fn decode_song_text_falls_back_to_windows_1251() {
        let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode("Кино");
        let decoded = decode_song_text(&encoded).unwrap();
        assert_eq!(decoded, "Кино");
    }
}

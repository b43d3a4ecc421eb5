use crate::error::SessionError;

/// The character sets the streaming decoder can be switched between.
///
/// Covers the charset candidate table from the metadata probe's language
/// detection (see `installer_probe`): UTF-8 first, then the regional code
/// pages a mod's per-language text is plausibly encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Utf8,
    Windows1252,
    Windows1250,
    Ibm866,
    Windows1251,
    Big5,
    Gbk,
    ShiftJis,
    Cp949,
    EucKr,
}

impl Charset {
    pub(crate) fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            Charset::Utf8 => encoding_rs::UTF_8,
            Charset::Windows1252 => encoding_rs::WINDOWS_1252,
            Charset::Windows1250 => encoding_rs::WINDOWS_1250,
            Charset::Ibm866 => encoding_rs::IBM866,
            Charset::Windows1251 => encoding_rs::WINDOWS_1251,
            Charset::Big5 => encoding_rs::BIG5,
            Charset::Gbk => encoding_rs::GBK,
            Charset::ShiftJis => encoding_rs::SHIFT_JIS,
            // encoding_rs has no distinct CP949 table; windows-949 (its EUC_KR
            // decoder) is a strict superset of EUC-KR and is what Windows
            // actually ships under the name "CP949".
            Charset::Cp949 => encoding_rs::EUC_KR,
            Charset::EucKr => encoding_rs::EUC_KR,
        }
    }

    fn is_single_byte(self) -> bool {
        matches!(
            self,
            Charset::Windows1252 | Charset::Windows1250 | Charset::Ibm866 | Charset::Windows1251
        )
    }
}

/// Whether a malformed byte sequence aborts the decode or is papered over
/// with a replacement character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
    FailFast,
    Replace,
}

/// Decodes a stream of byte chunks into text under a changeable charset,
/// preserving any trailing bytes that don't yet form a complete code point.
///
/// See `decode`/`set_charset` for the two operations; both are specified in
/// terms of three pieces of state: the full raw byte buffer (so a charset
/// switch can rebuild text from scratch), the remaining-byte tail, and the
/// decoded text mirror.
pub struct StreamingDecoder {
    charset: Charset,
    policy: DecodePolicy,
    raw: Vec<u8>,
    tail: Vec<u8>,
    mirror: String,
}

impl StreamingDecoder {
    pub fn new(charset: Charset, policy: DecodePolicy) -> Self {
        Self {
            charset,
            policy,
            raw: Vec::new(),
            tail: Vec::new(),
            mirror: String::new(),
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    pub fn raw_buffer(&self) -> &[u8] {
        &self.raw
    }

    pub fn mirror_text(&self) -> &str {
        &self.mirror
    }

    /// Decodes one chunk, returning the text segment produced by this call.
    ///
    /// The entire chunk is appended to the raw buffer regardless of how much
    /// of it decodes cleanly, so a later `set_charset` can always rebuild
    /// from scratch.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, SessionError> {
        self.raw.extend_from_slice(chunk);

        let mut input = std::mem::take(&mut self.tail);
        input.extend_from_slice(chunk);

        let tail_len = incomplete_tail_len(self.charset, &input);
        let split_at = input.len() - tail_len;
        let (decodable, new_tail) = input.split_at(split_at);

        let text = self.decode_complete(decodable)?;
        self.tail = new_tail.to_vec();
        self.mirror.push_str(&text);
        Ok(text)
    }

    /// Switches the active charset. A no-op if `new` equals the current
    /// charset; otherwise resets decoder state and re-decodes the entire
    /// raw buffer under `new`.
    pub fn set_charset(&mut self, new: Charset) -> Result<(), SessionError> {
        if new == self.charset {
            return Ok(());
        }
        self.charset = new;
        self.rebuild_from_raw()
    }

    /// Switches the error policy. Equivalent to resetting the decoder and
    /// re-decoding from the raw buffer under the (unchanged) charset.
    pub fn set_policy(&mut self, new: DecodePolicy) -> Result<(), SessionError> {
        if new == self.policy {
            return Ok(());
        }
        self.policy = new;
        self.rebuild_from_raw()
    }

    fn rebuild_from_raw(&mut self) -> Result<(), SessionError> {
        self.tail.clear();
        self.mirror.clear();
        let raw = self.raw.clone();
        let tail_len = incomplete_tail_len(self.charset, &raw);
        let split_at = raw.len() - tail_len;
        let text = self.decode_complete(&raw[..split_at])?;
        self.tail = raw[split_at..].to_vec();
        self.mirror = text;
        Ok(())
    }

    fn decode_complete(&self, bytes: &[u8]) -> Result<String, SessionError> {
        if bytes.is_empty() {
            return Ok(String::new());
        }
        let (cow, had_errors) = self.charset.encoding().decode_without_bom_handling(bytes);
        match self.policy {
            DecodePolicy::Replace => Ok(cow.into_owned()),
            DecodePolicy::FailFast => {
                if had_errors {
                    Err(SessionError::MalformedEncoding)
                } else {
                    Ok(cow.into_owned())
                }
            }
        }
    }
}

/// Length of the trailing suffix of `bytes` that is a valid-so-far prefix of
/// a longer code unit under `charset` and should be held back as tail.
fn incomplete_tail_len(charset: Charset, bytes: &[u8]) -> usize {
    if charset.is_single_byte() {
        return 0;
    }
    if charset == Charset::Utf8 {
        return utf8_incomplete_tail_len(bytes);
    }
    double_byte_incomplete_tail_len(charset, bytes)
}

fn utf8_seq_len(lead: u8) -> Option<usize> {
    if lead & 0x80 == 0 {
        Some(1)
    } else if lead & 0xE0 == 0xC0 {
        Some(2)
    } else if lead & 0xF0 == 0xE0 {
        Some(3)
    } else if lead & 0xF8 == 0xF0 {
        Some(4)
    } else {
        None
    }
}

fn utf8_incomplete_tail_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let max_back = len.min(4);
    for back in 1..=max_back {
        let idx = len - back;
        let b = bytes[idx];
        if let Some(seq_len) = utf8_seq_len(b) {
            if seq_len <= back {
                return 0;
            }
            let continuation_ok = bytes[idx + 1..].iter().all(|&c| (c & 0xC0) == 0x80);
            return if continuation_ok { back } else { 0 };
        }
        // else: continuation byte (0x80..=0xBF); keep walking back.
    }
    0
}

fn double_byte_lead_byte(charset: Charset, b: u8) -> bool {
    match charset {
        Charset::ShiftJis => matches!(b, 0x81..=0x9F | 0xE0..=0xFC),
        Charset::Big5 | Charset::Gbk | Charset::Cp949 | Charset::EucKr => matches!(b, 0x81..=0xFE),
        _ => false,
    }
}

fn double_byte_incomplete_tail_len(charset: Charset, bytes: &[u8]) -> usize {
    match bytes.last() {
        Some(&last) if double_byte_lead_byte(charset, last) => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_monotone_across_a_split_multibyte_boundary() {
        let text = "héllo wörld";
        let bytes = text.as_bytes();
        // Split inside the multi-byte 'ö' (0xC3 0xB6).
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let (b1, b2) = bytes.split_at(split);

        let mut whole = StreamingDecoder::new(Charset::Utf8, DecodePolicy::FailFast);
        let whole_text = whole.decode(bytes).unwrap();

        let mut split_decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::FailFast);
        let mut out = String::new();
        out.push_str(&split_decoder.decode(b1).unwrap());
        out.push_str(&split_decoder.decode(b2).unwrap());

        assert_eq!(out, whole_text);
        assert_eq!(out, text);
        assert!(split_decoder.tail().is_empty());
    }

    #[test]
    fn tail_holds_incomplete_lead_byte_until_continuation_arrives() {
        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::FailFast);
        let first = decoder.decode(&[b'a', 0xC3]).unwrap();
        assert_eq!(first, "a");
        assert_eq!(decoder.tail(), &[0xC3]);

        let second = decoder.decode(&[0xB6, b'b']).unwrap();
        assert_eq!(second, "\u{f6}b");
        assert!(decoder.tail().is_empty());
        assert_eq!(decoder.mirror_text(), "a\u{f6}b");
    }

    #[test]
    fn fail_fast_surfaces_malformed_encoding() {
        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::FailFast);
        let err = decoder.decode(&[0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, SessionError::MalformedEncoding));
    }

    #[test]
    fn replace_policy_never_fails() {
        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::Replace);
        let text = decoder.decode(&[0xFF, 0xFE]).unwrap();
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn charset_switch_rebuilds_from_raw_buffer() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode("Привет");
        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::Replace);
        let _ = decoder.decode(&bytes).unwrap();

        decoder.set_charset(Charset::Windows1251).unwrap();
        assert_eq!(decoder.mirror_text(), "Привет");
    }

    #[test]
    fn set_charset_to_current_value_is_a_no_op() {
        let mut decoder = StreamingDecoder::new(Charset::Utf8, DecodePolicy::Replace);
        let _ = decoder.decode(b"hello").unwrap();
        decoder.set_charset(Charset::Utf8).unwrap();
        assert_eq!(decoder.mirror_text(), "hello");
    }
}

use crate::error::IpcError;

/// Magic identifier that must lead every IPC wire line.
const MAGIC: &str = "wit";
const SEMICOLON_ESCAPE: &str = ":semicolon:";

/// The fixed set of inter-instance message types, with their declared
/// minimum content arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ReqPing,
    AckPing,
    ReqExec,
    AckExec,
    ReqTerm,
    AckTerm,
}

impl MessageType {
    pub fn code(self) -> u32 {
        match self {
            MessageType::ReqPing => 0,
            MessageType::AckPing => 1,
            MessageType::ReqExec => 2,
            MessageType::AckExec => 3,
            MessageType::ReqTerm => 9,
            MessageType::AckTerm => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(MessageType::ReqPing),
            1 => Some(MessageType::AckPing),
            2 => Some(MessageType::ReqExec),
            3 => Some(MessageType::AckExec),
            9 => Some(MessageType::ReqTerm),
            10 => Some(MessageType::AckTerm),
            _ => None,
        }
    }

    /// Declared minimum content arity. `ReqExec` has no upper bound.
    pub fn min_arity(self) -> usize {
        match self {
            MessageType::ReqPing => 1,
            MessageType::AckPing => 0,
            MessageType::ReqExec => 0,
            MessageType::AckExec => 1,
            MessageType::ReqTerm => 0,
            MessageType::AckTerm => 0,
        }
    }
}

/// A decoded (or to-be-encoded) inter-instance message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcMessage {
    pub message_type: MessageType,
    pub content: Vec<String>,
}

impl IpcMessage {
    pub fn req_ping(bring_to_front: bool) -> Self {
        Self {
            message_type: MessageType::ReqPing,
            content: vec![bool_field(bring_to_front)],
        }
    }

    pub fn ack_ping() -> Self {
        Self {
            message_type: MessageType::AckPing,
            content: Vec::new(),
        }
    }

    pub fn req_exec(argv: Vec<String>) -> Self {
        Self {
            message_type: MessageType::ReqExec,
            content: argv,
        }
    }

    pub fn ack_exec(accepted: bool) -> Self {
        Self {
            message_type: MessageType::AckExec,
            content: vec![bool_field(accepted)],
        }
    }

    pub fn req_term() -> Self {
        Self {
            message_type: MessageType::ReqTerm,
            content: Vec::new(),
        }
    }

    pub fn ack_term() -> Self {
        Self {
            message_type: MessageType::AckTerm,
            content: Vec::new(),
        }
    }

    /// Interprets `content[0]` as a `"true"`/`"false"` boolean field.
    pub fn bool_content(&self, index: usize) -> Option<bool> {
        self.content.get(index).map(|s| s == "true")
    }

    /// Serializes to the wire format: `wit;<type>;<content>*;\n`, with
    /// literal `;` characters in content fields escaped to `:semicolon:`.
    /// Rejects a content field containing an embedded newline, which the
    /// line-oriented format has no way to carry.
    pub fn encode(&self) -> Result<String, IpcError> {
        if self.content.len() < self.message_type.min_arity() {
            return Err(IpcError::ArityMismatch);
        }
        let mut out = String::from(MAGIC);
        out.push(';');
        out.push_str(&self.message_type.code().to_string());
        out.push(';');
        for field in &self.content {
            if field.contains('\n') {
                return Err(IpcError::EmbeddedNewline);
            }
            out.push_str(&field.replace(';', SEMICOLON_ESCAPE));
            out.push(';');
        }
        out.push('\n');
        Ok(out)
    }

    /// Parses one wire line (trailing `\n`/`\r\n` is tolerated but not
    /// required). A decoded record must carry at least its message type's
    /// declared arity; extra trailing empty fields (the wire format's
    /// trailing `;` before the newline, or lenient omission of optional
    /// content) are stripped rather than treated as content.
    pub fn decode(line: &str) -> Result<Self, IpcError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields: Vec<&str> = line.split(';').collect();

        if fields.first() != Some(&MAGIC) {
            return Err(IpcError::InvalidFraming);
        }
        fields.remove(0);

        let type_token = fields.first().copied().ok_or(IpcError::InvalidFraming)?;
        let code: u32 = type_token.parse().map_err(|_| IpcError::InvalidFraming)?;
        fields.remove(0);

        let message_type = MessageType::from_code(code).ok_or(IpcError::UnsupportedType(code))?;

        while fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }

        if fields.len() < message_type.min_arity() {
            return Err(IpcError::ArityMismatch);
        }

        let content = fields
            .into_iter()
            .map(|field| field.replace(SEMICOLON_ESCAPE, ";"))
            .collect();

        Ok(Self {
            message_type,
            content,
        })
    }
}

fn bool_field(value: bool) -> String {
    if value {
        "true".to_string()
    } else {
        "false".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_req_exec_with_semicolon_in_payload_round_trips() {
        let message = IpcMessage::req_exec(vec!["hi;there".to_string(), "x".to_string()]);
        let wire = message.encode().unwrap();
        assert_eq!(wire, "wit;2;hi:semicolon:there;x;\n");

        let decoded = IpcMessage::decode(&wire).unwrap();
        assert_eq!(decoded.message_type, MessageType::ReqExec);
        assert_eq!(decoded.content, vec!["hi;there", "x"]);
    }

    #[test]
    fn fixed_arity_zero_message_round_trips_with_trailing_empty_field() {
        let message = IpcMessage::ack_ping();
        let wire = message.encode().unwrap();
        assert_eq!(wire, "wit;1;\n");
        let decoded = IpcMessage::decode(&wire).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_tolerates_extra_trailing_empty_fields() {
        let decoded = IpcMessage::decode("wit;9;;;\n").unwrap();
        assert_eq!(decoded.message_type, MessageType::ReqTerm);
        assert!(decoded.content.is_empty());
    }

    #[test]
    fn decode_rejects_wrong_magic_identifier() {
        let err = IpcMessage::decode("nope;1;\n").unwrap_err();
        assert!(matches!(err, IpcError::InvalidFraming));
    }

    #[test]
    fn decode_rejects_unknown_type_code() {
        let err = IpcMessage::decode("wit;77;\n").unwrap_err();
        assert!(matches!(err, IpcError::UnsupportedType(77)));
    }

    #[test]
    fn decode_rejects_under_arity_content() {
        let err = IpcMessage::decode("wit;0;\n").unwrap_err();
        assert!(matches!(err, IpcError::ArityMismatch));
    }

    #[test]
    fn encode_rejects_embedded_newline() {
        let message = IpcMessage::req_exec(vec!["line1\nline2".to_string()]);
        let err = message.encode().unwrap_err();
        assert!(matches!(err, IpcError::EmbeddedNewline));
    }

    #[test]
    fn req_ping_bool_content_round_trips() {
        let message = IpcMessage::req_ping(true);
        let wire = message.encode().unwrap();
        let decoded = IpcMessage::decode(&wire).unwrap();
        assert_eq!(decoded.bool_content(0), Some(true));
    }
}

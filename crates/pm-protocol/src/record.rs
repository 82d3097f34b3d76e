//! Structured payload encodings.
//!
//! Per-process records concatenate with no separator:
//!
//! ```text
//! name NUL f64-le            get_memory, get_cpu
//! name NUL i32-le            get_pid
//! name NUL text NUL          get_uptime
//! ```
//!
//! The `list` payload pairs two free-form text fields instead, so entries
//! are `name NUL command` joined by a double NUL.

use crate::response::DecodeError;

const NUL: u8 = 0;
const LIST_SEPARATOR: &[u8] = b"\x00\x00";

/// Value half of a per-process record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Pid(i32),
    Text(String),
}

/// Layout of the value half, needed to decode a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Float,
    Pid,
    Text,
}

/// One `name -> value` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub value: Value,
}

impl Record {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.name.as_bytes());
        out.push(NUL);
        match &self.value {
            Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Pid(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Text(v) => {
                out.extend_from_slice(v.as_bytes());
                out.push(NUL);
            }
        }
    }
}

/// Encodes records back to back.
pub fn encode_records(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        record.encode_into(&mut out);
    }
    out
}

/// Decodes a payload produced by [`encode_records`].
pub fn decode_records(payload: &[u8], kind: RecordKind) -> Result<Vec<Record>, DecodeError> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let name = read_text(payload, &mut offset)?;
        let value = match kind {
            RecordKind::Float => Value::Float(f64::from_le_bytes(read_fixed::<8>(payload, &mut offset)?)),
            RecordKind::Pid => Value::Pid(i32::from_le_bytes(read_fixed::<4>(payload, &mut offset)?)),
            RecordKind::Text => Value::Text(read_text(payload, &mut offset)?),
        };
        records.push(Record { name, value });
    }

    Ok(records)
}

/// Reads a NUL-terminated UTF-8 field starting at `offset`.
fn read_text(payload: &[u8], offset: &mut usize) -> Result<String, DecodeError> {
    let rest = payload
        .get(*offset..)
        .ok_or(DecodeError::Truncated { offset: *offset })?;
    let end = rest
        .iter()
        .position(|&b| b == NUL)
        .ok_or(DecodeError::Truncated { offset: *offset })?;
    let text = rest
        .get(..end)
        .ok_or(DecodeError::Truncated { offset: *offset })?;
    let text = std::str::from_utf8(text).map_err(|_| DecodeError::InvalidUtf8)?;
    *offset += end + 1;
    Ok(text.to_string())
}

fn read_fixed<const N: usize>(payload: &[u8], offset: &mut usize) -> Result<[u8; N], DecodeError> {
    let bytes: [u8; N] = payload
        .get(*offset..*offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(DecodeError::Truncated { offset: *offset })?;
    *offset += N;
    Ok(bytes)
}

/// One row of the `list` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub command: String,
}

impl ListEntry {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Encodes the `list` payload. An empty registry encodes to an empty payload.
pub fn encode_list(entries: &[ListEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(LIST_SEPARATOR);
        }
        out.extend_from_slice(entry.name.as_bytes());
        out.push(NUL);
        out.extend_from_slice(entry.command.as_bytes());
    }
    out
}

/// Decodes a payload produced by [`encode_list`].
pub fn decode_list(payload: &[u8]) -> Result<Vec<ListEntry>, DecodeError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
    let mut entries = Vec::new();
    let mut offset = 0;

    for chunk in text.split("\0\0") {
        let (name, command) = chunk
            .split_once('\0')
            .ok_or(DecodeError::Truncated { offset })?;
        entries.push(ListEntry::new(name, command));
        offset += chunk.len() + LIST_SEPARATOR.len();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_record_layout() {
        let payload = encode_records(&[Record::new("web", Value::Float(1.5))]);
        let mut expected = b"web\x00".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xf8, 0x3f]);
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_pid_record_layout() {
        let payload = encode_records(&[
            Record::new("foo", Value::Pid(4242)),
            Record::new("bar", Value::Pid(-1)),
        ]);
        assert_eq!(
            payload,
            b"foo\x00\x92\x10\x00\x00bar\x00\xff\xff\xff\xff".to_vec()
        );
    }

    #[test]
    fn test_text_record_layout() {
        let payload = encode_records(&[Record::new("foo", Value::Text("0:01:02".into()))]);
        assert_eq!(payload, b"foo\x000:01:02\x00".to_vec());
    }

    #[test]
    fn test_decode_multiple_records() {
        let records = vec![
            Record::new("a", Value::Float(0.0)),
            Record::new("bb", Value::Float(12_345_678.0)),
            Record::new("ccc", Value::Float(99.9)),
        ];
        let decoded = decode_records(&encode_records(&records), RecordKind::Float).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_decode_text_records() {
        let decoded = decode_records(b"a\x001 day, 0:00:01\x00b\x000:00:00\x00", RecordKind::Text).unwrap();
        assert_eq!(
            decoded,
            vec![
                Record::new("a", Value::Text("1 day, 0:00:01".into())),
                Record::new("b", Value::Text("0:00:00".into())),
            ]
        );
    }

    #[test]
    fn test_decode_truncated_records() {
        assert!(matches!(
            decode_records(b"foo\x00\x01\x02", RecordKind::Pid),
            Err(DecodeError::Truncated { offset: 4 })
        ));
        assert!(matches!(
            decode_records(b"foo", RecordKind::Float),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            decode_records(b"foo\x00unterminated", RecordKind::Text),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(decode_records(b"", RecordKind::Pid).unwrap().is_empty());
        assert!(decode_list(b"").unwrap().is_empty());
    }

    #[test]
    fn test_list_layout() {
        let payload = encode_list(&[
            ListEntry::new("web", "python -m http.server"),
            ListEntry::new("job", "sleep 100"),
        ]);
        assert_eq!(
            payload,
            b"web\x00python -m http.server\x00\x00job\x00sleep 100".to_vec()
        );
        assert_eq!(
            decode_list(&payload).unwrap(),
            vec![
                ListEntry::new("web", "python -m http.server"),
                ListEntry::new("job", "sleep 100"),
            ]
        );
    }

    #[test]
    fn test_list_single_entry() {
        let payload = encode_list(&[ListEntry::new("solo", "true")]);
        assert_eq!(payload, b"solo\x00true".to_vec());
        assert_eq!(decode_list(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_list_rejects_missing_command() {
        assert!(decode_list(b"lonely").is_err());
    }
}

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Deepest list/dict nesting accepted from the wire.
const MAX_DEPTH: usize = 32;

/// A bencoded value as spoken by the rtpengine NG control protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn dict() -> Self {
        Value::Dict(BTreeMap::new())
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Dict(map) = self {
            map.insert(key.as_bytes().to_vec(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(map) => map.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Integer(i) => {
                buf.push(b'i');
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.push(b'e');
            }
            Value::Bytes(b) => encode_bytes(b, buf),
            Value::List(items) => {
                buf.push(b'l');
                for item in items {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            Value::Dict(map) => {
                // BTreeMap iterates in raw byte order, which is what bencode requires
                buf.push(b'd');
                for (k, v) in map {
                    encode_bytes(k, buf);
                    v.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }

    pub fn decode(input: &[u8]) -> Result<Self> {
        let mut decoder = Decoder {
            input,
            pos: 0,
            depth: 0,
        };
        let value = decoder.value()?;
        if decoder.pos != input.len() {
            return Err(anyhow!(
                "bencode: trailing {} bytes",
                input.len() - decoder.pos
            ));
        }
        Ok(value)
    }
}

fn encode_bytes(b: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(b.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(b);
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or_else(|| anyhow!("bencode: unexpected end of input"))
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek()? {
            b'l' | b'd' => {
                if self.depth == MAX_DEPTH {
                    return Err(anyhow!("bencode: nesting deeper than {}", MAX_DEPTH));
                }
                self.depth += 1;
                let value = self.container();
                self.depth -= 1;
                value
            }
            b'i' => {
                self.pos += 1;
                let n = self.read_until(b'e')?;
                let n = std::str::from_utf8(n)?
                    .parse::<i64>()
                    .map_err(|e| anyhow!("bencode: bad integer: {}", e))?;
                Ok(Value::Integer(n))
            }
            b'0'..=b'9' => Ok(Value::Bytes(self.bytes()?)),
            c => Err(anyhow!(
                "bencode: unexpected byte {:?} at {}",
                c as char,
                self.pos
            )),
        }
    }

    fn container(&mut self) -> Result<Value> {
        let kind = self.peek()?;
        self.pos += 1;
        if kind == b'l' {
            let mut items = Vec::new();
            while self.peek()? != b'e' {
                items.push(self.value()?);
            }
            self.pos += 1;
            return Ok(Value::List(items));
        }
        let mut map = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = self.bytes()?;
            let value = self.value()?;
            map.insert(key, value);
        }
        self.pos += 1;
        Ok(Value::Dict(map))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_until(b':')?;
        let len = std::str::from_utf8(len)?
            .parse::<usize>()
            .map_err(|e| anyhow!("bencode: bad string length: {}", e))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| anyhow!("bencode: string of {} bytes overruns input", len))?;
        let out = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn read_until(&mut self, delim: u8) -> Result<&'a [u8]> {
        let start = self.pos;
        let offset = self.input[start..]
            .iter()
            .position(|b| *b == delim)
            .ok_or_else(|| anyhow!("bencode: missing {:?}", delim as char))?;
        self.pos = start + offset + 1;
        Ok(&self.input[start..start + offset])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sorts_dictionary_keys() {
        let mut v = Value::dict();
        v.insert("sdp", "v=0");
        v.insert("command", "offer");
        v.insert("flags", vec!["media handover", "port latching"]);
        assert_eq!(
            String::from_utf8(v.encode()).unwrap(),
            "d7:command5:offer5:flagsl14:media handover13:port latchinge3:sdp3:v=0e"
        );
    }

    #[test]
    fn test_decode_nested() {
        let v = Value::decode(b"d6:result2:ok3:sdp3:v=06:countsli1ei-2eee").unwrap();
        assert_eq!(v.get("result").and_then(Value::as_str), Some("ok"));
        assert_eq!(v.get("sdp").and_then(Value::as_str), Some("v=0"));
        assert_eq!(
            v.get("counts"),
            Some(&Value::List(vec![Value::Integer(1), Value::Integer(-2)]))
        );
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        assert!(Value::decode(b"d6:result2:o").is_err());
        assert!(Value::decode(b"5:ab").is_err());
        assert!(Value::decode(b"i12").is_err());
        assert!(Value::decode(b"2:okx").is_err());
    }

    #[test]
    fn test_decode_limits_nesting() {
        let nested = |depth: usize| {
            let mut input = "l".repeat(depth).into_bytes();
            input.extend("e".repeat(depth).into_bytes());
            input
        };
        assert!(Value::decode(&nested(MAX_DEPTH)).is_ok());
        let err = Value::decode(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.to_string().contains("nesting"));
        assert!(Value::decode(&nested(60000)).is_err());
        assert!(Value::decode(&"d1:k".repeat(60000).into_bytes()).is_err());
    }
}

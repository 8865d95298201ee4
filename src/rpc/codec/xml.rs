//! XML-RPC codec
//!
//! One `methodCall` per message; no batches and no notifications. Values map onto
//! `serde_json::Value` so both codecs share the same dispatcher.

use chrono::NaiveDateTime;
use quick_xml::{
    escape::escape,
    events::{BytesStart, Event},
    Reader,
};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

use crate::rpc::{
    codec::{Codec, Protocol},
    fault::Fault,
    request::{Batch, CallRequest, CallResult, Params, ProtocolVersion},
};

const XML_HEADER: &str = "<?xml version=\"1.0\"?>\n";
/// Deepest `<array>`/`<struct>` nesting accepted; the parser recurses once per level.
const MAX_NESTING: usize = 128;
const DATETIME_FORMATS: [&str; 3] = ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"];

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

#[derive(Debug, Error)]
enum XmlError {
    #[error("malformed xml: {0}")]
    Malformed(String),
    #[error("unexpected {found} while expecting {expected}")]
    Unexpected { expected: String, found: String },
    #[error("invalid <{kind}> value '{text}'")]
    InvalidScalar { kind: String, text: String },
    #[error("cannot encode value: {0}")]
    Unencodable(String),
}

impl Codec for XmlCodec {
    fn protocol(&self) -> Protocol {
        Protocol::XmlRpc
    }

    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn decode(&self, body: &[u8]) -> Result<Batch, Fault> {
        let decoded = std::str::from_utf8(body)
            .map_err(|err| XmlError::Malformed(err.to_string()))
            .and_then(parse_method_call);

        match decoded {
            Ok((method, params)) => Ok(Batch {
                requests: vec![CallRequest::new(
                    method,
                    Params::Positional(params),
                    ProtocolVersion::XmlRpc,
                )],
                is_batch: false,
            }),
            Err(err) => {
                debug!(error = %err, "rejecting xml-rpc request");
                Err(Fault::parse_error())
            }
        }
    }

    fn encode(&self, pairs: Vec<(CallRequest, CallResult)>, _is_batch: bool) -> String {
        if let Some(fault) = pairs.iter().find_map(|(_, result)| result.as_ref().err()) {
            return self.encode_fault(fault);
        }

        let mut out = format!("{XML_HEADER}<methodResponse>\n<params>\n");
        for value in pairs.iter().filter_map(|(_, result)| result.as_ref().ok()) {
            out.push_str("<param>\n");
            if let Err(err) = write_value(&mut out, value) {
                debug!(error = %err, "xml-rpc response encoding failed");
                return self.encode_fault(&Fault::internal_error());
            }
            out.push_str("\n</param>\n");
        }
        out.push_str("</params>\n</methodResponse>\n");
        out
    }

    fn encode_fault(&self, fault: &Fault) -> String {
        format!(
            "{XML_HEADER}<methodResponse>\n<fault>\n<value><struct>\n\
             <member>\n<name>faultCode</name>\n<value><int>{}</int></value>\n</member>\n\
             <member>\n<name>faultString</name>\n<value><string>{}</string></value>\n</member>\n\
             </struct></value>\n</fault>\n</methodResponse>\n",
            fault.code,
            escape(fault.message.as_str())
        )
    }
}

fn parse_method_call(text: &str) -> Result<(String, Vec<Value>), XmlError> {
    let mut parser = Parser::new(text);
    parser.expect_start("methodCall")?;
    parser.expect_start("methodName")?;
    let method = parser.text_until_end("methodName")?.trim().to_string();

    let mut params = Vec::new();
    match parser.next()? {
        Event::Start(start) if is(&start, "params") => {
            loop {
                match parser.next()? {
                    Event::Start(start) if is(&start, "param") => {
                        parser.expect_start("value")?;
                        params.push(parser.value_body()?);
                        parser.expect_end("param")?;
                    }
                    Event::End(end) if end.name().as_ref() == b"params" => break,
                    other => return Err(unexpected("<param> or </params>", &other)),
                }
            }
            parser.expect_end("methodCall")?;
        }
        Event::End(end) if end.name().as_ref() == b"methodCall" => {}
        other => return Err(unexpected("<params> or </methodCall>", &other)),
    }

    match parser.next()? {
        Event::Eof => Ok((method, params)),
        other => Err(unexpected("end of document", &other)),
    }
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().expand_empty_elements = true;
        Self { reader, depth: 0 }
    }

    fn raw(&mut self) -> Result<Event<'a>, XmlError> {
        self.reader
            .read_event()
            .map_err(|err| XmlError::Malformed(err.to_string()))
    }

    /// Next structural event; skips prolog items, comments and whitespace.
    fn next(&mut self) -> Result<Event<'a>, XmlError> {
        loop {
            match self.raw()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
                event => return Ok(event),
            }
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<(), XmlError> {
        match self.next()? {
            Event::Start(start) if is(&start, name) => Ok(()),
            other => Err(unexpected(&format!("<{name}>"), &other)),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), XmlError> {
        match self.next()? {
            Event::End(end) if end.name().as_ref() == name.as_bytes() => Ok(()),
            other => Err(unexpected(&format!("</{name}>"), &other)),
        }
    }

    fn text_until_end(&mut self, name: &str) -> Result<String, XmlError> {
        let mut text = String::new();
        loop {
            match self.raw()? {
                Event::Text(chunk) => text.push_str(
                    &chunk
                        .unescape()
                        .map_err(|err| XmlError::Malformed(err.to_string()))?,
                ),
                Event::CData(chunk) => text.push_str(
                    std::str::from_utf8(&chunk)
                        .map_err(|err| XmlError::Malformed(err.to_string()))?,
                ),
                Event::Comment(_) => {}
                Event::End(end) if end.name().as_ref() == name.as_bytes() => return Ok(text),
                other => return Err(unexpected(&format!("text in <{name}>"), &other)),
            }
        }
    }

    /// Parses what follows an opening `<value>`, up to and including `</value>`.
    fn value_body(&mut self) -> Result<Value, XmlError> {
        let mut text = String::new();
        loop {
            match self.raw()? {
                Event::Text(chunk) => text.push_str(
                    &chunk
                        .unescape()
                        .map_err(|err| XmlError::Malformed(err.to_string()))?,
                ),
                Event::CData(chunk) => text.push_str(
                    std::str::from_utf8(&chunk)
                        .map_err(|err| XmlError::Malformed(err.to_string()))?,
                ),
                Event::Comment(_) => {}
                // An untyped value is a string.
                Event::End(end) if end.name().as_ref() == b"value" => {
                    return Ok(Value::String(text))
                }
                Event::Start(start) if text.trim().is_empty() => {
                    let kind = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    let value = self.typed_value(&kind)?;
                    self.expect_end("value")?;
                    return Ok(value);
                }
                other => return Err(unexpected("value content", &other)),
            }
        }
    }

    fn typed_value(&mut self, kind: &str) -> Result<Value, XmlError> {
        match kind {
            "int" | "i4" | "i8" => {
                let text = self.text_until_end(kind)?;
                text.trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| invalid_scalar(kind, &text))
            }
            "boolean" => {
                let text = self.text_until_end(kind)?;
                match text.trim() {
                    "1" => Ok(Value::Bool(true)),
                    "0" => Ok(Value::Bool(false)),
                    _ => Err(invalid_scalar(kind, &text)),
                }
            }
            "double" => {
                let text = self.text_until_end(kind)?;
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| invalid_scalar(kind, &text))
            }
            "string" => self.text_until_end(kind).map(Value::String),
            "dateTime.iso8601" => {
                let text = self.text_until_end(kind)?;
                let trimmed = text.trim();
                DATETIME_FORMATS
                    .iter()
                    .find(|format| NaiveDateTime::parse_from_str(trimmed, format).is_ok())
                    .map(|_| Value::String(trimmed.to_string()))
                    .ok_or_else(|| invalid_scalar(kind, &text))
            }
            "base64" => {
                let text = self.text_until_end(kind)?;
                Ok(Value::String(
                    text.chars().filter(|c| !c.is_whitespace()).collect(),
                ))
            }
            "nil" => {
                self.text_until_end(kind)?;
                Ok(Value::Null)
            }
            "array" | "struct" => {
                self.depth += 1;
                if self.depth > MAX_NESTING {
                    return Err(XmlError::Malformed(format!(
                        "values nested deeper than {MAX_NESTING} levels"
                    )));
                }
                let value = if kind == "array" {
                    self.array_body()
                } else {
                    self.struct_body()
                };
                self.depth -= 1;
                value
            }
            other => Err(XmlError::Unexpected {
                expected: "a value type".to_string(),
                found: format!("<{other}>"),
            }),
        }
    }

    fn array_body(&mut self) -> Result<Value, XmlError> {
        self.expect_start("data")?;
        let mut items = Vec::new();
        loop {
            match self.next()? {
                Event::Start(start) if is(&start, "value") => items.push(self.value_body()?),
                Event::End(end) if end.name().as_ref() == b"data" => break,
                other => return Err(unexpected("<value> or </data>", &other)),
            }
        }
        self.expect_end("array")?;
        Ok(Value::Array(items))
    }

    fn struct_body(&mut self) -> Result<Value, XmlError> {
        let mut members = Map::new();
        loop {
            match self.next()? {
                Event::Start(start) if is(&start, "member") => {
                    self.expect_start("name")?;
                    let name = self.text_until_end("name")?;
                    self.expect_start("value")?;
                    let value = self.value_body()?;
                    self.expect_end("member")?;
                    members.insert(name, value);
                }
                Event::End(end) if end.name().as_ref() == b"struct" => break,
                other => return Err(unexpected("<member> or </struct>", &other)),
            }
        }
        Ok(Value::Object(members))
    }
}

fn is(start: &BytesStart<'_>, name: &str) -> bool {
    start.name().as_ref() == name.as_bytes()
}

fn unexpected(expected: &str, found: &Event<'_>) -> XmlError {
    let found = match found {
        Event::Start(start) => format!("<{}>", String::from_utf8_lossy(start.name().as_ref())),
        Event::End(end) => format!("</{}>", String::from_utf8_lossy(end.name().as_ref())),
        Event::Text(_) | Event::CData(_) => "text".to_string(),
        Event::Eof => "end of document".to_string(),
        _ => "markup".to_string(),
    };
    XmlError::Unexpected {
        expected: expected.to_string(),
        found,
    }
}

fn invalid_scalar(kind: &str, text: &str) -> XmlError {
    XmlError::InvalidScalar {
        kind: kind.to_string(),
        text: text.to_string(),
    }
}

fn write_value(out: &mut String, value: &Value) -> Result<(), XmlError> {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(flag) => {
            out.push_str(if *flag {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                if i32::try_from(integer).is_ok() {
                    out.push_str(&format!("<int>{integer}</int>"));
                } else {
                    out.push_str(&format!("<i8>{integer}</i8>"));
                }
            } else if number.is_u64() {
                return Err(XmlError::Unencodable(format!(
                    "integer {number} exceeds xml-rpc limits"
                )));
            } else if let Some(float) = number.as_f64() {
                out.push_str(&format!("<double>{float:?}</double>"));
            }
        }
        Value::String(text) => {
            out.push_str("<string>");
            out.push_str(&escape(text.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>\n");
            for item in items {
                write_value(out, item)?;
                out.push('\n');
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>\n");
            for (name, member) in members {
                out.push_str("<member>\n<name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>\n");
                write_value(out, member)?;
                out.push_str("\n</member>\n");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

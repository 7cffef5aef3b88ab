// Command response envelope
//
// Commands on both API surfaces answer with the same small JSON shape:
// `{"LL": {"control": "...", "value": "...", "Code": "200"}}`. The code
// arrives as a string on most firmware and as a number on some, and the
// key casing varies between `Code` and `code`.

use serde::Deserialize;

/// Numeric code that means "accepted".
pub const CODE_OK: u16 = 200;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "LL")]
    ll: LlBody,
}

#[derive(Debug, Deserialize)]
struct LlBody {
    #[serde(default)]
    control: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default, rename = "Code", alias = "code")]
    code: Option<serde_json::Value>,
}

/// A parsed command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub control: Option<String>,
    pub value: Option<String>,
    pub code: u16,
}

impl CommandReply {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Parse an `LL` envelope. Returns `None` for anything else.
pub fn parse_reply(text: &str) -> Option<CommandReply> {
    let envelope: Envelope = serde_json::from_str(text).ok()?;
    let code = match envelope.ll.code? {
        serde_json::Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let value = envelope.ll.value.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });
    Some(CommandReply {
        control: envelope.ll.control,
        value,
        code,
    })
}

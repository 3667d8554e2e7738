use std::collections::BTreeMap;

use crate::wire::error::WireError;
use crate::wire::messages::Message;
use crate::wire::value::WireValue;

/// The self-describing envelope every frame carries (§6.1): a message id for
/// correlating replies, the message's type tag, its payload fields flattened
/// into the same top-level struct, and an `extras` sequence of string-valued
/// properties neither side is required to interpret. The three envelope-level
/// tags are reserved above the range any message payload uses so they never
/// collide with a payload field.
const MESSAGE_ID_TAG: u8 = 255;
const MESSAGE_TAG_FIELD: u8 = 254;
const EXTRAS_TAG: u8 = 253;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message_id: i64,
    pub message: Message,
    /// Unrecognized or forward-compatible string properties, preserved
    /// verbatim across a decode/re-encode round trip even though this
    /// implementation never interprets them (§6.1 forward compatibility).
    pub extras: Vec<(String, String)>,
}

impl Envelope {
    pub fn new(message_id: i64, message: Message) -> Self {
        Self { message_id, message, extras: Vec::new() }
    }

    pub fn with_extras(mut self, extras: Vec<(String, String)>) -> Self {
        self.extras = extras;
        self
    }

    pub fn into_wire_value(self) -> WireValue {
        let tag = self.message.tag();
        let mut fields = self.message.into_fields();
        fields.insert(MESSAGE_ID_TAG, WireValue::Long(self.message_id));
        fields.insert(MESSAGE_TAG_FIELD, WireValue::Int(tag as i32));
        if !self.extras.is_empty() {
            let list = self
                .extras
                .into_iter()
                .map(|(name, value)| {
                    let mut nv = BTreeMap::new();
                    nv.insert(1u8, WireValue::String(name));
                    nv.insert(2u8, WireValue::String(value));
                    WireValue::Struct(nv)
                })
                .collect();
            fields.insert(EXTRAS_TAG, WireValue::List(list));
        }
        WireValue::Struct(fields)
    }

    pub fn from_wire_fields(mut fields: BTreeMap<u8, WireValue>) -> Result<Self, WireError> {
        let message_id = match fields.remove(&MESSAGE_ID_TAG) {
            Some(v) => v.try_into()?,
            None => 0,
        };
        let tag = fields
            .remove(&MESSAGE_TAG_FIELD)
            .map(|v| i32::try_from(v).map(|v| v as u8))
            .transpose()?
            .ok_or(WireError::MissingRequiredField(MESSAGE_TAG_FIELD))?;
        let extras = match fields.remove(&EXTRAS_TAG) {
            Some(WireValue::List(items)) => items
                .into_iter()
                .map(|item| {
                    let WireValue::Struct(mut nv) = item else {
                        return Err(WireError::TypeMismatch { expected: "Struct", actual: "other" });
                    };
                    let name = nv.remove(&1).ok_or(WireError::MissingRequiredField(1))?.try_into()?;
                    let value = nv.remove(&2).ok_or(WireError::MissingRequiredField(2))?.try_into()?;
                    Ok((name, value))
                })
                .collect::<Result<Vec<_>, WireError>>()?,
            Some(_) => return Err(WireError::TypeMismatch { expected: "List", actual: "other" }),
            None => Vec::new(),
        };
        let message = Message::from_tag_and_fields(tag, fields)?;
        Ok(Envelope { message_id, message, extras })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_wire_value() {
        let env = Envelope::new(7, Message::KeepAlive);
        let value = env.clone().into_wire_value();
        let WireValue::Struct(fields) = value else { panic!("expected struct") };
        let decoded = Envelope::from_wire_fields(fields).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn unknown_extras_survive_a_round_trip() {
        let env = Envelope::new(9, Message::KeepAlive)
            .with_extras(vec![("client_build".into(), "abc123".into())]);
        let value = env.clone().into_wire_value();
        let WireValue::Struct(fields) = value else { panic!("expected struct") };
        let decoded = Envelope::from_wire_fields(fields).unwrap();
        assert_eq!(decoded, env);
    }
}

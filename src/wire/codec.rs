use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::wire::envelope::Envelope;
use crate::wire::error::WireError;
use crate::wire::value::{WireType, WireValue};

/// Maximum accepted frame length, guarding against a malformed or hostile
/// length prefix pinning an unbounded allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

pub struct ValueSerializer {
    buffer: BytesMut,
}

impl ValueSerializer {
    pub fn new() -> Self {
        Self { buffer: BytesMut::new() }
    }

    pub fn into_inner(self) -> BytesMut {
        self.buffer
    }

    pub fn write_head(&mut self, tag: u8, type_id: WireType) {
        if tag < 15 {
            self.buffer.put_u8((tag << 4) | u8::from(type_id));
        } else {
            self.buffer.put_u8((15 << 4) | u8::from(type_id));
            self.buffer.put_u8(tag);
        }
    }

    /// Tars has no distinct boolean wire type; booleans are carried as the
    /// smallest integer encoding, same as any other small int (so `false`
    /// collapses to a bare `Zero` head with no payload byte, same as `0i8`).
    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_i8(tag, if value { 1 } else { 0 });
    }

    pub fn write_i8(&mut self, tag: u8, value: i8) {
        if value == 0 {
            self.write_head(tag, WireType::Zero);
            return;
        }
        self.write_head(tag, WireType::Int1);
        self.buffer.put_i8(value);
    }

    pub fn write_i16(&mut self, tag: u8, value: i16) {
        if (-128..=127).contains(&value) {
            self.write_i8(tag, value as i8);
        } else {
            self.write_head(tag, WireType::Int2);
            self.buffer.put_i16(value);
        }
    }

    pub fn write_i32(&mut self, tag: u8, value: i32) {
        if (-32768..=32767).contains(&value) {
            self.write_i16(tag, value as i16);
        } else {
            self.write_head(tag, WireType::Int4);
            self.buffer.put_i32(value);
        }
    }

    pub fn write_i64(&mut self, tag: u8, value: i64) {
        if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.write_i32(tag, value as i32);
        } else {
            self.write_head(tag, WireType::Int8);
            self.buffer.put_i64(value);
        }
    }

    pub fn write_f32(&mut self, tag: u8, value: f32) {
        self.write_head(tag, WireType::Float);
        self.buffer.put_f32(value);
    }

    pub fn write_f64(&mut self, tag: u8, value: f64) {
        self.write_head(tag, WireType::Double);
        self.buffer.put_f64(value);
    }

    pub fn write_string(&mut self, tag: u8, value: &str) {
        let len = value.len();
        if len <= 255 {
            self.write_head(tag, WireType::String1);
            self.buffer.put_u8(len as u8);
        } else {
            self.write_head(tag, WireType::String4);
            self.buffer.put_u32(len as u32);
        }
        self.buffer.put_slice(value.as_bytes());
    }

    pub fn write_bytes(&mut self, tag: u8, value: &[u8]) {
        self.write_head(tag, WireType::Bytes);
        self.write_i32(0, value.len() as i32);
        self.buffer.put_slice(value);
    }

    pub fn write_struct(&mut self, tag: u8, value: &BTreeMap<u8, WireValue>) {
        self.write_head(tag, WireType::StructBegin);
        for (field_tag, v) in value {
            self.write_value(*field_tag, v);
        }
        self.write_head(0, WireType::StructEnd);
    }

    pub fn write_list(&mut self, tag: u8, value: &[WireValue]) {
        self.write_head(tag, WireType::List);
        self.write_i32(0, value.len() as i32);
        for item in value {
            self.write_value(0, item);
        }
    }

    pub fn write_map(&mut self, tag: u8, value: &BTreeMap<WireValue, WireValue>) {
        self.write_head(tag, WireType::Map);
        self.write_i32(0, value.len() as i32);
        for (k, v) in value {
            self.write_value(0, k);
            self.write_value(1, v);
        }
    }

    pub fn write_value(&mut self, tag: u8, value: &WireValue) {
        match value {
            WireValue::Bool(v) => self.write_bool(tag, *v),
            WireValue::Byte(v) => self.write_i8(tag, *v as i8),
            WireValue::Short(v) => self.write_i16(tag, *v),
            WireValue::Int(v) => self.write_i32(tag, *v),
            WireValue::Long(v) => self.write_i64(tag, *v),
            WireValue::Float(v) => self.write_f32(tag, *v),
            WireValue::Double(v) => self.write_f64(tag, *v),
            WireValue::String(v) => self.write_string(tag, v),
            WireValue::Struct(v) => self.write_struct(tag, v),
            WireValue::Map(v) => self.write_map(tag, v),
            WireValue::List(v) => self.write_list(tag, v),
            WireValue::Bytes(v) => self.write_bytes(tag, v),
            WireValue::StructBegin => self.write_head(tag, WireType::StructBegin),
            WireValue::StructEnd => self.write_head(tag, WireType::StructEnd),
        }
    }
}

impl Default for ValueSerializer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ValueDeserializer<'a> {
    buffer: &'a [u8],
}

impl<'a> ValueDeserializer<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    fn require(&self, n: usize) -> Result<(), WireError> {
        if self.buffer.remaining() < n {
            Err(WireError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    pub fn read_head(&mut self) -> Result<(u8, WireType), WireError> {
        self.require(1)?;
        let head = self.buffer.get_u8();
        let mut tag = head >> 4;
        let type_id = WireType::try_from(head & 0x0F)?;
        if tag == 15 {
            self.require(1)?;
            tag = self.buffer.get_u8();
        }
        Ok((tag, type_id))
    }

    pub fn read_value_by_type(&mut self, type_id: WireType) -> Result<WireValue, WireError> {
        Ok(match type_id {
            WireType::Zero => WireValue::Int(0),
            WireType::Int1 => {
                self.require(1)?;
                WireValue::Byte(self.buffer.get_i8() as u8)
            }
            WireType::Int2 => {
                self.require(2)?;
                WireValue::Short(self.buffer.get_i16())
            }
            WireType::Int4 => {
                self.require(4)?;
                WireValue::Int(self.buffer.get_i32())
            }
            WireType::Int8 => {
                self.require(8)?;
                WireValue::Long(self.buffer.get_i64())
            }
            WireType::Float => {
                self.require(4)?;
                WireValue::Float(self.buffer.get_f32())
            }
            WireType::Double => {
                self.require(8)?;
                WireValue::Double(self.buffer.get_f64())
            }
            WireType::String1 => {
                self.require(1)?;
                let len = self.buffer.get_u8() as usize;
                self.read_string_of_len(len)?
            }
            WireType::String4 => {
                self.require(4)?;
                let len = self.buffer.get_u32() as usize;
                self.read_string_of_len(len)?
            }
            WireType::StructBegin => self.read_struct_body()?,
            WireType::StructEnd => WireValue::StructEnd,
            WireType::Map => self.read_map_body()?,
            WireType::List => self.read_list_body()?,
            WireType::Bytes => self.read_bytes_body()?,
        })
    }

    fn read_string_of_len(&mut self, len: usize) -> Result<WireValue, WireError> {
        self.require(len)?;
        let bytes = &self.buffer[..len];
        let s = String::from_utf8_lossy(bytes).into_owned();
        self.buffer.advance(len);
        Ok(WireValue::String(s))
    }

    fn read_bytes_body(&mut self) -> Result<WireValue, WireError> {
        let (_, len_type) = self.read_head()?;
        let len_value = self.read_value_by_type(len_type)?;
        let len: i64 = len_value.try_into()?;
        let len = len as usize;
        self.require(len)?;
        let bytes = self.buffer[..len].to_vec();
        self.buffer.advance(len);
        Ok(WireValue::Bytes(bytes))
    }

    fn read_struct_body(&mut self) -> Result<WireValue, WireError> {
        let mut fields = BTreeMap::new();
        loop {
            let (tag, type_id) = self.read_head()?;
            if type_id == WireType::StructEnd {
                break;
            }
            let value = self.read_value_by_type(type_id)?;
            fields.insert(tag, value);
        }
        Ok(WireValue::Struct(fields))
    }

    fn read_list_body(&mut self) -> Result<WireValue, WireError> {
        let (_, len_type) = self.read_head()?;
        let len: i64 = self.read_value_by_type(len_type)?.try_into()?;
        let mut items = Vec::with_capacity(len.max(0) as usize);
        for _ in 0..len {
            let (_, type_id) = self.read_head()?;
            items.push(self.read_value_by_type(type_id)?);
        }
        Ok(WireValue::List(items))
    }

    fn read_map_body(&mut self) -> Result<WireValue, WireError> {
        let (_, len_type) = self.read_head()?;
        let len: i64 = self.read_value_by_type(len_type)?.try_into()?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let (_, kt) = self.read_head()?;
            let key = self.read_value_by_type(kt)?;
            let (_, vt) = self.read_head()?;
            let value = self.read_value_by_type(vt)?;
            map.insert(key, value);
        }
        Ok(WireValue::Map(map))
    }

    pub fn read_top_level_struct(&mut self) -> Result<BTreeMap<u8, WireValue>, WireError> {
        let (_, type_id) = self.read_head()?;
        match self.read_value_by_type(type_id)? {
            WireValue::Struct(fields) => Ok(fields),
            other => Ok(BTreeMap::from([(0, other)])),
        }
    }
}

/// `tokio_util::codec` framing: a 4-byte big-endian length prefix wrapping an
/// `Envelope` encoded as a single top-level `WireValue::Struct`.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = WireError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut ser = ValueSerializer::new();
        ser.write_value(0, &item.into_wire_value());
        let body = ser.into_inner();
        if body.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
        }
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let frame = src.split_to(len);
        let mut de = ValueDeserializer::new(&frame);
        let fields = de.read_top_level_struct()?;
        Ok(Some(Envelope::from_wire_fields(fields)?))
    }
}

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::types::{Date, Time};
use crate::core::{ApplicationTag, ApplicationValue, Error, ObjectId};

/// Character set of an encoded character string
const CHARSET_UTF8: u8 = 0;
const CHARSET_UCS2: u8 = 4;
const CHARSET_ISO_8859_1: u8 = 5;

/// Tag octet bit marking a context-specific tag
const CONTEXT_CLASS: u8 = 0x08;

/// Codec for BACnet application-tagged primitive values
///
/// Decoding consumes exactly one tagged value per call. A buffer holding only
/// part of a value yields `Ok(None)` from [`Decoder::decode`] and a decode
/// error from [`Decoder::decode_eof`].
#[derive(Clone, Default)]
pub struct ApplicationDataCodec;

impl ApplicationDataCodec {
    /// Creates a new application-data codec
    pub fn new() -> Self {
        ApplicationDataCodec
    }
}

/// Parsed tag header
struct TagHeader {
    tag: ApplicationTag,
    /// Bytes taken by the tag octet and any extended length
    header_len: usize,
    /// Content length, or the boolean value for boolean tags
    len_value_type: usize,
}

fn parse_header(src: &[u8]) -> Result<Option<TagHeader>, Error> {
    let Some(&octet) = src.first() else {
        return Ok(None);
    };

    if octet & CONTEXT_CLASS != 0 {
        return Err(Error::decode(format!(
            "context-specific tag 0x{:02x} in application data",
            octet
        )));
    }

    let number = octet >> 4;
    let tag = ApplicationTag::from_number(number)
        .ok_or_else(|| Error::decode(format!("unsupported application tag {}", number)))?;
    let lvt = (octet & 0x07) as usize;

    if tag == ApplicationTag::Boolean || lvt < 5 {
        return Ok(Some(TagHeader {
            tag,
            header_len: 1,
            len_value_type: lvt,
        }));
    }
    if lvt > 5 {
        return Err(Error::decode(format!("invalid length field {} for {}", lvt, tag)));
    }

    let header = match src.get(1) {
        None => return Ok(None),
        Some(&len) if len < 254 => TagHeader {
            tag,
            header_len: 2,
            len_value_type: len as usize,
        },
        Some(&254) => {
            if src.len() < 4 {
                return Ok(None);
            }
            TagHeader {
                tag,
                header_len: 4,
                len_value_type: u16::from_be_bytes([src[2], src[3]]) as usize,
            }
        }
        Some(_) => {
            if src.len() < 6 {
                return Ok(None);
            }
            TagHeader {
                tag,
                header_len: 6,
                len_value_type: u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize,
            }
        }
    };
    Ok(Some(header))
}

fn decode_unsigned(content: &[u8], max_len: usize, tag: ApplicationTag) -> Result<u64, Error> {
    if content.is_empty() || content.len() > max_len {
        return Err(Error::decode(format!("{} with invalid length {}", tag, content.len())));
    }
    Ok(content.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn decode_signed(content: &[u8]) -> Result<i64, Error> {
    if content.is_empty() || content.len() > 8 {
        return Err(Error::decode(format!("signed with invalid length {}", content.len())));
    }
    let fill = if content[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut bytes = [fill; 8];
    bytes[8 - content.len()..].copy_from_slice(content);
    Ok(i64::from_be_bytes(bytes))
}

fn decode_character_string(content: &[u8]) -> Result<String, Error> {
    let (&charset, text) = content
        .split_first()
        .ok_or_else(|| Error::decode("character string without character set"))?;
    match charset {
        CHARSET_UTF8 => String::from_utf8(text.to_vec())
            .map_err(|e| Error::decode(format!("character string is not valid UTF-8: {}", e))),
        CHARSET_UCS2 => {
            if text.len() % 2 != 0 {
                return Err(Error::decode("UCS-2 string with odd length"));
            }
            let units: Vec<u16> = text
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| Error::decode(format!("invalid UCS-2 string: {}", e)))
        }
        CHARSET_ISO_8859_1 => Ok(text.iter().map(|&b| b as char).collect()),
        other => Err(Error::decode(format!("unsupported character set {}", other))),
    }
}

fn decode_bit_string(content: &[u8]) -> Result<Vec<bool>, Error> {
    let (&unused, data) = content
        .split_first()
        .ok_or_else(|| Error::decode("bit string without unused-bits octet"))?;
    if unused > 7 || (data.is_empty() && unused != 0) {
        return Err(Error::decode(format!("bit string with {} unused bits", unused)));
    }
    let used = data.len() * 8 - unused as usize;
    Ok((0..used)
        .map(|bit| data[bit / 8] & (0x80 >> (bit % 8)) != 0)
        .collect())
}

fn fixed<const N: usize>(content: &[u8], tag: ApplicationTag) -> Result<[u8; N], Error> {
    content
        .try_into()
        .map_err(|_| Error::decode(format!("{} with invalid length {}", tag, content.len())))
}

fn decode_content(tag: ApplicationTag, content: &[u8]) -> Result<ApplicationValue, Error> {
    let value = match tag {
        ApplicationTag::Null => {
            if !content.is_empty() {
                return Err(Error::decode("null with content"));
            }
            ApplicationValue::Null
        }
        ApplicationTag::Boolean => unreachable!("boolean carries its value in the tag"),
        ApplicationTag::Unsigned => ApplicationValue::Unsigned(decode_unsigned(content, 8, tag)?),
        ApplicationTag::Signed => ApplicationValue::Signed(decode_signed(content)?),
        ApplicationTag::Real => ApplicationValue::Real(f32::from_be_bytes(fixed(content, tag)?)),
        ApplicationTag::Double => ApplicationValue::Double(f64::from_be_bytes(fixed(content, tag)?)),
        ApplicationTag::OctetString => ApplicationValue::OctetString(content.to_vec()),
        ApplicationTag::CharacterString => {
            ApplicationValue::CharacterString(decode_character_string(content)?)
        }
        ApplicationTag::BitString => ApplicationValue::BitString(decode_bit_string(content)?),
        ApplicationTag::Enumerated => {
            ApplicationValue::Enumerated(decode_unsigned(content, 4, tag)? as u32)
        }
        ApplicationTag::Date => {
            let [year, month, day, weekday] = fixed(content, tag)?;
            ApplicationValue::Date(Date {
                year,
                month,
                day,
                weekday,
            })
        }
        ApplicationTag::Time => {
            let [hour, minute, second, hundredths] = fixed(content, tag)?;
            ApplicationValue::Time(Time {
                hour,
                minute,
                second,
                hundredths,
            })
        }
        ApplicationTag::ObjectId => {
            ApplicationValue::ObjectId(ObjectId::from_raw(u32::from_be_bytes(fixed(content, tag)?)))
        }
    };
    Ok(value)
}

impl Decoder for ApplicationDataCodec {
    type Item = ApplicationValue;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match parse_header(src)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if header.tag == ApplicationTag::Boolean {
            let value = match header.len_value_type {
                0 => false,
                1 => true,
                other => return Err(Error::decode(format!("boolean with value {}", other))),
            };
            src.advance(header.header_len);
            return Ok(Some(ApplicationValue::Boolean(value)));
        }

        let total = header.header_len + header.len_value_type;
        if src.len() < total {
            // Need more data to read the full value
            return Ok(None);
        }

        src.advance(header.header_len);
        let content = src.split_to(header.len_value_type);
        decode_content(header.tag, &content).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(value) => Ok(Some(value)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::decode(format!(
                "truncated application data ({} bytes left)",
                src.len()
            ))),
        }
    }
}

fn put_header(dst: &mut BytesMut, tag: ApplicationTag, len: usize) {
    let number = tag.number() << 4;
    if len < 5 {
        dst.put_u8(number | len as u8);
    } else if len < 254 {
        dst.put_u8(number | 5);
        dst.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        dst.put_u8(number | 5);
        dst.put_u8(254);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(number | 5);
        dst.put_u8(255);
        dst.put_u32(len as u32);
    }
}

fn minimal_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

fn minimal_signed(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut skip = 0;
    while skip < 7 {
        let (head, next) = (bytes[skip], bytes[skip + 1]);
        let redundant = (head == 0x00 && next & 0x80 == 0) || (head == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        skip += 1;
    }
    bytes[skip..].to_vec()
}

impl Encoder<&ApplicationValue> for ApplicationDataCodec {
    type Error = Error;

    fn encode(&mut self, item: &ApplicationValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let tag = item.tag();
        match item {
            ApplicationValue::Null => put_header(dst, tag, 0),
            ApplicationValue::Boolean(value) => put_header(dst, tag, *value as usize),
            ApplicationValue::Unsigned(value) => {
                let content = minimal_unsigned(*value);
                put_header(dst, tag, content.len());
                dst.extend_from_slice(&content);
            }
            ApplicationValue::Signed(value) => {
                let content = minimal_signed(*value);
                put_header(dst, tag, content.len());
                dst.extend_from_slice(&content);
            }
            ApplicationValue::Real(value) => {
                put_header(dst, tag, 4);
                dst.put_f32(*value);
            }
            ApplicationValue::Double(value) => {
                put_header(dst, tag, 8);
                dst.put_f64(*value);
            }
            ApplicationValue::OctetString(bytes) => {
                put_header(dst, tag, bytes.len());
                dst.extend_from_slice(bytes);
            }
            ApplicationValue::CharacterString(text) => {
                put_header(dst, tag, text.len() + 1);
                dst.put_u8(CHARSET_UTF8);
                dst.extend_from_slice(text.as_bytes());
            }
            ApplicationValue::BitString(bits) => {
                let octets = (bits.len() + 7) / 8;
                let unused = (octets * 8 - bits.len()) as u8;
                put_header(dst, tag, octets + 1);
                dst.put_u8(unused);
                for chunk in bits.chunks(8) {
                    let octet = chunk
                        .iter()
                        .enumerate()
                        .fold(0u8, |acc, (i, &bit)| if bit { acc | (0x80 >> i) } else { acc });
                    dst.put_u8(octet);
                }
            }
            ApplicationValue::Enumerated(value) => {
                let content = minimal_unsigned(*value as u64);
                put_header(dst, tag, content.len());
                dst.extend_from_slice(&content);
            }
            ApplicationValue::Date(date) => {
                put_header(dst, tag, 4);
                dst.extend_from_slice(&[date.year, date.month, date.day, date.weekday]);
            }
            ApplicationValue::Time(time) => {
                put_header(dst, tag, 4);
                dst.extend_from_slice(&[time.hour, time.minute, time.second, time.hundredths]);
            }
            ApplicationValue::ObjectId(id) => {
                put_header(dst, tag, 4);
                dst.put_u32(id.to_raw());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectType;

    fn decode_one(bytes: &[u8]) -> Result<Option<ApplicationValue>, Error> {
        let mut codec = ApplicationDataCodec::new();
        let mut buf = BytesMut::from(bytes);
        codec.decode_eof(&mut buf)
    }

    #[test]
    fn test_decode_object_identifier() {
        // analog-input 1
        let value = decode_one(&[0xC4, 0x00, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(
            value,
            Some(ApplicationValue::ObjectId(ObjectId::new(ObjectType::ANALOG_INPUT, 1)))
        );
    }

    #[test]
    fn test_decode_known_wire_forms() {
        assert_eq!(decode_one(&[0x00]).unwrap(), Some(ApplicationValue::Null));
        assert_eq!(decode_one(&[0x11]).unwrap(), Some(ApplicationValue::Boolean(true)));
        assert_eq!(decode_one(&[0x21, 0x48]).unwrap(), Some(ApplicationValue::Unsigned(72)));
        assert_eq!(decode_one(&[0x31, 0xFE]).unwrap(), Some(ApplicationValue::Signed(-2)));
        assert_eq!(
            decode_one(&[0x44, 0x42, 0x91, 0x00, 0x00]).unwrap(),
            Some(ApplicationValue::Real(72.5))
        );
        assert_eq!(decode_one(&[0x91, 0x03]).unwrap(), Some(ApplicationValue::Enumerated(3)));
        assert_eq!(
            decode_one(&[0x75, 0x06, 0x00, b'A', b'H', b'U', b'-', b'1']).unwrap(),
            Some(ApplicationValue::CharacterString("AHU-1".to_string()))
        );
        assert_eq!(
            decode_one(&[0x82, 0x04, 0xA0]).unwrap(),
            Some(ApplicationValue::BitString(vec![true, false, true, false]))
        );
    }

    #[test]
    fn test_decode_iso_8859_1_string() {
        let value = decode_one(&[0x74, 0x05, b'C', 0xB0, b'F']).unwrap();
        assert_eq!(value, Some(ApplicationValue::CharacterString("C°F".to_string())));
    }

    #[test]
    fn test_encoder_matches_decoder() {
        let values = vec![
            ApplicationValue::Null,
            ApplicationValue::Boolean(false),
            ApplicationValue::Unsigned(70_000),
            ApplicationValue::Signed(-129),
            ApplicationValue::Real(-3.25),
            ApplicationValue::Double(1e-9),
            ApplicationValue::OctetString(vec![0xde, 0xad]),
            ApplicationValue::CharacterString("x".repeat(300)),
            ApplicationValue::BitString(vec![true; 11]),
            ApplicationValue::Enumerated(1),
            ApplicationValue::Date(Date { year: 124, month: 5, day: 17, weekday: 5 }),
            ApplicationValue::Time(Time { hour: 13, minute: 5, second: 0, hundredths: 0 }),
            ApplicationValue::ObjectId(ObjectId::new(ObjectType::DEVICE, 1001)),
        ];

        let mut codec = ApplicationDataCodec::new();
        let mut buf = BytesMut::new();
        for value in &values {
            codec.encode(value, &mut buf).unwrap();
        }

        let mut decoded = Vec::new();
        while let Some(value) = codec.decode_eof(&mut buf).unwrap() {
            decoded.push(value);
        }
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_partial_value_needs_more_data() {
        let mut codec = ApplicationDataCodec::new();
        let mut buf = BytesMut::from(&[0xC4, 0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
        assert!(matches!(codec.decode_eof(&mut buf), Err(Error::Decode(_))));
    }

    #[test]
    fn test_rejects_malformed_values() {
        // context tag
        assert!(decode_one(&[0x09, 0x01]).is_err());
        // real with three bytes
        assert!(decode_one(&[0x43, 0x00, 0x00, 0x00]).is_err());
        // boolean with value 2
        assert!(decode_one(&[0x12]).is_err());
        // tag 13 is reserved
        assert!(decode_one(&[0xD1, 0x00]).is_err());
        // unknown character set
        assert!(decode_one(&[0x72, 0x09, b'a']).is_err());
    }

    #[test]
    fn test_minimal_integer_encodings() {
        assert_eq!(minimal_unsigned(0), vec![0]);
        assert_eq!(minimal_unsigned(256), vec![1, 0]);
        assert_eq!(minimal_signed(-1), vec![0xFF]);
        assert_eq!(minimal_signed(128), vec![0x00, 0x80]);
        assert_eq!(minimal_signed(-129), vec![0xFF, 0x7F]);
    }
}

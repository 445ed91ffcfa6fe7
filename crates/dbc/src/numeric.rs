//! Binary NUMERIC codec.
//!
//! PostgreSQL sends NUMERIC as base-10000 digit groups with a weight, a sign
//! word and a display scale. Values are exchanged as decimal text so no
//! arbitrary-precision crate is needed.

use std::error::Error as StdError;

type CodecError = Box<dyn StdError + Sync + Send>;

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

const HEADER_LEN: usize = 8;

/// Decode a binary NUMERIC payload into its decimal text form.
pub(crate) fn decode(raw: &[u8]) -> Result<String, CodecError> {
    if raw.len() < HEADER_LEN {
        return Err("invalid NUMERIC payload: too short".into());
    }

    let ndigits = usize::from(u16::from_be_bytes([raw[0], raw[1]]));
    let weight = i16::from_be_bytes([raw[2], raw[3]]);
    let sign = u16::from_be_bytes([raw[4], raw[5]]);
    let dscale = usize::from(u16::from_be_bytes([raw[6], raw[7]]));

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_PINF => return Ok("Infinity".to_string()),
        SIGN_NINF => return Ok("-Infinity".to_string()),
        SIGN_POS | SIGN_NEG => {}
        other => return Err(format!("invalid NUMERIC sign word {other:#06x}").into()),
    }

    if raw.len() != HEADER_LEN + ndigits * 2 {
        return Err("invalid NUMERIC payload: length does not match digit count".into());
    }

    let mut digits = Vec::with_capacity(ndigits);
    for chunk in raw[HEADER_LEN..].chunks_exact(2) {
        let group = u16::from_be_bytes([chunk[0], chunk[1]]);
        if group > 9999 {
            return Err("invalid NUMERIC payload: digit group out of range".into());
        }
        digits.push(group);
    }

    let weight = isize::from(weight);
    let group_at = |idx: isize| -> u16 {
        usize::try_from(idx)
            .ok()
            .and_then(|idx| digits.get(idx).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                out.push_str(&group_at(idx).to_string());
            } else {
                out.push_str(&format!("{:04}", group_at(idx)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let groups = dscale.div_ceil(4);
        for k in 1..=groups {
            // `groups` is bounded by u16::MAX / 4
            #[allow(clippy::cast_possible_wrap)]
            let idx = weight + k as isize;
            fraction.push_str(&format!("{:04}", group_at(idx)));
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    let is_zero = digits.iter().all(|group| *group == 0);
    if sign == SIGN_NEG && !is_zero {
        out.insert(0, '-');
    }
    Ok(out)
}

/// Encode decimal text as a binary NUMERIC payload.
pub(crate) fn encode(text: &str, out: &mut bytes::BytesMut) -> Result<(), CodecError> {
    use bytes::BufMut;

    let text = text.trim();
    let special = match text {
        "NaN" | "nan" => Some(SIGN_NAN),
        "Infinity" | "infinity" | "+Infinity" => Some(SIGN_PINF),
        "-Infinity" | "-infinity" => Some(SIGN_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_u16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let valid = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part) {
        return Err(format!("invalid NUMERIC literal {text:?}").into());
    }

    let dscale = u16::try_from(frac_part.len())
        .map_err(|_| format!("NUMERIC scale too large in {text:?}"))?;
    let int_part = int_part.trim_start_matches('0');

    // Left-pad the integer part and right-pad the fraction to whole groups.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let mut padded = String::with_capacity(int_pad + int_part.len() + frac_part.len() + frac_pad);
    padded.extend(std::iter::repeat_n('0', int_pad));
    padded.push_str(int_part);
    padded.push_str(frac_part);
    padded.extend(std::iter::repeat_n('0', frac_pad));

    let mut groups: Vec<u16> = padded
        .as_bytes()
        .chunks_exact(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'))
        })
        .collect();

    let int_groups = (int_pad + int_part.len()) / 4;
    let mut weight = i32::try_from(int_groups)
        .map_err(|_| format!("NUMERIC literal too long: {text:?}"))?
        - 1;

    let leading = groups.iter().take_while(|group| **group == 0).count();
    groups.drain(..leading);
    weight -= i32::try_from(leading).map_err(|_| format!("NUMERIC literal too long: {text:?}"))?;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let (weight, sign) = if groups.is_empty() {
        (0, SIGN_POS)
    } else if negative {
        (weight, SIGN_NEG)
    } else {
        (weight, SIGN_POS)
    };

    let ndigits =
        u16::try_from(groups.len()).map_err(|_| format!("NUMERIC literal too long: {text:?}"))?;
    let weight =
        i16::try_from(weight).map_err(|_| format!("NUMERIC weight out of range: {text:?}"))?;

    out.put_u16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn payload(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_values() {
        // 12345.678 = [1, 2345, 6780], weight 1
        let raw = payload(3, 1, SIGN_POS, 3, &[1, 2345, 6780]);
        assert_eq!(decode(&raw).unwrap(), "12345.678");

        // -0.00012 = [1, 2000], weight -1, scale 5
        let raw = payload(2, -1, SIGN_NEG, 5, &[1, 2000]);
        assert_eq!(decode(&raw).unwrap(), "-0.00012");

        // 0.00000001 = [1], weight -2, scale 8
        let raw = payload(1, -2, SIGN_POS, 8, &[1]);
        assert_eq!(decode(&raw).unwrap(), "0.00000001");

        // 20000 = [2], weight 1 (trailing integer group elided)
        let raw = payload(1, 1, SIGN_POS, 0, &[2]);
        assert_eq!(decode(&raw).unwrap(), "20000");

        // 1.50 keeps its display scale
        let raw = payload(2, 0, SIGN_POS, 2, &[1, 5000]);
        assert_eq!(decode(&raw).unwrap(), "1.50");

        assert_eq!(decode(&payload(0, 0, SIGN_POS, 0, &[])).unwrap(), "0");
        assert_eq!(decode(&payload(0, 0, SIGN_NAN, 0, &[])).unwrap(), "NaN");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode(&[0, 1]).is_err());
        assert!(decode(&payload(2, 0, SIGN_POS, 0, &[1])).is_err());
        assert!(decode(&payload(1, 0, SIGN_POS, 0, &[10000])).is_err());
        assert!(decode(&payload(0, 0, 0x1234, 0, &[])).is_err());
    }

    #[test]
    fn test_encode_matches_server_layout() {
        let mut out = BytesMut::new();
        encode("12345.678", &mut out).unwrap();
        assert_eq!(&out[..], &payload(3, 1, SIGN_POS, 3, &[1, 2345, 6780])[..]);

        let mut out = BytesMut::new();
        encode("-0.00012", &mut out).unwrap();
        assert_eq!(&out[..], &payload(2, -1, SIGN_NEG, 5, &[1, 2000])[..]);

        let mut out = BytesMut::new();
        encode("20000", &mut out).unwrap();
        assert_eq!(&out[..], &payload(1, 1, SIGN_POS, 0, &[2])[..]);

        let mut out = BytesMut::new();
        encode("-0.000", &mut out).unwrap();
        assert_eq!(&out[..], &payload(0, 0, SIGN_POS, 3, &[])[..]);
    }

    #[test]
    fn test_encode_rejects_garbage() {
        let mut out = BytesMut::new();
        assert!(encode("12a", &mut out).is_err());
        assert!(encode("", &mut out).is_err());
        assert!(encode("1.2.3", &mut out).is_err());
        assert!(encode("-", &mut out).is_err());
    }
}

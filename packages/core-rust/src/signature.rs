//! Signature strings for bus types.
//!
//! A signature is the compact textual form of a type list, e.g. `"xx"` for
//! two `int64` arguments or `"a{sv}"` for a string-to-variant dictionary.
//! Used for introspection output and for declaring raw handlers.

use crate::codec::CodecError;
use crate::types::ValueType;

/// Maximum nesting of containers accepted by the parser.
const MAX_DEPTH: usize = 32;

impl ValueType {
    /// Returns the signature code for this type.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            ValueType::Bool => out.push('b'),
            ValueType::Byte => out.push('y'),
            ValueType::Int16 => out.push('n'),
            ValueType::UInt16 => out.push('q'),
            ValueType::Int32 => out.push('i'),
            ValueType::UInt32 => out.push('u'),
            ValueType::Int64 => out.push('x'),
            ValueType::UInt64 => out.push('t'),
            ValueType::Double => out.push('d'),
            ValueType::String => out.push('s'),
            ValueType::ObjectPath => out.push('o'),
            ValueType::Variant => out.push('v'),
            ValueType::Array(elem) => {
                out.push('a');
                elem.write_signature(out);
            }
            ValueType::Dict(key, value) => {
                out.push_str("a{");
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
            ValueType::Struct(fields) => {
                out.push('(');
                for field in fields {
                    field.write_signature(out);
                }
                out.push(')');
            }
        }
    }
}

/// Concatenated signature of a type list.
#[must_use]
pub fn signature_of(types: &[ValueType]) -> String {
    types.iter().map(ValueType::signature).collect()
}

/// Parses a signature string into its list of complete types.
///
/// # Errors
///
/// Returns `CodecError::InvalidSignature` for unknown codes, unbalanced
/// containers, non-basic dictionary keys, empty structs, or nesting deeper
/// than the supported limit.
pub fn parse_signature(sig: &str) -> Result<Vec<ValueType>, CodecError> {
    let chars: Vec<char> = sig.chars().collect();
    let mut pos = 0;
    let mut types = Vec::new();
    while pos < chars.len() {
        types.push(parse_one(sig, &chars, &mut pos, 0)?);
    }
    Ok(types)
}

fn parse_one(
    sig: &str,
    chars: &[char],
    pos: &mut usize,
    depth: usize,
) -> Result<ValueType, CodecError> {
    let invalid = |reason: &str| CodecError::InvalidSignature {
        signature: sig.to_string(),
        reason: reason.to_string(),
    };

    if depth > MAX_DEPTH {
        return Err(invalid("nesting too deep"));
    }
    let Some(&c) = chars.get(*pos) else {
        return Err(invalid("unexpected end of signature"));
    };
    *pos += 1;

    let ty = match c {
        'b' => ValueType::Bool,
        'y' => ValueType::Byte,
        'n' => ValueType::Int16,
        'q' => ValueType::UInt16,
        'i' => ValueType::Int32,
        'u' => ValueType::UInt32,
        'x' => ValueType::Int64,
        't' => ValueType::UInt64,
        'd' => ValueType::Double,
        's' => ValueType::String,
        'o' => ValueType::ObjectPath,
        'v' => ValueType::Variant,
        'a' => {
            if chars.get(*pos) == Some(&'{') {
                *pos += 1;
                let key = parse_one(sig, chars, pos, depth + 1)?;
                if !key.is_basic() {
                    return Err(invalid("dictionary key must be a basic type"));
                }
                let value = parse_one(sig, chars, pos, depth + 1)?;
                if chars.get(*pos) != Some(&'}') {
                    return Err(invalid("unterminated dictionary entry"));
                }
                *pos += 1;
                ValueType::dict(key, value)
            } else {
                ValueType::array(parse_one(sig, chars, pos, depth + 1)?)
            }
        }
        '(' => {
            let mut fields = Vec::new();
            loop {
                match chars.get(*pos) {
                    Some(&')') => {
                        *pos += 1;
                        break;
                    }
                    Some(_) => fields.push(parse_one(sig, chars, pos, depth + 1)?),
                    None => return Err(invalid("unterminated struct")),
                }
            }
            if fields.is_empty() {
                return Err(invalid("empty struct"));
            }
            ValueType::Struct(fields)
        }
        other => return Err(invalid(&format!("unknown type code '{other}'"))),
    };
    Ok(ty)
}

//! EIP-712 structured data hashing and signing

use std::collections::{BTreeMap, BTreeSet};

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::crypto::{keccak256, sign_hash};
use crate::error::{Error, Result};
use crate::types::{Address, Signature, B256, U256};

pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Struct name -> ordered field list
pub type Types = BTreeMap<String, Vec<TypedField>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypedField {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// A complete EIP-712 signing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub types: Types,
    pub primary_type: String,
    #[serde(default)]
    pub domain: Map<String, Value>,
    #[serde(default)]
    pub message: Value,
}

impl TypedData {
    /// Declared types plus `EIP712Domain` inferred from the domain when not declared
    pub fn resolved_types(&self) -> Types {
        let mut types = self.types.clone();
        if !types.contains_key(DOMAIN_TYPE) {
            types.insert(DOMAIN_TYPE.to_string(), self.inferred_domain_fields());
        }
        types
    }

    fn inferred_domain_fields(&self) -> Vec<TypedField> {
        [
            ("name", "string"),
            ("version", "string"),
            ("chainId", "uint256"),
            ("verifyingContract", "address"),
            ("salt", "bytes32"),
        ]
        .into_iter()
        .filter(|(name, _)| self.domain.contains_key(*name))
        .map(|(name, ty)| TypedField::new(name, ty))
        .collect()
    }

    /// Check the schema: the primary type is declared and every field type resolves
    pub fn validate(&self) -> Result<()> {
        let types = self.resolved_types();
        if !types.contains_key(&self.primary_type) {
            return Err(invalid(format!(
                "primary type {} is not declared",
                self.primary_type
            )));
        }
        for (name, fields) in &types {
            if elementary(name).is_some() {
                return Err(invalid(format!("struct name {} shadows an elementary type", name)));
            }
            let mut seen = BTreeSet::new();
            for field in fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(invalid(format!("duplicate field {} in {}", field.name, name)));
                }
                check_type(&types, &field.ty)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Elementary {
    Address,
    Bool,
    String,
    Bytes,
    FixedBytes(usize),
    Uint(usize),
    Int(usize),
}

fn elementary(ty: &str) -> Option<Elementary> {
    match ty {
        "address" => return Some(Elementary::Address),
        "bool" => return Some(Elementary::Bool),
        "string" => return Some(Elementary::String),
        "bytes" => return Some(Elementary::Bytes),
        _ => {}
    }

    if let Some(size) = ty.strip_prefix("bytes") {
        return match size.parse::<usize>() {
            Ok(n) if (1..=32).contains(&n) && !size.starts_with('0') => {
                Some(Elementary::FixedBytes(n))
            }
            _ => None,
        };
    }

    let (bits, signed) = if let Some(bits) = ty.strip_prefix("uint") {
        (bits, false)
    } else if let Some(bits) = ty.strip_prefix("int") {
        (bits, true)
    } else {
        return None;
    };

    let bits = if bits.is_empty() {
        256
    } else {
        match bits.parse::<usize>() {
            Ok(n) if n % 8 == 0 && (8..=256).contains(&n) && !bits.starts_with('0') => n,
            _ => return None,
        }
    };

    Some(if signed {
        Elementary::Int(bits)
    } else {
        Elementary::Uint(bits)
    })
}

/// Split `T[]` / `T[N]` into the element type and optional fixed length
fn parse_array(ty: &str) -> Result<Option<(&str, Option<usize>)>> {
    let Some(body) = ty.strip_suffix(']') else {
        return Ok(None);
    };
    let open = body
        .rfind('[')
        .ok_or_else(|| invalid(format!("malformed array type {}", ty)))?;
    let inner = &body[..open];
    let len = &body[open + 1..];
    if inner.is_empty() {
        return Err(invalid(format!("malformed array type {}", ty)));
    }
    if len.is_empty() {
        return Ok(Some((inner, None)));
    }
    if !len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("malformed array length in {}", ty)));
    }
    let len = len
        .parse::<usize>()
        .map_err(|_| invalid(format!("malformed array length in {}", ty)))?;
    Ok(Some((inner, Some(len))))
}

fn base_type(ty: &str) -> &str {
    ty.split('[').next().unwrap_or(ty)
}

fn check_type(types: &Types, ty: &str) -> Result<()> {
    if let Some((inner, _)) = parse_array(ty)? {
        return check_type(types, inner);
    }
    if types.contains_key(ty) || elementary(ty).is_some() {
        Ok(())
    } else {
        Err(invalid(format!("unknown type {}", ty)))
    }
}

fn collect_dependencies(types: &Types, ty: &str, found: &mut BTreeSet<String>) -> Result<()> {
    let base = base_type(ty);
    let Some(fields) = types.get(base) else {
        return Ok(());
    };
    if !found.insert(base.to_string()) {
        return Ok(());
    }
    for field in fields {
        collect_dependencies(types, &field.ty, found)?;
    }
    Ok(())
}

/// `Primary(type name,...)Dep1(...)Dep2(...)` with dependencies sorted by name
pub fn encode_type(types: &Types, primary_type: &str) -> Result<String> {
    if !types.contains_key(primary_type) {
        return Err(invalid(format!("type {} is not declared", primary_type)));
    }
    let mut deps = BTreeSet::new();
    collect_dependencies(types, primary_type, &mut deps)?;
    deps.remove(primary_type);

    let mut out = String::new();
    for name in std::iter::once(primary_type).chain(deps.iter().map(String::as_str)) {
        let fields = types
            .get(name)
            .ok_or_else(|| invalid(format!("type {} is not declared", name)))?;
        out.push_str(name);
        out.push('(');
        let rendered: Vec<String> = fields
            .iter()
            .map(|f| format!("{} {}", f.ty, f.name))
            .collect();
        out.push_str(&rendered.join(","));
        out.push(')');
    }
    Ok(out)
}

pub fn type_hash(types: &Types, primary_type: &str) -> Result<B256> {
    Ok(B256(keccak256(encode_type(types, primary_type)?.as_bytes())))
}

/// keccak256(typeHash || encodeData(value))
pub fn hash_struct(types: &Types, primary_type: &str, value: &Value) -> Result<B256> {
    let fields = types
        .get(primary_type)
        .ok_or_else(|| invalid(format!("type {} is not declared", primary_type)))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid(format!("value for {} must be an object", primary_type)))?;

    let mut encoded = Vec::with_capacity(32 * (fields.len() + 1));
    encoded.extend_from_slice(type_hash(types, primary_type)?.as_bytes());
    for field in fields {
        let field_value = object.get(&field.name).ok_or_else(|| {
            invalid(format!("missing field {} in {}", field.name, primary_type))
        })?;
        encoded.extend_from_slice(&encode_value(types, &field.ty, field_value)?);
    }
    Ok(B256(keccak256(&encoded)))
}

pub fn hash_domain(data: &TypedData) -> Result<B256> {
    hash_struct(
        &data.resolved_types(),
        DOMAIN_TYPE,
        &Value::Object(data.domain.clone()),
    )
}

/// keccak256(0x19 0x01 || domainSeparator || hashStruct(message))
pub fn hash_typed_data(data: &TypedData) -> Result<B256> {
    data.validate()?;
    let types = data.resolved_types();

    let domain = hash_struct(&types, DOMAIN_TYPE, &Value::Object(data.domain.clone()))?;
    let mut payload = Vec::with_capacity(66);
    payload.extend_from_slice(&[0x19, 0x01]);
    payload.extend_from_slice(domain.as_bytes());
    if data.primary_type != DOMAIN_TYPE {
        let message = hash_struct(&types, &data.primary_type, &data.message)?;
        payload.extend_from_slice(message.as_bytes());
    }
    Ok(B256(keccak256(&payload)))
}

pub fn sign_typed_data(key: &SigningKey, data: &TypedData) -> Result<Signature> {
    let digest = hash_typed_data(data)?;
    debug!(primary_type = %data.primary_type, "signing typed data");
    sign_hash(key, &digest)
}

fn encode_value(types: &Types, ty: &str, value: &Value) -> Result<[u8; 32]> {
    if let Some((inner, fixed_len)) = parse_array(ty)? {
        let items = value
            .as_array()
            .ok_or_else(|| invalid(format!("expected an array for {}", ty)))?;
        if let Some(len) = fixed_len {
            if items.len() != len {
                return Err(invalid(format!(
                    "{} expects {} elements, got {}",
                    ty,
                    len,
                    items.len()
                )));
            }
        }
        let mut encoded = Vec::with_capacity(32 * items.len());
        for item in items {
            encoded.extend_from_slice(&encode_value(types, inner, item)?);
        }
        return Ok(keccak256(&encoded));
    }

    if types.contains_key(ty) {
        if value.is_null() {
            return Ok([0u8; 32]);
        }
        return Ok(hash_struct(types, ty, value)?.0);
    }

    let kind = elementary(ty).ok_or_else(|| invalid(format!("unknown type {}", ty)))?;
    match kind {
        Elementary::String => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid(format!("expected a string for {}", ty)))?;
            Ok(keccak256(s.as_bytes()))
        }
        Elementary::Bytes => Ok(keccak256(&hex_value(ty, value)?)),
        Elementary::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| invalid(format!("expected a boolean for {}", ty)))?;
            let mut word = [0u8; 32];
            word[31] = b as u8;
            Ok(word)
        }
        Elementary::Address => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid(format!("expected an address string for {}", ty)))?;
            let address: Address = s
                .parse()
                .map_err(|e| invalid(format!("invalid address {}: {}", s, e)))?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_bytes());
            Ok(word)
        }
        Elementary::FixedBytes(len) => {
            let bytes = hex_value(ty, value)?;
            if bytes.len() != len {
                return Err(invalid(format!(
                    "{} expects {} bytes, got {}",
                    ty,
                    len,
                    bytes.len()
                )));
            }
            let mut word = [0u8; 32];
            word[..len].copy_from_slice(&bytes);
            Ok(word)
        }
        Elementary::Uint(bits) => {
            let (negative, magnitude) = integer_value(ty, value)?;
            if negative && !magnitude.is_zero() {
                return Err(invalid(format!("negative value for {}", ty)));
            }
            if magnitude.bit_len() > bits {
                return Err(invalid(format!("value out of range for {}", ty)));
            }
            Ok(magnitude.to_be_bytes::<32>())
        }
        Elementary::Int(bits) => {
            let (negative, magnitude) = integer_value(ty, value)?;
            // [-2^(bits-1), 2^(bits-1) - 1]
            let bound = U256::from(1u8) << (bits - 1);
            let in_range = if negative {
                magnitude <= bound
            } else {
                magnitude < bound
            };
            if !in_range {
                return Err(invalid(format!("value out of range for {}", ty)));
            }
            let word = if negative {
                magnitude.wrapping_neg()
            } else {
                magnitude
            };
            Ok(word.to_be_bytes::<32>())
        }
    }
}

fn hex_value(ty: &str, value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| invalid(format!("expected a hex string for {}", ty)))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| invalid(format!("{} value must be 0x-prefixed hex", ty)))?;
    hex::decode(digits).map_err(|e| invalid(format!("invalid hex for {}: {}", ty, e)))
}

/// Parse a JSON number or decimal/hex string into (is_negative, magnitude)
fn integer_value(ty: &str, value: &Value) -> Result<(bool, U256)> {
    let out_of_range = || invalid(format!("invalid integer for {}", ty));
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok((false, U256::from(u)))
            } else if let Some(i) = n.as_i64() {
                Ok((i < 0, U256::from(i.unsigned_abs())))
            } else {
                Err(out_of_range())
            }
        }
        Value::String(s) => {
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.as_str()),
            };
            let (radix, digits) = match digits.strip_prefix("0x") {
                Some(hex_digits) => (16, hex_digits),
                None => (10, digits),
            };
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return Err(out_of_range());
            }
            let magnitude =
                U256::from_str_radix(digits, u64::from(radix)).map_err(|_| out_of_range())?;
            Ok((negative, magnitude))
        }
        _ => Err(out_of_range()),
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidTypedData(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mail() -> TypedData {
        serde_json::from_value(json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "Person": [
                    { "name": "name", "type": "string" },
                    { "name": "wallet", "type": "address" }
                ],
                "Mail": [
                    { "name": "from", "type": "Person" },
                    { "name": "to", "type": "Person" },
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": {
                "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
                "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
                "contents": "Hello, Bob!"
            }
        }))
        .unwrap()
    }

    fn word_for(ty: &str, value: Value) -> Result<[u8; 32]> {
        encode_value(&Types::new(), ty, &value)
    }

    #[test]
    fn test_mail_encode_type() {
        let data = mail();
        assert_eq!(
            encode_type(&data.types, "Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
        assert_eq!(
            type_hash(&data.types, "Mail").unwrap().to_hex(),
            "0xa0cedeb2dc280ba39b857546d74f5549c3a1d7bdc2dd96bf881f76108e23dac2"
        );
    }

    #[test]
    fn test_mail_hashes() {
        let data = mail();
        assert_eq!(
            hash_domain(&data).unwrap().to_hex(),
            "0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
        assert_eq!(
            hash_struct(&data.types, "Mail", &data.message).unwrap().to_hex(),
            "0xc52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
        );
        assert_eq!(
            hash_typed_data(&data).unwrap().to_hex(),
            "0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_mail_signature_cow() {
        let key = SigningKey::from_slice(&keccak256(b"cow")).unwrap();
        let sig = sign_typed_data(&key, &mail()).unwrap();
        assert_eq!(sig.v(), 28);
        assert_eq!(
            hex::encode(sig.r),
            "4355c47d63924e8a72e509b65029052eb6c299d53a04e167c5775fd466751c9d"
        );
        assert_eq!(
            hex::encode(sig.s),
            "07299936d304c153f6443dfa05f40ff007d72911b6f72307f996231605b91562"
        );
    }

    #[test]
    fn test_domain_type_inferred() {
        let mut data = mail();
        data.types.remove(DOMAIN_TYPE);
        assert_eq!(
            hash_domain(&data).unwrap().to_hex(),
            "0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );

        data.domain.remove("version");
        data.domain.remove("verifyingContract");
        let fields = data.resolved_types()[DOMAIN_TYPE].clone();
        assert_eq!(
            fields,
            vec![
                TypedField::new("name", "string"),
                TypedField::new("chainId", "uint256")
            ]
        );
    }

    #[test]
    fn test_domain_only_primary_type() {
        let mut data = mail();
        data.primary_type = DOMAIN_TYPE.to_string();
        let domain = hash_domain(&data).unwrap();
        let mut payload = vec![0x19, 0x01];
        payload.extend_from_slice(domain.as_bytes());
        assert_eq!(hash_typed_data(&data).unwrap(), B256(keccak256(&payload)));
    }

    #[test]
    fn test_dependencies_sorted() {
        let mut types = Types::new();
        types.insert(
            "Top".to_string(),
            vec![TypedField::new("z", "Zeta"), TypedField::new("a", "Alpha[]")],
        );
        types.insert("Zeta".to_string(), vec![TypedField::new("v", "uint8")]);
        types.insert("Alpha".to_string(), vec![TypedField::new("next", "Zeta")]);
        assert_eq!(
            encode_type(&types, "Top").unwrap(),
            "Top(Zeta z,Alpha[] a)Alpha(Zeta next)Zeta(uint8 v)"
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut data = mail();
        data.primary_type = "Letter".to_string();
        assert!(matches!(data.validate(), Err(Error::InvalidTypedData(_))));

        let mut data = mail();
        data.types
            .get_mut("Person")
            .unwrap()
            .push(TypedField::new("age", "uint7"));
        assert!(matches!(data.validate(), Err(Error::InvalidTypedData(_))));

        let mut data = mail();
        data.types
            .get_mut("Person")
            .unwrap()
            .push(TypedField::new("friend", "Animal"));
        assert!(matches!(
            hash_typed_data(&data),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn test_missing_field() {
        let mut data = mail();
        data.message.as_object_mut().unwrap().remove("contents");
        assert!(matches!(
            hash_typed_data(&data),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn test_integer_ranges() {
        assert!(word_for("uint8", json!(255)).is_ok());
        assert!(word_for("uint8", json!(256)).is_err());
        assert!(word_for("uint8", json!(-1)).is_err());
        assert!(word_for("uint256", json!("0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff")).is_ok());
        assert!(word_for(
            "uint256",
            json!("115792089237316195423570985008687907853269984665640564039457584007913129639936")
        )
        .is_err());

        assert_eq!(word_for("int8", json!(-128)).unwrap(), {
            let mut w = [0xffu8; 32];
            w[31] = 0x80;
            w
        });
        assert!(word_for("int8", json!(127)).is_ok());
        assert!(word_for("int8", json!(128)).is_err());
        assert!(word_for("int8", json!("-129")).is_err());
        assert_eq!(word_for("int256", json!("-1")).unwrap(), [0xffu8; 32]);
        assert_eq!(word_for("int16", json!("-0")).unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_fixed_bytes_and_arrays() {
        assert!(word_for("bytes4", json!("0x01020304")).is_ok());
        assert!(word_for("bytes4", json!("0x010203")).is_err());
        assert!(word_for("bytes4", json!("01020304")).is_err());
        assert!(word_for("bytes33", json!("0x00")).is_err());

        assert!(word_for("uint8[2]", json!([1, 2])).is_ok());
        assert!(word_for("uint8[2]", json!([1, 2, 3])).is_err());
        assert!(word_for("uint8[]", json!([])).is_ok());
        assert!(word_for("bool", json!("true")).is_err());
    }

    #[test]
    fn test_key_order_independence() {
        let data = mail();
        let reordered: TypedData = serde_json::from_value(json!({
            "message": {
                "contents": "Hello, Bob!",
                "to": { "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB", "name": "Bob" },
                "from": { "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826", "name": "Cow" }
            },
            "domain": {
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC",
                "chainId": "1",
                "version": "1",
                "name": "Ether Mail"
            },
            "primaryType": "Mail",
            "types": data.types
        }))
        .unwrap();
        assert_eq!(
            hash_typed_data(&reordered).unwrap(),
            hash_typed_data(&data).unwrap()
        );
    }
}

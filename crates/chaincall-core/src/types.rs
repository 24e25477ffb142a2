//! Value model and call descriptors.
//!
//! Every decoded return value, fallback value and call argument is a
//! [`Value`], so consumers never handle raw ABI tokens. A [`CallDescriptor`]
//! is the human-friendly description of one sub-call: a method signature
//! with its return types, the argument values and the keys under which the
//! outputs are published.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use alloy_primitives::{Address, I256, U256};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// A decoded (or caller-supplied) value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Uint(U256),
    Int(I256),
    Address(Address),
    /// `bytes` and `bytesN`
    Bytes(Vec<u8>),
    Str(String),
    /// Only produced by transforms, never by the decoder.
    Float(f64),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Null,
}

impl Value {
    /// Returns `true` if this value is logically null/absent.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned view; non-negative signed integers qualify too.
    pub fn as_u256(&self) -> Option<U256> {
        match self {
            Value::Uint(u) => Some(*u),
            Value::Int(i) if !i.is_negative() => Some(i.into_raw()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) | Value::Tuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Lossy conversion to `f64`, convenient for scaling transforms.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Uint(u) => u.to_string().parse().ok(),
            Value::Int(i) => i.to_string().parse().ok(),
            _ => None,
        }
    }

    /// Convert a JSON argument into a call value.
    ///
    /// Numbers become integers when they are integral, strings stay strings
    /// and are coerced against the declared ABI type at encode time. Tuple
    /// arguments are positional arrays; objects are rejected since their key
    /// order does not survive parsing.
    pub fn from_json(v: serde_json::Value) -> Result<Self, String> {
        Ok(match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::Uint(U256::from(u))
                } else if let Some(i) = n.as_i64() {
                    Value::Int(I256::try_from(i).unwrap_or(I256::ZERO))
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(_) => {
                return Err("object arguments are not supported; pass tuples as arrays".into())
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Address(a) => write!(f, "{}", a.to_checksum(None)),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Array(v) | Value::Tuple(v) => {
                let parts: Vec<_> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Null => write!(f, "null"),
        }
    }
}

// Floats hash by bit pattern; only used for calldata cache keys.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Uint(u) => u.hash(state),
            Value::Int(i) => i.into_raw().hash(state),
            Value::Address(a) => a.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Array(v) | Value::Tuple(v) => v.hash(state),
            Value::Null => {}
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Uint(_) | Value::Int(_) | Value::Address(_) | Value::Bytes(_) => {
                serializer.serialize_str(&self.to_string())
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Array(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(U256::from(v))
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Value::Uint(U256::from(v))
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Value::Uint(v)
    }
}

impl From<I256> for Value {
    fn from(v: I256) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Value::Address(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// Caller-supplied post-processing applied to a decoded value.
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One named output of a call, with an optional transform.
#[derive(Clone)]
pub struct ReturnSpec {
    pub key: String,
    pub transform: Option<Transform>,
}

impl ReturnSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            transform: None,
        }
    }

    pub fn with_transform<F>(key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            transform: Some(Arc::new(f)),
        }
    }

    /// `transform(value)`, or a clone of `value` when there is no transform.
    pub fn apply(&self, value: &Value) -> Value {
        match &self.transform {
            Some(f) => f(value),
            None => value.clone(),
        }
    }
}

impl fmt::Debug for ReturnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnSpec")
            .field("key", &self.key)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// A single read-only call in human-friendly form.
///
/// ```
/// use chaincall_core::{CallDescriptor, Value};
///
/// let call = CallDescriptor::new("getEthBalance(address)(uint256)")
///     .arg("0x000000000D0D02A775C6E45C2b88572C07CF665B")
///     .returns("ETH_BALANCE");
/// assert_eq!(call.args.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawCallDescriptor")]
pub struct CallDescriptor {
    /// Contract to call; `None` means the aggregator contract itself.
    pub target: Option<Address>,
    /// `name(argTypes)(returnTypes)`
    pub method: String,
    pub args: Vec<Value>,
    pub returns: Vec<ReturnSpec>,
}

impl CallDescriptor {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            target: None,
            method: method.into(),
            args: vec![],
            returns: vec![],
        }
    }

    pub fn target(mut self, target: Address) -> Self {
        self.target = Some(target);
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn returns(mut self, key: impl Into<String>) -> Self {
        self.returns.push(ReturnSpec::new(key));
        self
    }

    pub fn returns_with<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.returns.push(ReturnSpec::with_transform(key, f));
        self
    }
}

impl From<CallDescriptor> for Vec<CallDescriptor> {
    fn from(call: CallDescriptor) -> Self {
        vec![call]
    }
}

/// JSON shape: `{ "target"?, "call": [sig, ...args] | sig, "returns": [[key], ...] }`.
#[derive(Deserialize)]
struct RawCallDescriptor {
    #[serde(default)]
    target: Option<Address>,
    call: RawCall,
    #[serde(default)]
    returns: Vec<RawReturn>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCall {
    Signature(String),
    Full(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReturn {
    Key(String),
    Entry(Vec<String>),
}

impl TryFrom<RawCallDescriptor> for CallDescriptor {
    type Error = String;

    fn try_from(raw: RawCallDescriptor) -> Result<Self, Self::Error> {
        let (method, args) = match raw.call {
            RawCall::Signature(s) => (s, vec![]),
            RawCall::Full(mut parts) => {
                if parts.is_empty() {
                    return Err("`call` must start with a method signature".into());
                }
                let method = match parts.remove(0) {
                    serde_json::Value::String(s) => s,
                    other => return Err(format!("method signature must be a string, got {other}")),
                };
                (
                    method,
                    parts
                        .into_iter()
                        .map(Value::from_json)
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        };
        let returns = raw
            .returns
            .into_iter()
            .map(|r| match r {
                RawReturn::Key(key) => Ok(ReturnSpec::new(key)),
                RawReturn::Entry(entry) => entry
                    .into_iter()
                    .next()
                    .map(ReturnSpec::new)
                    .ok_or_else(|| "empty return entry".to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            target: raw.target,
            method,
            args,
            returns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_from_json_shape() {
        let json = r#"{
            "target": "0xd9c99510a5e3145359d91fe9caf92dd5d68b603a",
            "call": ["balanceOf(address)(uint256)", "0x86dd9a218780c64f934799a530371795d46f1a8a"],
            "returns": [["BALANCE_OF_FISH"]]
        }"#;
        let call: CallDescriptor = serde_json::from_str(json).unwrap();
        assert!(call.target.is_some());
        assert_eq!(call.method, "balanceOf(address)(uint256)");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.returns[0].key, "BALANCE_OF_FISH");
        assert!(call.returns[0].transform.is_none());
    }

    #[test]
    fn descriptor_from_bare_signature() {
        let call: CallDescriptor =
            serde_json::from_str(r#"{"call": "getBlockNumber()(uint256)", "returns": ["BLOCK"]}"#)
                .unwrap();
        assert!(call.target.is_none());
        assert!(call.args.is_empty());
        assert_eq!(call.returns[0].key, "BLOCK");
    }

    #[test]
    fn descriptor_rejects_non_string_signature() {
        let res: Result<CallDescriptor, _> =
            serde_json::from_str(r#"{"call": [42], "returns": []}"#);
        assert!(res.is_err());
    }

    #[test]
    fn return_spec_apply() {
        let plain = ReturnSpec::new("A");
        assert_eq!(plain.apply(&Value::from(5u64)), Value::from(5u64));

        let doubled = ReturnSpec::with_transform("B", |v| {
            Value::Uint(v.as_u256().unwrap_or_default() * U256::from(2))
        });
        assert_eq!(doubled.apply(&Value::from(5u64)), Value::from(10u64));
    }

    #[test]
    fn value_json_serialization() {
        let v = Value::Array(vec![
            Value::Uint(U256::from(10).pow(U256::from(18))),
            Value::Bool(true),
            Value::Null,
        ]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"["1000000000000000000",true,null]"#
        );
    }

    #[test]
    fn value_from_json_numbers() {
        assert_eq!(Value::from_json(serde_json::json!(7)), Ok(Value::from(7u64)));
        assert_eq!(
            Value::from_json(serde_json::json!(-7)),
            Ok(Value::Int(I256::try_from(-7i64).unwrap()))
        );
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Ok(Value::Float(1.5)));
    }

    #[test]
    fn tuple_arguments_must_be_arrays() {
        assert_eq!(
            Value::from_json(serde_json::json!([1, "0xab"])),
            Ok(Value::Array(vec![Value::from(1u64), Value::from("0xab")]))
        );
        assert!(Value::from_json(serde_json::json!({ "b": 1, "a": 2 })).is_err());

        let json = r#"{ "call": ["f((uint256,uint256))(uint256)", { "y": 1, "x": 2 }], "returns": [["F"]] }"#;
        let err = serde_json::from_str::<CallDescriptor>(json).unwrap_err();
        assert!(err.to_string().contains("pass tuples as arrays"), "{err}");
    }
}

//! Variable bindings and their textual rendering.

use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    IpAddress(Ipv4Addr),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    Null,
    /// Anything else, kept as the type name and text the agent reported.
    Other { type_name: String, text: String },
}

impl SnmpValue {
    /// Type name as it appears in result records.
    pub fn type_name(&self) -> &str {
        match self {
            SnmpValue::Integer(_) => "Integer",
            SnmpValue::OctetString(_) => "OctetString",
            SnmpValue::ObjectIdentifier(_) => "ObjectIdentifier",
            SnmpValue::IpAddress(_) => "IPAddress",
            SnmpValue::Counter32(_) => "Counter32",
            SnmpValue::Gauge32(_) => "Gauge32",
            SnmpValue::TimeTicks(_) => "TimeTicks",
            SnmpValue::Counter64(_) => "Counter64",
            SnmpValue::Null => "Null",
            SnmpValue::Other { type_name, .. } => type_name,
        }
    }
}

/// Octet strings render as (lossy) text, OIDs as dotted strings, the rest in
/// their plain textual form.
impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Integer(v) => write!(f, "{}", v),
            SnmpValue::OctetString(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            SnmpValue::ObjectIdentifier(oid) => f.write_str(oid),
            SnmpValue::IpAddress(addr) => write!(f, "{}", addr),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => write!(f, "{}", v),
            SnmpValue::Counter64(v) => write!(f, "{}", v),
            SnmpValue::Null => f.write_str("<nil>"),
            SnmpValue::Other { text, .. } => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: String,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self { oid: oid.into(), value }
    }
}

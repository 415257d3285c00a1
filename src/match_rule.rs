//! Compiling subscription rules and testing messages against them.
//!
//! A [`MatchRule`] is the predicate half of the bus's `AddMatch` mechanism:
//! build one, [`MatchRule::matches`] it against messages locally (for the
//! router's filter dispatch), or [`MatchRule::serialize`] it to hand to
//! `standard_messages::add_match`.

use crate::message_builder::MarshalledMessage;
use crate::message_builder::MessageType;
use crate::signature::{Base, Type};
use crate::value;
use crate::wire::unmarshal::UnmarshalContext;
use crate::wire::validate_raw;

/// The three flavours of argument condition the bus understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Path,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgCondition {
    pub argno: u8,
    pub kind: ArgKind,
    pub value: String,
}

/// An error building a [`MatchRule`]: currently only the
/// `path`/`path_namespace` mutual-exclusion invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("path and path_namespace are mutually exclusive on a match rule")]
    PathAndNamespaceBothSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRule {
    pub typ: Option<String>,
    pub sender: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub path: Option<String>,
    pub path_namespace: Option<String>,
    pub destination: Option<String>,
    pub eavesdrop: Option<bool>,
    pub args: Vec<ArgCondition>,
}

impl MatchRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
    pub fn with_path_namespace(mut self, ns: impl Into<String>) -> Self {
        self.path_namespace = Some(ns.into());
        self
    }
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
    pub fn with_eavesdrop(mut self, eavesdrop: bool) -> Self {
        self.eavesdrop = Some(eavesdrop);
        self
    }
    pub fn with_arg(mut self, argno: u8, kind: ArgKind, value: impl Into<String>) -> Self {
        self.args.push(ArgCondition {
            argno,
            kind,
            value: value.into(),
        });
        self
    }

    /// Checks the invariants the bus itself enforces. Called by `build`;
    /// exposed so callers assembling a rule field-by-field can validate
    /// early.
    pub fn validate(&self) -> Result<(), Error> {
        if self.path.is_some() && self.path_namespace.is_some() {
            return Err(Error::PathAndNamespaceBothSet);
        }
        Ok(())
    }

    pub fn build(self) -> Result<Self, Error> {
        self.validate()?;
        Ok(self)
    }

    /// Tests whether `msg` satisfies every condition set on this rule.
    pub fn matches(&self, msg: &MarshalledMessage) -> bool {
        if let Some(typ) = &self.typ {
            if message_type_str(msg.typ) != Some(typ.as_str()) {
                return false;
            }
        }
        if let Some(sender) = &self.sender {
            if msg.dynheader.sender.as_deref() != Some(sender.as_str()) {
                return false;
            }
        }
        if let Some(destination) = &self.destination {
            if msg.dynheader.destination.as_deref() != Some(destination.as_str()) {
                return false;
            }
        }
        if let Some(interface) = &self.interface {
            if msg.dynheader.interface.as_deref() != Some(interface.as_str()) {
                return false;
            }
        }
        if let Some(member) = &self.member {
            if msg.dynheader.member.as_deref() != Some(member.as_str()) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if msg.dynheader.object.as_deref() != Some(path.as_str()) {
                return false;
            }
        }
        if let Some(ns) = &self.path_namespace {
            match &msg.dynheader.object {
                Some(actual) if path_namespace_matches(actual, ns) => {}
                _ => return false,
            }
        }
        for cond in &self.args {
            let actual = match body_arg_as_str(msg, cond.argno) {
                Some(s) => s,
                None => return false,
            };
            let ok = match cond.kind {
                ArgKind::String => actual == cond.value,
                ArgKind::Path => path_arg_matches(&actual, &cond.value),
                ArgKind::Namespace => namespace_arg_matches(&actual, &cond.value),
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Serialises to the `key='value',...` form `AddMatch` expects: keys in
    /// sorted order, values with embedded single quotes escaped.
    pub fn serialize(&self) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(v) = &self.typ {
            pairs.push(("type".to_owned(), v.clone()));
        }
        if let Some(v) = &self.sender {
            pairs.push(("sender".to_owned(), v.clone()));
        }
        if let Some(v) = &self.interface {
            pairs.push(("interface".to_owned(), v.clone()));
        }
        if let Some(v) = &self.member {
            pairs.push(("member".to_owned(), v.clone()));
        }
        if let Some(v) = &self.path {
            pairs.push(("path".to_owned(), v.clone()));
        }
        if let Some(v) = &self.path_namespace {
            pairs.push(("path_namespace".to_owned(), v.clone()));
        }
        if let Some(v) = &self.destination {
            pairs.push(("destination".to_owned(), v.clone()));
        }
        if let Some(v) = &self.eavesdrop {
            pairs.push(("eavesdrop".to_owned(), v.to_string()));
        }
        for cond in &self.args {
            let key = match cond.kind {
                ArgKind::String => format!("arg{}", cond.argno),
                ArgKind::Path => format!("arg{}path", cond.argno),
                ArgKind::Namespace => format!("arg{}namespace", cond.argno),
            };
            pairs.push((key, cond.value.clone()));
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}='{}'", k, escape_value(&v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn escape_value(v: &str) -> String {
    v.replace('\'', "\\'")
}

fn message_type_str(typ: MessageType) -> Option<&'static str> {
    match typ {
        MessageType::Call => Some("method_call"),
        MessageType::Reply => Some("method_return"),
        MessageType::Error => Some("error"),
        MessageType::Signal => Some("signal"),
        MessageType::Invalid => None,
    }
}

fn path_namespace_matches(actual: &str, ns: &str) -> bool {
    if ns.is_empty() {
        return actual == "/";
    }
    actual == ns || actual.starts_with(&format!("{}/", ns))
}

fn path_arg_matches(actual: &str, value: &str) -> bool {
    if actual == value {
        return true;
    }
    if actual.len() > value.len()
        && actual.starts_with(value)
        && actual.as_bytes()[value.len()] == b'/'
    {
        return true;
    }
    if value.len() > actual.len()
        && value.starts_with(actual)
        && value.as_bytes()[actual.len()] == b'/'
    {
        return true;
    }
    false
}

fn namespace_arg_matches(actual: &str, value: &str) -> bool {
    actual == value || actual.starts_with(&format!("{}.", value))
}

/// Walks the body's top-level signature, skipping every element that isn't
/// `argno`, and returns the string value there if it is a string-like type.
/// Returns `None` for a missing index, a non-string element, or a malformed
/// body -- all of which are "condition fails", never an error, per the
/// matching rules.
fn body_arg_as_str(msg: &MarshalledMessage, argno: u8) -> Option<String> {
    let sig = msg.get_sig();
    if sig.is_empty() {
        return None;
    }
    let types = Type::parse_description(sig).ok()?;
    let buf = msg.get_buf();
    let byteorder = msg.body.byteorder();
    let mut offset = 0usize;
    for (idx, ty) in types.iter().enumerate() {
        if idx as u8 == argno {
            let is_stringlike = matches!(
                ty,
                Type::Base(Base::String) | Type::Base(Base::ObjectPath)
            );
            if !is_stringlike {
                return None;
            }
            let mut ctx = UnmarshalContext {
                buf,
                fds: msg.body.get_fds(),
                byteorder,
                offset,
            };
            return match value::unmarshal_typed(&mut ctx, ty) {
                Ok((_, value::Value::String(s))) => Some(s),
                Ok((_, value::Value::ObjectPath(s))) => Some(s),
                _ => None,
            };
        }
        offset = validate_raw::validate_marshalled(byteorder, offset, buf, ty).ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_builder::{DynamicHeader, MarshalledMessageBody};

    fn signal_with_args(args: &[&str]) -> MarshalledMessage {
        let mut msg = MarshalledMessage {
            typ: MessageType::Signal,
            flags: 0,
            dynheader: DynamicHeader {
                interface: Some("org.freedesktop.DBus".to_owned()),
                member: Some("NameOwnerChanged".to_owned()),
                object: Some("/org/freedesktop/DBus".to_owned()),
                ..Default::default()
            },
            body: MarshalledMessageBody::new(),
        };
        for a in args {
            msg.body.push_param((*a).to_owned()).unwrap();
        }
        msg
    }

    #[test]
    fn rejects_path_and_namespace_together() {
        let rule = MatchRule::new()
            .with_path("/a")
            .with_path_namespace("/b")
            .build();
        assert_eq!(rule.unwrap_err(), Error::PathAndNamespaceBothSet);
    }

    #[test]
    fn matches_type_and_member() {
        let rule = MatchRule::new()
            .with_type("signal")
            .with_interface("org.freedesktop.DBus")
            .with_member("NameOwnerChanged")
            .build()
            .unwrap();
        let msg = signal_with_args(&["io.example.Filter", "", ":1.1"]);
        assert!(rule.matches(&msg));
    }

    #[test]
    fn matches_arg0_string() {
        let rule = MatchRule::new()
            .with_arg(0, ArgKind::String, "io.example.Filter")
            .build()
            .unwrap();
        let msg = signal_with_args(&["io.example.Filter", "", ":1.1"]);
        assert!(rule.matches(&msg));

        let other = signal_with_args(&["io.example.Other", "", ":1.1"]);
        assert!(!rule.matches(&other));
    }

    #[test]
    fn path_namespace_accepts_children_only() {
        assert!(path_namespace_matches("/com/example", "/com/example"));
        assert!(path_namespace_matches("/com/example/Sub", "/com/example"));
        assert!(!path_namespace_matches("/com/examplething", "/com/example"));
        assert!(path_namespace_matches("/", ""));
    }

    #[test]
    fn serializes_sorted_and_escaped() {
        let rule = MatchRule::new()
            .with_type("signal")
            .with_sender("org.freedesktop.DBus")
            .build()
            .unwrap();
        assert_eq!(
            rule.serialize(),
            "sender='org.freedesktop.DBus',type='signal'"
        );
    }

    #[test]
    fn serialize_escapes_quotes() {
        let rule = MatchRule::new().with_member("it's").build().unwrap();
        assert_eq!(rule.serialize(), "member='it\\'s'");
    }
}

//! The node graph persisted by a [`Mold`](crate::Mold).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::array::Array;
use crate::binary::Binary;
use crate::error::Result;
use crate::hash::{
    CLOSURE_SALT, COMPOSITE_SALT, CONCAT_SALT, FALSE_HASH, HANDLER_SALT, PARAM_SALT, PROXY_SALT,
    TRUE_HASH, VOID_HASH, hash_f64, hash_i64, hash_push, hash_u64,
};
use crate::reference::Reference;
use crate::text::Text;

/// An immutable expression or value node.
///
/// Nodes are cheap to clone: every variant with children shares them through `Arc`.
/// Arrays, strings and binaries decoded from a mold are lazy views into its region.
#[derive(Clone, Debug)]
pub enum Node {
    Void,
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    /// Signed milliseconds.
    Duration(i64),
    /// Packed timestamp.
    Datetime(i64),
    /// Object id.
    Object(u64),
    /// A function value wrapping the function node it handles.
    Handler(Arc<Node>),
    Array(Array),
    String(Text),
    Binary(Binary),
    Proxy(Proxy),
    /// The i-th parameter of the enclosing function.
    Param(u32),
    /// Function applied to parameters, forwarding the caller's remaining parameters.
    Concat(Call),
    /// A function bound to the frame it is created in.
    Closure(Arc<Node>),
    /// Function applied to parameters.
    Composite(Call),
    /// A not yet forced computation. Cannot be persisted.
    Future(Deferred),
    /// An opaque host value. Cannot be persisted.
    Native(Native),
}

/// Discriminant of a [`Node`], used to request a specific kind on decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Void,
    Bool,
    Integer,
    Decimal,
    Duration,
    Datetime,
    Object,
    Handler,
    Array,
    String,
    Binary,
    Proxy,
    Param,
    Concat,
    Closure,
    Composite,
    Future,
    Native,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Void => NodeKind::Void,
            Node::Bool(_) => NodeKind::Bool,
            Node::Integer(_) => NodeKind::Integer,
            Node::Decimal(_) => NodeKind::Decimal,
            Node::Duration(_) => NodeKind::Duration,
            Node::Datetime(_) => NodeKind::Datetime,
            Node::Object(_) => NodeKind::Object,
            Node::Handler(_) => NodeKind::Handler,
            Node::Array(_) => NodeKind::Array,
            Node::String(_) => NodeKind::String,
            Node::Binary(_) => NodeKind::Binary,
            Node::Proxy(_) => NodeKind::Proxy,
            Node::Param(_) => NodeKind::Param,
            Node::Concat(_) => NodeKind::Concat,
            Node::Closure(_) => NodeKind::Closure,
            Node::Composite(_) => NodeKind::Composite,
            Node::Future(_) => NodeKind::Future,
            Node::Native(_) => NodeKind::Native,
        }
    }

    /// Stable 32-bit hash. Equal nodes have equal hashes.
    ///
    /// Array, string and binary hashes are computed once at construction, or read
    /// from the record for views.
    pub fn hash_code(&self) -> u32 {
        match self {
            Node::Void => VOID_HASH,
            Node::Bool(true) => TRUE_HASH,
            Node::Bool(false) => FALSE_HASH,
            Node::Integer(v) | Node::Duration(v) | Node::Datetime(v) => hash_i64(*v),
            Node::Decimal(v) => hash_f64(*v),
            Node::Object(v) => hash_u64(*v),
            Node::Handler(f) => hash_push(HANDLER_SALT, f.hash_code()),
            Node::Array(a) => a.hash_code(),
            Node::String(t) => t.hash_code(),
            Node::Binary(b) => b.hash_code(),
            Node::Proxy(p) => p.hash,
            Node::Param(i) => hash_push(PARAM_SALT, *i),
            Node::Concat(c) => hash_push(CONCAT_SALT, c.hash),
            Node::Closure(f) => hash_push(CLOSURE_SALT, f.hash_code()),
            Node::Composite(c) => hash_push(COMPOSITE_SALT, c.hash),
            Node::Future(d) => d.call.hash,
            Node::Native(n) => n.hash_code(),
        }
    }

    /// Structural equality. Fails only if a view cannot be read.
    ///
    /// Decimals compare by bit pattern. Futures and natives compare by identity.
    pub fn equals(&self, other: &Node) -> Result<bool> {
        if self.kind() != other.kind() || self.hash_code() != other.hash_code() {
            return Ok(false);
        }
        Ok(match (self, other) {
            (Node::Void, Node::Void) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Integer(a), Node::Integer(b))
            | (Node::Duration(a), Node::Duration(b))
            | (Node::Datetime(a), Node::Datetime(b)) => a == b,
            (Node::Decimal(a), Node::Decimal(b)) => a.to_bits() == b.to_bits(),
            (Node::Object(a), Node::Object(b)) => a == b,
            (Node::Handler(a), Node::Handler(b)) | (Node::Closure(a), Node::Closure(b)) => {
                a.equals(b)?
            }
            (Node::Array(a), Node::Array(b)) => a.equals(b)?,
            (Node::String(a), Node::String(b)) => a.equals(b)?,
            (Node::Binary(a), Node::Binary(b)) => a.equals(b)?,
            (Node::Proxy(a), Node::Proxy(b)) => a.equals(b)?,
            (Node::Param(a), Node::Param(b)) => a == b,
            (Node::Concat(a), Node::Concat(b)) | (Node::Composite(a), Node::Composite(b)) => {
                a.equals(b)?
            }
            (Node::Future(a), Node::Future(b)) => Arc::ptr_eq(&a.call, &b.call),
            (Node::Native(a), Node::Native(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false,
        })
    }

    /// The reference this node was decoded from, if it is a view into the mold with
    /// identity `store_id`.
    pub(crate) fn resident_in(&self, store_id: u64) -> Option<Reference> {
        match self {
            Node::Array(a) => a.view().and_then(|v| v.resident_in(store_id)),
            Node::String(t) => t.view().and_then(|v| v.resident_in(store_id)),
            Node::Binary(b) => b.view().and_then(|v| v.resident_in(store_id)),
            _ => None,
        }
    }

    pub fn string(value: &str) -> Node {
        Node::String(Text::new(value))
    }

    pub fn binary(bytes: Vec<u8>) -> Node {
        Node::Binary(Binary::new(bytes))
    }

    pub fn array(items: Vec<Node>) -> Node {
        Node::Array(Array::new(items))
    }

    pub fn handler(function: Node) -> Node {
        Node::Handler(Arc::new(function))
    }

    pub fn closure(function: Node) -> Node {
        Node::Closure(Arc::new(function))
    }

    pub fn concat(function: Node, params: Vec<Node>) -> Node {
        Node::Concat(Call::new(function, params))
    }

    pub fn composite(function: Node, params: Vec<Node>) -> Node {
        Node::Composite(Call::new(function, params))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Node {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Node {
        Node::Integer(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Node {
        Node::Decimal(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Node {
        Node::string(value)
    }
}

impl From<Array> for Node {
    fn from(value: Array) -> Node {
        Node::Array(value)
    }
}

impl From<Text> for Node {
    fn from(value: Text) -> Node {
        Node::String(value)
    }
}

impl From<Binary> for Node {
    fn from(value: Binary) -> Node {
        Node::Binary(value)
    }
}

/// A function applied to parameters.
#[derive(Clone, Debug)]
pub struct Call {
    function: Arc<Node>,
    params: Arc<[Node]>,
    hash: u32,
}

impl Call {
    pub fn new(function: Node, params: Vec<Node>) -> Self {
        let params: Arc<[Node]> = params.into();
        let hash = params
            .iter()
            .map(Node::hash_code)
            .fold(function.hash_code(), hash_push);
        Call {
            function: Arc::new(function),
            params,
            hash,
        }
    }

    pub fn function(&self) -> &Node {
        &self.function
    }

    pub fn params(&self) -> &[Node] {
        &self.params
    }

    fn equals(&self, other: &Call) -> Result<bool> {
        if self.params.len() != other.params.len() || !self.function.equals(&other.function)? {
            return Ok(false);
        }
        for (a, b) in self.params.iter().zip(other.params.iter()) {
            if !a.equals(b)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A named placeholder for a function, bound to its target once that is known.
///
/// An unbound proxy has no target.
#[derive(Clone, Debug)]
pub struct Proxy {
    id: Arc<Node>,
    name: Text,
    target: Option<Arc<Node>>,
    hash: u32,
}

impl Proxy {
    pub fn new(id: Node, name: Text, target: Option<Node>) -> Self {
        let hash = hash_push(hash_push(PROXY_SALT, id.hash_code()), name.hash_code());
        Proxy {
            id: Arc::new(id),
            name,
            target: target.map(Arc::new),
            hash,
        }
    }

    pub fn id(&self) -> &Node {
        &self.id
    }

    pub fn name(&self) -> &Text {
        &self.name
    }

    pub fn target(&self) -> Option<&Node> {
        self.target.as_deref()
    }

    fn equals(&self, other: &Proxy) -> Result<bool> {
        if !self.id.equals(&other.id)? || !self.name.equals(&other.name)? {
            return Ok(false);
        }
        match (&self.target, &other.target) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => a.equals(b),
            _ => Ok(false),
        }
    }
}

/// A pending call that has not been evaluated yet.
#[derive(Clone, Debug)]
pub struct Deferred {
    call: Arc<Call>,
}

impl Deferred {
    pub fn new(call: Call) -> Self {
        Deferred {
            call: Arc::new(call),
        }
    }

    pub fn call(&self) -> &Call {
        &self.call
    }
}

/// A host value the node graph carries but cannot describe.
#[derive(Clone)]
pub struct Native {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Native {
    pub fn new(name: &'static str, value: impl Any + Send + Sync) -> Self {
        Native {
            name,
            value: Arc::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    fn hash_code(&self) -> u32 {
        hash_u64(Arc::as_ptr(&self.value) as *const () as usize as u64)
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_nodes_hash_equal() {
        let a = Node::array(vec![Node::Integer(1), Node::string("ab"), Node::Bool(true)]);
        let b = Node::array(vec![Node::Integer(1), Node::string("ab"), Node::Bool(true)]);
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
    }

    #[test]
    fn kinds_are_distinct() {
        assert_ne!(Node::Integer(5), Node::Duration(5));
        assert_ne!(Node::Integer(5).kind(), Node::Datetime(5).kind());
        assert_ne!(
            Node::concat(Node::Param(0), vec![Node::Void]),
            Node::composite(Node::Param(0), vec![Node::Void])
        );
    }

    #[test]
    fn decimal_equality_is_bitwise() {
        assert_eq!(Node::Decimal(f64::NAN), Node::Decimal(f64::NAN));
        assert_ne!(Node::Decimal(0.0), Node::Decimal(-0.0));
    }

    #[test]
    fn proxy_equality_includes_target() {
        let unbound = Proxy::new(Node::Integer(1), Text::new("f"), None);
        let bound = Proxy::new(Node::Integer(1), Text::new("f"), Some(Node::Param(0)));
        assert_eq!(Node::Proxy(unbound.clone()), Node::Proxy(unbound.clone()));
        assert_ne!(Node::Proxy(unbound), Node::Proxy(bound));
    }

    #[test]
    fn futures_and_natives_compare_by_identity() {
        let future = Node::Future(Deferred::new(Call::new(Node::Param(0), vec![])));
        let other = Node::Future(Deferred::new(Call::new(Node::Param(0), vec![])));
        assert_eq!(future, future.clone());
        assert_ne!(future, other);

        let native = Node::Native(Native::new("counter", 7u32));
        assert_eq!(native, native.clone());
        if let Node::Native(n) = &native {
            assert_eq!(n.downcast_ref::<u32>(), Some(&7));
        }
    }

    #[test]
    fn call_accessors() {
        let call = Call::new(Node::Param(1), vec![Node::Integer(2), Node::Void]);
        assert_eq!(call.function(), &Node::Param(1));
        assert_eq!(call.params().len(), 2);
    }
}

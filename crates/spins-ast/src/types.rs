//! Variable declarations and their types.

use crate::expr::Expr;
use crate::span::Span;
use serde::{Deserialize, Serialize};

/// Index of a variable in `Specification::variables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// Index of a process instance in `Specification::processes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcId(pub usize);

/// Index of a state in its `Automaton::states`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub usize);

/// Promela scalar types. Each occupies one slot of the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bit,
    Bool,
    Byte,
    Pid,
    Mtype,
    Short,
    Int,
}

impl ScalarType {
    /// Declared bit width.
    pub fn bits(self) -> u32 {
        match self {
            ScalarType::Bit | ScalarType::Bool => 1,
            ScalarType::Byte | ScalarType::Pid | ScalarType::Mtype => 8,
            ScalarType::Short => 16,
            ScalarType::Int => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bit => "bit",
            ScalarType::Bool => "bool",
            ScalarType::Byte => "byte",
            ScalarType::Pid => "pid",
            ScalarType::Mtype => "mtype",
            ScalarType::Short => "short",
            ScalarType::Int => "int",
        }
    }

    /// Inclusive value range of the type.
    pub fn bounds(self) -> (i64, i64) {
        match self {
            ScalarType::Bit | ScalarType::Bool => (0, 1),
            ScalarType::Byte | ScalarType::Pid | ScalarType::Mtype => (0, 255),
            ScalarType::Short => (i16::MIN as i64, i16::MAX as i64),
            ScalarType::Int => (i32::MIN as i64, i32::MAX as i64),
        }
    }
}

/// A user-defined `typedef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<Field>,
}

/// A `typedef` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: VarType,
    #[serde(default)]
    pub array: Option<usize>,
}

/// A channel declaration `chan c = [capacity] of { fields }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelType {
    /// Buffer capacity; `Some(0)` is a rendezvous channel, `None` is a
    /// channel parameter whose capacity is only known after run binding.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Message field types; the message arity is their number.
    pub fields: Vec<ScalarType>,
}

impl ChannelType {
    pub fn is_rendezvous(&self) -> bool {
        self.capacity == Some(0)
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// The type of a declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VarType {
    Scalar { scalar: ScalarType },
    Struct(StructType),
    Channel(ChannelType),
}

impl VarType {
    pub fn scalar(scalar: ScalarType) -> Self {
        VarType::Scalar { scalar }
    }

    pub fn int() -> Self {
        Self::scalar(ScalarType::Int)
    }

    pub fn byte() -> Self {
        Self::scalar(ScalarType::Byte)
    }

    pub fn bool() -> Self {
        Self::scalar(ScalarType::Bool)
    }

    pub fn mtype() -> Self {
        Self::scalar(ScalarType::Mtype)
    }

    pub fn channel(capacity: usize, fields: Vec<ScalarType>) -> Self {
        VarType::Channel(ChannelType {
            capacity: Some(capacity),
            fields,
        })
    }

    /// A channel-typed process parameter, bound by reference at run time.
    pub fn channel_param(fields: Vec<ScalarType>) -> Self {
        VarType::Channel(ChannelType {
            capacity: None,
            fields,
        })
    }

    pub fn as_channel(&self) -> Option<&ChannelType> {
        match self {
            VarType::Channel(ct) => Some(ct),
            _ => None,
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, VarType::Channel(_))
    }
}

/// A declared variable: global, process local, or process parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: VarType,
    /// Owning process instance; `None` for globals.
    #[serde(default)]
    pub owner: Option<ProcId>,
    /// Array size, `None` for non-array variables.
    #[serde(default)]
    pub array: Option<usize>,
    #[serde(default)]
    pub init: Option<Expr>,
    /// Declared `hidden`: kept out of the state vector.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub span: Span,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
            owner: None,
            array: None,
            init: None,
            hidden: false,
            span: Span::dummy(),
        }
    }

    pub fn with_array(mut self, size: usize) -> Self {
        self.array = Some(size);
        self
    }

    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_owner(mut self, owner: ProcId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }
}

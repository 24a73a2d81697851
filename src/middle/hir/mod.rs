//! The typed tree handed over by the type checker. Every expression carries
//! its resolved [`ModifiedType`] and every call its resolved [`SignatureId`], so
//! lowering never has to infer anything. Spans are kept on statements and
//! expressions so that diagnostics raised on the LIR can point back at source.

use strum::Display;

use crate::{
    middle::ty::{ModifiedType, SignatureId, TypeId},
    span::Span,
};

pub mod visit;

/// A class or interface being compiled, including its nested classes
#[derive(Debug, Clone)]
pub struct Class {
    pub ty: TypeId,
    pub span: Span,
    pub fields: Vec<FieldDecl>,
    pub constants: Vec<ConstantDecl>,
    pub methods: Vec<MethodDecl>,
    pub inner: Vec<Class>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: ModifiedType,
    pub initializer: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ConstantDecl {
    pub name: String,
    pub ty: ModifiedType,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub signature: SignatureId,
    pub parameter_names: Vec<String>,
    /// Absent for abstract, native and imported methods
    pub body: Option<Block>,
    pub span: Span,
    /// Set on the default create added to classes which declare none
    pub synthesized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Stmt>, span: Span) -> Self {
        Self { statements, span }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Local {
        name: String,
        ty: ModifiedType,
        initializer: Option<Expr>,
    },
    Expr(Expr),
    /// `a = b = c` has targets `[a, b]`. A compound assignment (`a += c`)
    /// carries its operator and exactly one target.
    Assign {
        targets: Vec<Expr>,
        operator: Option<BinaryOp>,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Do {
        body: Block,
        condition: Expr,
    },
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Stmt>,
        body: Block,
    },
    Foreach {
        name: String,
        ty: ModifiedType,
        collection: Expr,
        body: Block,
    },
    Break,
    Continue,
    Return(Vec<Expr>),
    Throw(Expr),
    Try {
        body: Block,
        recover: Option<Block>,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    Block(Block),
    /// `this(...)` or `super(...)` inside a create
    ExplicitCreate {
        kind: CreateKind,
        signature: SignatureId,
        arguments: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub name: String,
    pub ty: ModifiedType,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub labels: Vec<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    This,
    Super,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: ModifiedType,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: ModifiedType, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    /// A local variable or parameter
    Local(String),
    This,
    Constant {
        owner: TypeId,
        name: String,
    },
    /// A base expression followed by field, index, call and length suffixes
    Chain {
        base: Box<Expr>,
        suffixes: Vec<Suffix>,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        operator: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// `value ?? fallback`
    Coalesce {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    /// `check(value)`, which jumps to the enclosing recover block on null
    Check(Box<Expr>),
    /// Conversion to the type of the expression itself
    Cast(Box<Expr>),
    Create {
        signature: SignatureId,
        arguments: Vec<Expr>,
    },
    /// Array allocation. The allocated type is the type of the expression,
    /// and there is one size per dimension of every nested array level.
    NewArray {
        sizes: Vec<Expr>,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct Suffix {
    pub kind: SuffixKind,
    pub ty: ModifiedType,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum SuffixKind {
    Field(String),
    Index(Vec<Expr>),
    Call {
        signature: SignatureId,
        arguments: Vec<Expr>,
    },
    Length,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Code(char),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Null,
}

impl Literal {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl core::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Code(value) => write!(f, "{value:?}"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::UInt(value) => write!(f, "{value}u"),
            Literal::Float(value) => write!(f, "{value:?}"),
            Literal::String(value) => write!(f, "{value:?}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    Complement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "<<<")]
    RotateLeft,
    #[strum(serialize = ">>>")]
    RotateRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    /// Identity comparison, `===`
    #[strum(serialize = "===")]
    Same,
    #[strum(serialize = "!==")]
    NotSame,
}

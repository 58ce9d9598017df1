//! Parsed representation of a ChatterLang script (spec §6), mirroring the
//! original's `chatterlang/compiler.py` AST dataclasses.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Str(s) => Value::String(s.clone()),
            Literal::Int(i) => Value::from(*i),
            Literal::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

/// The right-hand side of a `name=value` pair in a `[...]` param list.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Literal),
    /// A bare identifier: resolved at compile time against `ConstStore`.
    Identifier(String),
    List(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

/// A source or segment name with its resolved-at-parse-time parameter list
/// (identifiers inside are resolved against constants during compilation).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputNode {
    /// A bare string literal used directly as an `echo` source.
    Literal(String),
    /// `@name`: a variable-source reading the named variable at run time.
    Variable(String),
    /// A named, registered source with parameters.
    Source(NodeSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageNode {
    Segment(NodeSpec),
    /// `@name` used as a mid-pipeline stage: buffers input, writes it to the
    /// variable, and re-emits it unchanged.
    VariableSink(String),
    /// `{ pipeline, pipeline, ... }`: an in-pipeline parallel fan-out.
    Fork(Vec<ParsedPipeline>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedPipeline {
    pub input: Option<InputNode>,
    pub stages: Vec<StageNode>,
    /// `... → NAME` at the end of the pipeline: this pipeline is a producer
    /// for the named arrow-fork.
    pub produces_to: Option<String>,
    /// `NAME → ...` at the start of the pipeline: this pipeline is a
    /// consumer of the named arrow-fork.
    pub consumes_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLoop {
    pub times: usize,
    pub pipelines: Vec<ParsedPipeline>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Loop(ParsedLoop),
    Pipeline(ParsedPipeline),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedScript {
    pub constants: Vec<(String, Literal)>,
    pub statements: Vec<Statement>,
}

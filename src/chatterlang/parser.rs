//! Recursive-descent parser for the ChatterLang grammar (spec §6).
//!
//! Grammar ambiguity noted in SPEC_FULL.md's Open Questions: the EBNF lists
//! both `[ "→" IDENT ]` (producer) and `[ IDENT "→" ]` (consumer) as trailing
//! forms on `pipeline`, but the worked examples put the consumer form
//! (`fork_name → pipeline-B;`) *before* the pipeline body. This parser
//! follows the examples: a leading `IDENT "→"` is a consumer declaration, a
//! trailing `"→" IDENT` is a producer declaration.

use super::ast::*;
use super::lexer::{Lexer, Tok};
use crate::error::CompileError;

pub fn parse(source: &str) -> Result<ParsedScript, CompileError> {
    let mut lexer = Lexer::tokenize(source)?;
    let mut script = ParsedScript::default();

    while !matches!(lexer.peek(), Tok::Eof) {
        if is_const_decl(&lexer) {
            let (name, literal) = parse_const_decl(&mut lexer)?;
            script.constants.push((name, literal));
        } else {
            let statement = parse_statement(&mut lexer)?;
            script.statements.push(statement);
        }
        consume_optional_semicolon(&mut lexer);
    }

    Ok(script)
}

fn is_const_decl(lexer: &Lexer) -> bool {
    matches!(lexer.peek(), Tok::Ident(s) if s.eq_ignore_ascii_case("const"))
}

fn is_loop(lexer: &Lexer) -> bool {
    matches!(lexer.peek(), Tok::Ident(s) if s.eq_ignore_ascii_case("loop"))
}

fn consume_optional_semicolon(lexer: &mut Lexer) {
    if matches!(lexer.peek(), Tok::Symbol(';')) {
        lexer.advance();
    }
}

fn parse_const_decl(lexer: &mut Lexer) -> Result<(String, Literal), CompileError> {
    lexer.expect_keyword("const")?;
    let name = lexer.expect_ident()?;
    lexer.expect_symbol('=')?;
    let literal = parse_literal(lexer)?;
    Ok((name, literal))
}

fn parse_statement(lexer: &mut Lexer) -> Result<Statement, CompileError> {
    if is_loop(lexer) {
        Ok(Statement::Loop(parse_loop(lexer)?))
    } else {
        Ok(Statement::Pipeline(parse_pipeline(lexer)?))
    }
}

fn parse_loop(lexer: &mut Lexer) -> Result<ParsedLoop, CompileError> {
    lexer.expect_keyword("loop")?;
    let times = match lexer.advance() {
        Tok::Int(n) if n >= 0 => n as usize,
        other => return Err(CompileError::Parse(format!("expected loop count, found {other:?}"))),
    };
    lexer.expect_keyword("times")?;
    lexer.expect_symbol('{')?;

    let mut pipelines = Vec::new();
    while !matches!(lexer.peek(), Tok::Symbol('}')) {
        pipelines.push(parse_pipeline(lexer)?);
        consume_optional_semicolon(lexer);
    }
    lexer.expect_symbol('}')?;

    Ok(ParsedLoop { times, pipelines })
}

/// `IDENT "→"` lookahead: a consumer-fork prefix.
fn peek_is_consumer_prefix(lexer: &Lexer) -> bool {
    matches!(lexer.peek(), Tok::Ident(_)) && matches!(lexer.peek_at(1), Tok::Arrow)
}

fn parse_pipeline(lexer: &mut Lexer) -> Result<ParsedPipeline, CompileError> {
    let mut pipeline = ParsedPipeline::default();

    if peek_is_consumer_prefix(lexer) {
        let name = lexer.expect_ident()?;
        lexer.advance(); // Arrow
        pipeline.consumes_from = Some(name);
    }

    if matches!(lexer.peek(), Tok::Ident(s) if s.eq_ignore_ascii_case("input")) {
        pipeline.input = Some(parse_input(lexer)?);
    }

    while matches!(lexer.peek(), Tok::Symbol('|')) {
        lexer.advance();
        pipeline.stages.push(parse_stage(lexer)?);
    }

    if matches!(lexer.peek(), Tok::Arrow) {
        lexer.advance();
        pipeline.produces_to = Some(lexer.expect_ident()?);
    }

    Ok(pipeline)
}

fn parse_input(lexer: &mut Lexer) -> Result<InputNode, CompileError> {
    lexer.expect_keyword("input")?;
    lexer.expect_keyword("from")?;

    if matches!(lexer.peek(), Tok::Symbol('@')) {
        lexer.advance();
        let name = lexer.expect_ident()?;
        return Ok(InputNode::Variable(name));
    }

    if let Tok::Str(s) = lexer.peek().clone() {
        lexer.advance();
        return Ok(InputNode::Literal(s));
    }

    let spec = parse_node_spec(lexer)?;
    Ok(InputNode::Source(spec))
}

fn parse_stage(lexer: &mut Lexer) -> Result<StageNode, CompileError> {
    if matches!(lexer.peek(), Tok::Symbol('@')) {
        lexer.advance();
        let name = lexer.expect_ident()?;
        return Ok(StageNode::VariableSink(name));
    }

    if matches!(lexer.peek(), Tok::Symbol('{')) {
        lexer.advance();
        let mut branches = vec![parse_pipeline(lexer)?];
        while matches!(lexer.peek(), Tok::Symbol(',')) {
            lexer.advance();
            branches.push(parse_pipeline(lexer)?);
        }
        lexer.expect_symbol('}')?;
        return Ok(StageNode::Fork(branches));
    }

    let spec = parse_node_spec(lexer)?;
    Ok(StageNode::Segment(spec))
}

fn parse_node_spec(lexer: &mut Lexer) -> Result<NodeSpec, CompileError> {
    let name = lexer.expect_ident()?;
    let params = if matches!(lexer.peek(), Tok::Symbol('[')) {
        lexer.advance();
        let params = parse_param_list(lexer)?;
        lexer.expect_symbol(']')?;
        params
    } else {
        Vec::new()
    };
    Ok(NodeSpec { name, params })
}

fn parse_param_list(lexer: &mut Lexer) -> Result<Vec<Param>, CompileError> {
    let mut params = vec![parse_param(lexer)?];
    while matches!(lexer.peek(), Tok::Symbol(',')) {
        lexer.advance();
        params.push(parse_param(lexer)?);
    }
    Ok(params)
}

fn parse_param(lexer: &mut Lexer) -> Result<Param, CompileError> {
    let name = lexer.expect_ident()?;
    lexer.expect_symbol('=')?;

    let value = if matches!(lexer.peek(), Tok::Symbol('[')) {
        lexer.advance();
        let mut items = vec![parse_literal(lexer)?];
        while matches!(lexer.peek(), Tok::Symbol(',')) {
            lexer.advance();
            items.push(parse_literal(lexer)?);
        }
        lexer.expect_symbol(']')?;
        ParamValue::List(items)
    } else if is_bare_identifier(lexer.peek()) {
        let ident = lexer.expect_ident()?;
        ParamValue::Identifier(ident)
    } else {
        ParamValue::Literal(parse_literal(lexer)?)
    };

    Ok(Param { name, value })
}

fn is_bare_identifier(tok: &Tok) -> bool {
    matches!(tok, Tok::Ident(s) if !s.eq_ignore_ascii_case("true") && !s.eq_ignore_ascii_case("false"))
}

fn parse_literal(lexer: &mut Lexer) -> Result<Literal, CompileError> {
    match lexer.advance() {
        Tok::Str(s) => Ok(Literal::Str(s)),
        Tok::Int(n) => Ok(Literal::Int(n)),
        Tok::Float(f) => Ok(Literal::Float(f)),
        Tok::Ident(s) if s.eq_ignore_ascii_case("true") => Ok(Literal::Bool(true)),
        Tok::Ident(s) if s.eq_ignore_ascii_case("false") => Ok(Literal::Bool(false)),
        other => Err(CompileError::Parse(format!("expected a literal, found {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_const_decl() {
        let script = parse(r#"CONST greeting = "hi";"#).unwrap();
        assert_eq!(script.constants, vec![("greeting".to_string(), Literal::Str("hi".to_string()))]);
    }

    #[test]
    fn parses_a_simple_pipeline() {
        let script = parse(r#"INPUT FROM echo[data="hi"] | cast[cast_type="str"] | print;"#).unwrap();
        assert_eq!(script.statements.len(), 1);
        let Statement::Pipeline(p) = &script.statements[0] else { panic!("expected pipeline") };
        assert!(matches!(p.input, Some(InputNode::Source(_))));
        assert_eq!(p.stages.len(), 2);
    }

    #[test]
    fn parses_variable_input_and_sink() {
        let script = parse("INPUT FROM @seen | @again | print;").unwrap();
        let Statement::Pipeline(p) = &script.statements[0] else { panic!("expected pipeline") };
        assert!(matches!(p.input, Some(InputNode::Variable(ref v)) if v == "seen"));
        assert!(matches!(p.stages[0], StageNode::VariableSink(ref v) if v == "again"));
    }

    #[test]
    fn parses_fork_stage() {
        let script = parse("INPUT FROM range[lower=0,upper=3] | {print, print};").unwrap();
        let Statement::Pipeline(p) = &script.statements[0] else { panic!("expected pipeline") };
        assert!(matches!(p.stages[0], StageNode::Fork(ref branches) if branches.len() == 2));
    }

    #[test]
    fn parses_loop() {
        let script = parse("LOOP 3 TIMES { INPUT FROM echo[data=\"x\"] | print; }").unwrap();
        let Statement::Loop(l) = &script.statements[0] else { panic!("expected loop") };
        assert_eq!(l.times, 3);
        assert_eq!(l.pipelines.len(), 1);
    }

    #[test]
    fn parses_arrow_fork_producer_and_consumer() {
        let script = parse("INPUT FROM range[lower=0,upper=2] → tagged; tagged → | print;").unwrap();
        let Statement::Pipeline(producer) = &script.statements[0] else { panic!() };
        assert_eq!(producer.produces_to.as_deref(), Some("tagged"));
        let Statement::Pipeline(consumer) = &script.statements[1] else { panic!() };
        assert_eq!(consumer.consumes_from.as_deref(), Some("tagged"));
    }
}

//! `snippet[file]`: embeds a nested ChatterLang script as a single segment,
//! ported from `chatterlang/compiler.py`'s `snippet` built-in. Deliberately
//! *not* arbitrary code execution: `file` names either a path to a `.chat`
//! script on disk or, failing that, is itself treated as inline script
//! source, and either way the only thing ever run is more ChatterLang.

use crate::chatterlang::ast::ParsedScript;
use crate::chatterlang::compiler::{compile_parsed, CompiledScript};
use crate::chatterlang::parser::parse;
use crate::node::{HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment};
use std::sync::OnceLock;

pub struct Snippet {
    cell: RuntimeCell,
    parsed: ParsedScript,
    compiled: OnceLock<CompiledScript>,
}

impl Snippet {
    pub fn new(file: String) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(&file).unwrap_or(file);
        let parsed = parse(&source)?;
        Ok(Self { cell: RuntimeCell::new(), parsed, compiled: OnceLock::new() })
    }

    /// Compiled lazily, on first use, against the parent's runtime: the
    /// snippet's `@variable`s and constants live in the same
    /// `RuntimeContext` as the pipeline that embeds it.
    fn compiled(&self) -> &CompiledScript {
        self.compiled.get_or_init(|| {
            compile_parsed(self.parsed.clone(), Some(self.runtime()))
                .expect("nested snippet script failed to compile")
        })
    }
}

impl HasRuntime for Snippet {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Snippet {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        self.compiled().run(input.collect())
    }

    fn name(&self) -> &str {
        "snippet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::item::Item;
    use crate::node::iter_from_vec;

    #[test]
    fn inline_source_is_used_when_no_such_file_exists() {
        // No `INPUT FROM`: a bare stage chain consumes whatever stream it's
        // embedded in, exactly like any other segment.
        let snippet = Snippet::new(r#"| cast[cast_type="int"];"#.to_string()).unwrap();
        snippet.set_runtime(RuntimeContext::new());

        let out: Vec<i64> = snippet
            .transform(iter_from_vec(vec![Item::from("1"), Item::from("2")]))
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![1, 2]);
    }
}

//! Per-unit compile driver.
//!
//! Methods of a unit, and units of a batch, share no mutable state, so both
//! levels run on the rayon pool. Results are gathered in input order so the
//! reported error does not depend on scheduling.

use log::{debug, warn};
use rayon::prelude::*;

use crate::emit::{emit_method, EmitOutput};
use crate::error::CoreError;
use crate::ir::{CompilationUnit, Method};

use super::EmitConfig;

/// One emitted method body.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    pub name: String,
    pub output: EmitOutput,
}

fn compile_method(method: &Method, config: &EmitConfig) -> Result<CompiledMethod, CoreError> {
    let output = emit_method(method, config)?;
    debug!(
        "emitted `{}`: {} block(s), {} loop(s)",
        method.name, output.summary.blocks_visited, output.summary.loops_entered
    );
    Ok(CompiledMethod {
        name: method.name.clone(),
        output,
    })
}

/// Emit every method of `unit`. Fails with the first failing method in
/// declaration order.
pub fn compile_unit(
    unit: &CompilationUnit,
    config: &EmitConfig,
) -> Result<Vec<CompiledMethod>, CoreError> {
    let results: Vec<Result<CompiledMethod, CoreError>> = unit
        .methods
        .par_iter()
        .map(|m| compile_method(m, config))
        .collect();
    results.into_iter().collect()
}

/// Compile independent units; one result per unit, in input order.
pub fn compile_units(
    units: &[CompilationUnit],
    config: &EmitConfig,
) -> Vec<Result<Vec<CompiledMethod>, CoreError>> {
    units
        .par_iter()
        .map(|unit| {
            let result = compile_unit(unit, config);
            if let Err(e) = &result {
                warn!("unit `{}` failed: {e}", unit.name);
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, MethodKind};

    fn straight_method(name: &str) -> Method {
        let mut gb = GraphBuilder::new();
        gb.expr("barrier(CLK_LOCAL_MEM_FENCE)", &[]);
        gb.ret(None, &[]);
        Method {
            name: name.to_string(),
            kind: MethodKind::Kernel,
            params: Vec::new(),
            return_ty: "void".into(),
            graph: gb.build().unwrap(),
        }
    }

    fn broken_method(name: &str) -> Method {
        let mut method = straight_method(name);
        let entry = method.graph.entry;
        method.graph.blocks[entry].is_loop_header = true;
        method
    }

    #[test]
    fn compiles_methods_in_order() {
        let unit = CompilationUnit {
            name: "u".into(),
            methods: vec![straight_method("a"), straight_method("b")],
        };
        let out = compile_unit(&unit, &EmitConfig::default()).unwrap();
        let names: Vec<&str> = out.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(out[0].output.text, "barrier(CLK_LOCAL_MEM_FENCE);\nreturn;\n");
    }

    #[test]
    fn first_failure_in_declaration_order_is_reported() {
        let unit = CompilationUnit {
            name: "u".into(),
            methods: vec![
                straight_method("ok"),
                broken_method("first_bad"),
                broken_method("second_bad"),
            ],
        };
        let err = compile_unit(&unit, &EmitConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::InMethod { ref method, .. } if method == "first_bad"));
    }

    #[test]
    fn failing_unit_does_not_affect_siblings() {
        let good = CompilationUnit {
            name: "good".into(),
            methods: vec![straight_method("k")],
        };
        let bad = CompilationUnit {
            name: "bad".into(),
            methods: vec![broken_method("k")],
        };
        let results = compile_units(&[bad, good], &EmitConfig::default());
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use kernweave_core::error::CoreError;
use kernweave_core::ir::{CompilationUnit, Method, MethodKind};
use kernweave_core::pipeline::{compile_unit, CompiledMethod, EmitConfig};

use crate::prelude::PRELUDE_CL;

/// OpenCL C words that cannot name a kernel, parameter or local.
const RESERVED: &[&str] = &[
    "kernel", "__kernel", "global", "__global", "local", "__local", "constant", "__constant",
    "private", "__private", "int", "uint", "float", "double", "char", "uchar", "short",
    "ushort", "long", "ulong", "half", "bool", "void", "if", "else", "for", "while", "do",
    "switch", "case", "default", "break", "continue", "return", "goto", "struct", "union",
    "enum", "typedef", "const", "restrict", "volatile", "static", "extern", "sizeof",
];

/// Output file name for a unit.
pub fn file_name(unit: &str) -> String {
    format!("{}.cl", sanitize_ident(unit))
}

/// Emit a unit as OpenCL C source.
///
/// Helper functions come first so every kernel sees its callees declared.
pub fn emit_unit_to_string(unit: &CompilationUnit, config: &EmitConfig) -> Result<String, CoreError> {
    let unit = sanitize_unit(unit)?;
    let compiled = compile_unit(&unit, config)?;
    let pairs: Vec<(&Method, &CompiledMethod)> = unit.methods.iter().zip(&compiled).collect();

    let mut out = String::from(PRELUDE_CL);
    for kind in [MethodKind::Function, MethodKind::Kernel] {
        for (method, body) in pairs.iter().filter(|(m, _)| m.kind == kind) {
            out.push('\n');
            emit_method(method, body, config.indent_width, &mut out);
        }
    }
    Ok(out)
}

fn emit_method(method: &Method, body: &CompiledMethod, indent_width: usize, out: &mut String) {
    let pad = " ".repeat(indent_width);
    let _ = writeln!(out, "{} {{", signature(method));

    let param_names: HashSet<&str> = method.params.iter().map(|p| p.name.as_str()).collect();
    for var in method.graph.vars.values() {
        if !param_names.contains(var.name.as_str()) {
            let _ = writeln!(out, "{pad}{};", declaration(&var.ty, &var.name));
        }
    }

    for line in body.output.text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "{pad}{line}");
        }
    }
    out.push_str("}\n");
}

fn signature(method: &Method) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| declaration(&p.ty, &p.name))
        .collect();
    match method.kind {
        MethodKind::Kernel => format!("__kernel void {}({})", method.name, params.join(", ")),
        MethodKind::Function => format!(
            "{} {}({})",
            method.return_ty,
            method.name,
            params.join(", ")
        ),
    }
}

/// `int n`, or `__global float *x` for pointer types.
fn declaration(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{ty}{name}")
    } else {
        format!("{ty} {name}")
    }
}

/// Copy of `unit` whose method, parameter and local names are valid OpenCL
/// identifiers. Statement text is rewritten to use the new names.
fn sanitize_unit(unit: &CompilationUnit) -> Result<CompilationUnit, CoreError> {
    let mut unit = unit.clone();
    let method_renames = renames(unit.methods.iter().map(|m| m.name.as_str()))?;
    for method in &mut unit.methods {
        let locals = method
            .params
            .iter()
            .map(|p| p.name.as_str())
            .chain(method.graph.vars.values().map(|v| v.name.as_str()));
        let mut table = renames(locals)?;
        table.extend(method_renames.iter().cloned());
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        method.name = sanitize_ident(&method.name);
        for param in &mut method.params {
            param.name = sanitize_ident(&param.name);
        }
        for (_, var) in method.graph.vars.iter_mut() {
            var.name = sanitize_ident(&var.name);
        }
        if table.is_empty() {
            continue;
        }
        for (_, block) in method.graph.blocks.iter_mut() {
            for inst in &mut block.insts {
                if let Some(text) = inst.stmt.text_mut() {
                    *text = rewrite_names(text, &table);
                }
            }
        }
    }
    Ok(unit)
}

/// `(original, sanitized)` for every name that changes.
///
/// Two different names that sanitize to the same identifier are an error.
fn renames<'n>(
    names: impl IntoIterator<Item = &'n str>,
) -> Result<Vec<(String, String)>, CoreError> {
    let mut taken: HashMap<String, &str> = HashMap::new();
    let mut out = Vec::new();
    for name in names {
        let clean = sanitize_ident(name);
        if let Some(&other) = taken.get(&clean) {
            if other == name {
                continue;
            }
            let original = if clean == name { other } else { name };
            return Err(CoreError::NameCollision {
                original: original.to_string(),
                renamed: clean,
            });
        }
        if clean != name {
            out.push((name.to_string(), clean.clone()));
        }
        taken.insert(clean, name);
    }
    Ok(out)
}

/// Replace whole-identifier occurrences of each original name. Member
/// accesses (`.name`, `->name`) are left alone. `table` is tried in order,
/// so longer names must come first.
fn rewrite_names(text: &str, table: &[(String, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(ch) = rest.chars().next() {
        let at_start = !out.chars().next_back().is_some_and(unicode_ident::is_xid_continue)
            && !out.ends_with('.')
            && !out.ends_with("->");
        if at_start {
            for (old, new) in table {
                let Some(after) = rest.strip_prefix(old.as_str()) else {
                    continue;
                };
                if !after.chars().next().is_some_and(unicode_ident::is_xid_continue) {
                    out.push_str(new);
                    rest = after;
                    continue 'scan;
                }
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Sanitize a name into a valid identifier.
///
/// Characters that cannot continue an identifier become `_`; a name that
/// cannot start one, or that collides with a reserved word, gets an extra `_`.
pub fn sanitize_ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|ch| {
            if unicode_ident::is_xid_continue(ch) {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let first = out.chars().next();
    match first {
        None => return "_".to_string(),
        Some(first) if first != '_' && !unicode_ident::is_xid_start(first) => out.insert(0, '_'),
        _ => {}
    }
    if RESERVED.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernweave_core::ir::{GraphBuilder, Param};

    fn method(name: &str, kind: MethodKind, build: impl FnOnce(&mut GraphBuilder)) -> Method {
        let mut gb = GraphBuilder::new();
        build(&mut gb);
        Method {
            name: name.into(),
            kind,
            params: Vec::new(),
            return_ty: "void".into(),
            graph: gb.build().unwrap(),
        }
    }

    #[test]
    fn sanitize_ident_rewrites_invalid_names() {
        assert_eq!(sanitize_ident("Vector.add"), "Vector_add");
        assert_eq!(sanitize_ident("mat::mul$1"), "mat__mul_1");
        assert_eq!(sanitize_ident("3d"), "_3d");
        assert_eq!(sanitize_ident(""), "_");
        assert_eq!(sanitize_ident("kernel"), "kernel_");
        assert_eq!(sanitize_ident("größe"), "größe");
        assert_eq!(sanitize_ident("_tmp"), "_tmp");
    }

    #[test]
    fn pointer_params_hug_the_star() {
        assert_eq!(declaration("__global float *", "x"), "__global float *x");
        assert_eq!(declaration("int", "n"), "int n");
    }

    #[test]
    fn kernel_body_declares_locals_first() {
        let mut m = method("scale", MethodKind::Kernel, |gb| {
            let i = gb.var("i", "int");
            gb.assign(i, "get_global_id(0)", &[]);
            gb.expr("x[i] *= a", &[i]);
            gb.ret(None, &[]);
        });
        m.params = vec![
            Param {
                name: "a".into(),
                ty: "float".into(),
            },
            Param {
                name: "x".into(),
                ty: "__global float *".into(),
            },
        ];
        let unit = CompilationUnit {
            name: "scale".into(),
            methods: vec![m],
        };
        let out = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap();
        assert_eq!(
            out,
            "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n\
             \n\
             __kernel void scale(float a, __global float *x) {\n\
             \x20 int i;\n\
             \x20 i = get_global_id(0);\n\
             \x20 x[i] *= a;\n\
             \x20 return;\n\
             }\n"
        );
    }

    #[test]
    fn functions_are_emitted_before_kernels() {
        let kernel = method("main_kernel", MethodKind::Kernel, |gb| {
            gb.expr("helper()", &[]);
            gb.ret(None, &[]);
        });
        let mut helper = method("helper", MethodKind::Function, |gb| {
            gb.ret(Some("1.0f"), &[]);
        });
        helper.return_ty = "float".into();
        let unit = CompilationUnit {
            name: "u".into(),
            methods: vec![kernel, helper],
        };
        let out = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap();
        let helper_at = out.find("float helper() {").unwrap();
        let kernel_at = out.find("__kernel void main_kernel() {").unwrap();
        assert!(helper_at < kernel_at);
    }

    #[test]
    fn nested_scopes_are_indented_under_the_signature() {
        let m = method("k", MethodKind::Kernel, |gb| {
            let then_b = gb.create_block();
            let merge = gb.create_block();
            gb.branch("flag", &[], then_b, merge);
            gb.switch_to_block(then_b);
            gb.expr("work()", &[]);
            gb.jump(merge);
            gb.switch_to_block(merge);
            gb.ret(None, &[]);
        });
        let unit = CompilationUnit {
            name: "k".into(),
            methods: vec![m],
        };
        let config = EmitConfig {
            indent_width: 4,
            ..EmitConfig::default()
        };
        let out = emit_unit_to_string(&unit, &config).unwrap();
        assert!(out.contains("    if (flag) {\n        work();\n    }\n    return;\n}\n"));
    }

    #[test]
    fn sanitized_names_reach_declarations_and_statements() {
        let m = method("Foo.bar", MethodKind::Kernel, |gb| {
            let v = gb.var("tmp$0", "int");
            gb.assign(v, "1", &[]);
            gb.ret(None, &[]);
        });
        let unit = CompilationUnit {
            name: "Foo.bar".into(),
            methods: vec![m],
        };
        let out = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap();
        assert!(out.contains("__kernel void Foo_bar() {"));
        assert!(out.contains("  int tmp_0;\n  tmp_0 = 1;\n"));
        assert_eq!(file_name(&unit.name), "Foo_bar.cl");
    }

    #[test]
    fn renamed_locals_are_rewritten_inside_statements() {
        let m = method("k", MethodKind::Kernel, |gb| {
            let half = gb.var("half", "int");
            gb.assign(half, "1", &[]);
            gb.expr("out[0] = half + 1", &[half]);
            gb.expr("halfway(s.half, half)", &[half]);
            gb.ret(None, &[]);
        });
        let unit = CompilationUnit {
            name: "k".into(),
            methods: vec![m],
        };
        let out = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap();
        assert!(out.contains(
            "  int half_;\n  half_ = 1;\n  out[0] = half_ + 1;\n  halfway(s.half, half_);\n"
        ));
    }

    #[test]
    fn renamed_methods_are_rewritten_at_call_sites() {
        let kernel = method("main", MethodKind::Kernel, |gb| {
            gb.expr("out[0] = util.sq(2.0f)", &[]);
            gb.ret(None, &[]);
        });
        let mut helper = method("util.sq", MethodKind::Function, |gb| {
            gb.ret(Some("4.0f"), &[]);
        });
        helper.return_ty = "float".into();
        let unit = CompilationUnit {
            name: "u".into(),
            methods: vec![kernel, helper],
        };
        let out = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap();
        assert!(out.contains("float util_sq() {"));
        assert!(out.contains("  out[0] = util_sq(2.0f);\n"));
    }

    #[test]
    fn names_colliding_after_sanitizing_are_rejected() {
        let m = method("k", MethodKind::Kernel, |gb| {
            let dotted = gb.var("a.b", "int");
            let plain = gb.var("a_b", "int");
            gb.assign(dotted, "1", &[]);
            gb.assign(plain, "2", &[]);
            gb.ret(None, &[]);
        });
        let unit = CompilationUnit {
            name: "k".into(),
            methods: vec![m],
        };
        let err = emit_unit_to_string(&unit, &EmitConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NameCollision { original, renamed }
                if original == "a.b" && renamed == "a_b"
        ));
    }

    #[test]
    fn rewrite_only_touches_whole_identifiers() {
        let table = vec![("n".to_string(), "n_".to_string())];
        assert_eq!(rewrite_names("n + nn + a_n + p->n", &table), "n_ + nn + a_n + p->n");
    }
}

use std::fs;

use kernweave_backend_opencl::OpenClBackend;
use kernweave_core::ir::UnitSource;
use kernweave_core::pipeline::{Backend, BackendInput, EmitConfig};
use kernweave_core::CoreError;

const SAXPY: &str = r#"{
    "name": "saxpy",
    "methods": [{
        "name": "saxpy",
        "params": [
            {"name": "a", "ty": "float"},
            {"name": "x", "ty": "__global float *"},
            {"name": "n", "ty": "int"}
        ],
        "vars": [{"name": "i", "ty": "int"}],
        "blocks": [
            {"end": {"kind": "jump", "target": 1}},
            {"insts": [
                {"stmt": {"op": "loop_init", "init": "i = 0"}},
                {"stmt": {"op": "loop_post", "update": "i++"}},
                {"stmt": {"op": "loop_condition", "cond": "i < n"}, "reads": [0]}
             ],
             "end": {"kind": "branch", "on_true": 3, "on_false": 2}},
            {"insts": [{"stmt": {"op": "expr", "expr": "x[i] *= a"}, "reads": [0]}],
             "end": {"kind": "jump", "target": 1}},
            {"insts": [{"stmt": {"op": "return"}}], "end": {"kind": "return"}}
        ]
    }]
}"#;

// The header is flagged as a loop but nothing branches back to it.
const BROKEN: &str = r#"{
    "name": "broken",
    "methods": [{
        "name": "k",
        "blocks": [
            {"insts": [
                {"stmt": {"op": "loop_post", "update": "i++"}},
                {"stmt": {"op": "loop_condition", "cond": "i < n"}}
             ],
             "end": {"kind": "branch", "on_true": 1, "on_false": 2}},
            {"insts": [{"stmt": {"op": "return"}}], "end": {"kind": "return"}},
            {"insts": [{"stmt": {"op": "return"}}], "end": {"kind": "return"}}
        ]
    }]
}"#;

fn unit(text: &str) -> kernweave_core::ir::CompilationUnit {
    UnitSource::from_json(text).unwrap().into_unit().unwrap()
}

#[test]
fn writes_one_file_per_unit() {
    let dir = tempfile::tempdir().unwrap();
    let report = OpenClBackend
        .emit(BackendInput {
            units: vec![unit(SAXPY)],
            output_dir: dir.path().to_path_buf(),
            config: EmitConfig::default(),
        })
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.written, vec![dir.path().join("saxpy.cl")]);
    let text = fs::read_to_string(dir.path().join("saxpy.cl")).unwrap();
    assert_eq!(
        text,
        "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n\
         \n\
         __kernel void saxpy(float a, __global float *x, int n) {\n\
         \x20 int i;\n\
         \x20 for (i = 0; i < n; i++) {\n\
         \x20   x[i] *= a;\n\
         \x20 }\n\
         \x20 return;\n\
         }\n"
    );
}

#[test]
fn unwrapped_loop_keeps_body_inline() {
    let dir = tempfile::tempdir().unwrap();
    let config = EmitConfig {
        unwrap_outermost_loop: true,
        ..EmitConfig::default()
    };
    OpenClBackend
        .emit(BackendInput {
            units: vec![unit(SAXPY)],
            output_dir: dir.path().to_path_buf(),
            config,
        })
        .unwrap();
    let text = fs::read_to_string(dir.path().join("saxpy.cl")).unwrap();
    assert!(!text.contains("for ("));
    assert!(text.contains("  x[i] *= a;\n  return;\n"));
}

#[test]
fn failing_unit_is_reported_and_siblings_are_written() {
    let mut broken = UnitSource::from_json(BROKEN).unwrap().into_unit().unwrap();
    let entry = broken.methods[0].graph.entry;
    broken.methods[0].graph.blocks[entry].is_loop_header = true;

    let dir = tempfile::tempdir().unwrap();
    let report = OpenClBackend
        .emit(BackendInput {
            units: vec![broken, unit(SAXPY)],
            output_dir: dir.path().to_path_buf(),
            config: EmitConfig::default(),
        })
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit, "broken");
    assert!(matches!(
        report.failures[0].error.root(),
        CoreError::Structural { .. }
    ));
    assert!(!dir.path().join("broken.cl").exists());
    assert!(dir.path().join("saxpy.cl").exists());
}

#[test]
fn creates_missing_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("out").join("cl");
    let report = OpenClBackend
        .emit(BackendInput {
            units: vec![unit(SAXPY)],
            output_dir: nested.clone(),
            config: EmitConfig::default(),
        })
        .unwrap();
    assert_eq!(report.written, vec![nested.join("saxpy.cl")]);
}

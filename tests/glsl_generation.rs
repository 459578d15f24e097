use std::path::PathBuf;

use shader_forge::compiler::validation::{GlslShaderStage, validate_glsl_with_context};
use shader_forge::{GlslProfile, compile_fragment_bundle, load_graph_from_path};

fn case_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
        .join("glsl_generation")
}

fn list_json_cases(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut cases = Vec::new();
    let Ok(rd) = std::fs::read_dir(dir) else {
        return cases;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            cases.push(path);
        }
    }
    cases.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    cases
}

fn case_stem(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("case")
        .to_string()
}

#[test]
fn graph_documents_compile_to_valid_glsl_modules() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = case_dir();
    let update_goldens = std::env::var("UPDATE_GOLDENS").is_ok_and(|v| v != "0");

    let json_cases = list_json_cases(&dir);
    assert!(
        !json_cases.is_empty(),
        "expected at least one *.json case in {}",
        dir.display()
    );

    for input_path in json_cases {
        let case_name = case_stem(&input_path);
        let doc = load_graph_from_path(&input_path)
            .unwrap_or_else(|e| panic!("case {case_name}: load graph json failed: {e:#}"));

        let bundle = compile_fragment_bundle(&doc, GlslProfile::desktop())
            .unwrap_or_else(|e| panic!("case {case_name}: compile failed: {e:#}"));

        validate_glsl_with_context(
            &bundle.fragment,
            GlslShaderStage::Fragment,
            &format!("case {case_name} fragment"),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));
        validate_glsl_with_context(
            &bundle.vertex,
            GlslShaderStage::Vertex,
            &format!("case {case_name} vertex"),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        // Golden comparisons run only for cases with committed goldens; some
        // JSONs are kept around as drafts / future fixtures.
        for (suffix, text) in [("frag.glsl", &bundle.fragment), ("vert.glsl", &bundle.vertex)] {
            let golden_path = dir.join(format!("{case_name}.{suffix}"));
            if update_goldens {
                std::fs::write(&golden_path, text)
                    .unwrap_or_else(|e| panic!("case {case_name}: write golden failed: {e}"));
                continue;
            }
            if golden_path.exists() {
                let expected = std::fs::read_to_string(&golden_path)
                    .unwrap_or_else(|e| panic!("case {case_name}: read golden failed: {e}"));
                assert_eq!(
                    text, &expected,
                    "case {case_name}: {suffix} mismatch (set UPDATE_GOLDENS=1 to refresh)"
                );
            }
        }
    }
}

#[test]
fn compiling_twice_yields_identical_bundles() {
    let doc = load_graph_from_path(case_dir().join("srgb_tonemap.json")).unwrap();
    let first = compile_fragment_bundle(&doc, GlslProfile::desktop()).unwrap();
    let second = compile_fragment_bundle(&doc, GlslProfile::desktop()).unwrap();
    assert_eq!(first.fragment, second.fragment);
    assert_eq!(first.vertex, second.vertex);
    assert_eq!(first.pseudo, second.pseudo);
}

#[test]
fn sampler_bindings_follow_first_use_order() {
    let doc = load_graph_from_path(case_dir().join("textured_mix.json")).unwrap();
    let bundle = compile_fragment_bundle(&doc, GlslProfile::desktop()).unwrap();
    assert_eq!(bundle.samplers, vec!["albedo_tex", "detail_tex"]);
    assert!(bundle.fragment.contains("uniform sampler2D albedo_tex;"));
}

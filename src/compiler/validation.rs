//! GLSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone, Copy)]
pub enum GlslShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Validate GLSL source with naga's GLSL frontend and validator.
///
/// # Arguments
/// * `source` - The GLSL source code to validate
/// * `stage` - The shader stage the module is compiled as
///
/// # Returns
/// The parsed naga Module on success, or an error with a numbered source
/// listing on failure.
pub fn validate_glsl(source: &str, stage: GlslShaderStage) -> Result<naga::Module> {
    let shader_stage = match stage {
        GlslShaderStage::Vertex => naga::ShaderStage::Vertex,
        GlslShaderStage::Fragment => naga::ShaderStage::Fragment,
        GlslShaderStage::Compute => naga::ShaderStage::Compute,
    };

    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: shader_stage,
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL validation failed:\n{}", format_glsl_error(source, &e)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed:\n{}", format_glsl_error(source, &e)))?;

    Ok(module)
}

/// Validate GLSL and provide context about which graph/stage generated it.
pub fn validate_glsl_with_context(
    source: &str,
    stage: GlslShaderStage,
    context: &str,
) -> Result<naga::Module> {
    validate_glsl(source, stage).with_context(|| format!("{context} generated invalid GLSL"))
}

/// Format a naga error with a numbered source listing for easier debugging.
fn format_glsl_error<E: std::fmt::Debug>(source: &str, error: &E) -> String {
    let mut output = String::new();

    output.push_str(&format!("  {error:?}\n"));

    output.push_str("\nGenerated GLSL:\n");
    output.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");

    output
}

//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Parse and validate WGSL source.
///
/// Returns the naga module on success, or an error carrying the full
/// line-numbered source on failure so codegen bugs are debuggable from the
/// message alone.
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse failed:\n{}", format_naga_error(source, &e)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("WGSL validation failed: {e:?}\n{}", numbered_source(source)))?;

    Ok(module)
}

/// Validate WGSL and name what generated it (e.g. "color style").
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{context} generated invalid WGSL"))
}

fn numbered_source(source: &str) -> String {
    let mut out = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        out.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    out.push_str("---\n");
    out
}

fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = String::new();
    output.push_str(&format!("  {error}\n"));
    output.push_str("\nGenerated WGSL:\n");
    output.push_str(&numbered_source(source));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_wgsl() {
        let source = r#"
@fragment
fn fs_main() -> @location(0) vec4f {
    return vec4f(1.0, 0.0, 0.0, 1.0);
}
"#;
        assert!(validate_wgsl(source).is_ok());
    }

    #[test]
    fn rejects_syntax_errors() {
        assert!(validate_wgsl("fn broken() -> { }").is_err());
    }

    #[test]
    fn rejects_type_errors() {
        let source = r#"
@fragment
fn fs_main() -> @location(0) vec4f {
    let x: vec4f = 1.0;
    return x;
}
"#;
        assert!(validate_wgsl(source).is_err());
    }

    #[test]
    fn context_names_the_producer() {
        let result = validate_wgsl_with_context("not wgsl", "width style");
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("width style"));
    }
}

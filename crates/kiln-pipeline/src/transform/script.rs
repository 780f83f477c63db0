//! JavaScript steps built on oxc.

use std::path::PathBuf;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::{Parser, ParserReturn};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};

use super::{Asset, TransformContext, TransformError, TransformStep};

fn source_type(asset: &Asset) -> SourceType {
    SourceType::from_path(&asset.path).unwrap_or_else(|_| SourceType::mjs())
}

/// Parse `source`, failing on the first syntax error.
fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    source_type: SourceType,
) -> Result<ParserReturn<'a>, TransformError> {
    let ret = Parser::new(allocator, source, source_type).parse();

    if let Some(error) = ret.errors.first() {
        return Err(TransformError::syntax(error.to_string(), None));
    }
    if ret.panicked {
        return Err(TransformError::syntax("Unrecoverable parse error", None));
    }

    Ok(ret)
}

/// Syntax check; contents pass through unchanged.
#[derive(Debug, Default)]
pub struct ParseScript;

impl TransformStep for ParseScript {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn apply(&self, asset: Asset, _ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let allocator = Allocator::default();
        parse(&allocator, asset.text()?, source_type(&asset))?;
        Ok(asset)
    }
}

/// Lower syntax newer than an ECMAScript target (`es2015`, `es2020`, ...).
#[derive(Debug, Clone)]
pub struct Transpile {
    target: String,
}

impl Transpile {
    /// Fails when oxc does not know the target.
    pub fn new(target: impl Into<String>) -> Result<Self, String> {
        let target = target.into();
        TransformOptions::from_target(&target)?;
        Ok(Self { target })
    }
}

impl TransformStep for Transpile {
    fn name(&self) -> &'static str {
        "transpile"
    }

    fn apply(&self, asset: Asset, ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let options = TransformOptions::from_target(&self.target).map_err(TransformError::Failed)?;

        let code = {
            let allocator = Allocator::default();
            let mut ret = parse(&allocator, asset.text()?, source_type(&asset))?;

            let scoping = SemanticBuilder::new()
                .build(&ret.program)
                .semantic
                .into_scoping();
            let transformed = Transformer::new(&allocator, ctx.source, &options)
                .build_with_scoping(scoping, &mut ret.program);

            if let Some(error) = transformed.errors.first() {
                return Err(TransformError::Failed(error.to_string()));
            }

            Codegen::new().build(&ret.program).code
        };

        Ok(asset.with_text(code))
    }
}

/// Compress, mangle local names and print without whitespace, with a source map.
#[derive(Debug, Default)]
pub struct MinifyScript;

impl TransformStep for MinifyScript {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn apply(&self, asset: Asset, ctx: &TransformContext<'_>) -> Result<Asset, TransformError> {
        let (code, map) = {
            let allocator = Allocator::default();
            let mut ret = parse(&allocator, asset.text()?, source_type(&asset))?;

            let minified = Minifier::new(MinifierOptions {
                mangle: Some(MangleOptions::default()),
                compress: Some(CompressOptions::default()),
            })
            .build(&allocator, &mut ret.program);

            let source_name = ctx
                .source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| asset.path.clone());

            let printed = Codegen::new()
                .with_options(CodegenOptions {
                    source_map_path: Some(source_name),
                    ..CodegenOptions::minify()
                })
                .with_scoping(minified.scoping)
                .build(&ret.program);

            let map = printed
                .map
                .map(|map| map.to_json_string())
                .ok_or_else(|| TransformError::Failed("no source map produced".to_string()))?;
            (printed.code, map)
        };

        Ok(asset.with_mapped_text(code, map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx() -> TransformContext<'static> {
        TransformContext {
            root: Path::new("/project"),
            source: Path::new("/project/src/js/app.js"),
        }
    }

    #[test]
    fn accepts_valid_scripts() {
        let asset = Asset::new("app.js", "const add = (a, b) => a + b;\n");

        let out = ParseScript.apply(asset.clone(), &ctx()).unwrap();

        assert_eq!(out, asset);
    }

    #[test]
    fn rejects_syntax_errors() {
        let asset = Asset::new("app.js", "function (\n");

        let err = ParseScript.apply(asset, &ctx()).unwrap_err();

        assert!(matches!(err, TransformError::Syntax { .. }));
    }

    #[test]
    fn minifies_and_mangles_scripts() {
        let source = "// greet\nexport function greet(longParameterName) {\n    \
                      return 'hi ' + longParameterName;\n}\n";
        let asset = Asset::new("app.min.js", source);

        let out = MinifyScript.apply(asset, &ctx()).unwrap();
        let code = out.text().unwrap();

        assert!(code.contains("greet"));
        assert!(!code.contains("longParameterName"));
        assert!(!code.contains("// greet"));
        assert!(code.len() < source.len());
    }

    #[test]
    fn maps_minified_output_to_its_input() {
        let asset = Asset::new("app.min.js", "export const answer = 40 + 2;\n");

        let out = MinifyScript.apply(asset, &ctx()).unwrap();

        let map = out.source_map.as_deref().unwrap();
        assert!(map.contains("\"mappings\""));
        assert!(map.contains("app.js"));
    }

    #[test]
    fn transpiles_to_target() {
        let asset = Asset::new("app.js", "export const x = (a) => a?.value ?? 1;\n");

        let out = Transpile::new("es2015").unwrap().apply(asset, &ctx()).unwrap();
        let code = out.text().unwrap();

        assert!(!code.contains("?."));
        assert!(!code.contains("??"));
    }

    #[test]
    fn rejects_unknown_targets() {
        assert!(Transpile::new("es1999").is_err());
    }
}

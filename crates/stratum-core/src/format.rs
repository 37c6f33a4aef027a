//! Blueprint spec file helpers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StagingError};

/// Serialisation format of a blueprint spec file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecFormat {
    Yaml,
    Json,
}

/// Derives the spec format from a file path's extension.
///
/// This only looks at the extension, content that does not match the format
/// fails later when the spec is parsed.
pub fn derive_spec_format(spec_file_path: &str) -> Result<SpecFormat> {
    if spec_file_path.ends_with(".yml") || spec_file_path.ends_with(".yaml") {
        return Ok(SpecFormat::Yaml);
    }

    if spec_file_path.ends_with(".json") {
        return Ok(SpecFormat::Json);
    }

    Err(StagingError::UnsupportedSpecExtension {
        path: spec_file_path.to_string(),
    })
}

/// Validates the path of a child blueprint include.
pub fn child_blueprint_path<'a>(child_name: &str, path: Option<&'a str>) -> Result<&'a str> {
    match path.map(str::trim) {
        Some(path) if !path.is_empty() => Ok(path),
        _ => Err(StagingError::MissingChildPath {
            child_name: child_name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_spec_format() {
        assert_eq!(derive_spec_format("blueprints/app.yml").unwrap(), SpecFormat::Yaml);
        assert_eq!(derive_spec_format("blueprints/app.yaml").unwrap(), SpecFormat::Yaml);
        assert_eq!(derive_spec_format("blueprints/app.json").unwrap(), SpecFormat::Json);
        assert_eq!(
            derive_spec_format("blueprints/app.toml"),
            Err(StagingError::UnsupportedSpecExtension {
                path: "blueprints/app.toml".to_string()
            })
        );
    }

    #[test]
    fn test_child_blueprint_path() {
        assert_eq!(child_blueprint_path("coreInfra", Some("core.yml")).unwrap(), "core.yml");
        assert!(matches!(
            child_blueprint_path("coreInfra", Some("  ")),
            Err(StagingError::MissingChildPath { child_name }) if child_name == "coreInfra"
        ));
        assert!(child_blueprint_path("networking", None).is_err());
    }
}

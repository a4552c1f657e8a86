//! Resources document
//!
//! ```toml
//! [engine]
//! event_buffer = 16
//!
//! [[sysctl]]
//! name = "net.ipv4.ip_forward"
//! value = "1"
//! persistent = false
//! ```
//!
//! Every top-level array of tables is a resource kind; `[engine]` holds
//! engine options. Each definition needs a `name`; the remaining fields go
//! to the kind's decoder.

use anyhow::{Context, Result, bail};
use declarative::{EngineOptions, ExecutionPlan, Registry};
use std::fs;
use std::path::{Path, PathBuf};

const ENGINE_TABLE: &str = "engine";

/// A decoded resources document
#[derive(Debug)]
pub struct Document {
    pub path: PathBuf,
    pub engine: EngineOptions,
    pub plan: ExecutionPlan,
}

impl Document {
    /// Load and decode a document from disk
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let (engine, plan) = parse(&content, registry)
            .with_context(|| format!("Invalid resources document {}", path.display()))?;

        log::debug!(
            "Loaded {} resource(s) from {}",
            plan.total_resources(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            engine,
            plan,
        })
    }
}

/// Decode a document into engine options and a plan
pub fn parse(content: &str, registry: &Registry) -> Result<(EngineOptions, ExecutionPlan)> {
    let document: toml::Table = toml::from_str(content).context("Invalid TOML")?;

    let mut engine = EngineOptions::default();
    let mut plan = ExecutionPlan::new();

    for (key, value) in document {
        if key == ENGINE_TABLE {
            engine = value
                .try_into()
                .context("Invalid [engine] table")?;
            continue;
        }

        if !registry.contains(&key) {
            return Err(declarative::Error::UnknownKind(key).into());
        }

        let toml::Value::Array(definitions) = value else {
            bail!("'{key}' must be an array of tables ([[{key}]])");
        };

        for (index, definition) in definitions.into_iter().enumerate() {
            let toml::Value::Table(mut fields) = definition else {
                bail!("{key} definition #{} is not a table", index + 1);
            };

            let name = match fields.remove("name") {
                Some(toml::Value::String(name)) if !name.is_empty() => name,
                Some(_) => bail!("{key} definition #{}: name must be a string", index + 1),
                None => bail!("{key} definition #{} has no name", index + 1),
            };

            let resource = registry.decode(&key, &name, fields)?;
            plan.add_resource(resource)?;
        }
    }

    Ok((engine, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::registry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_document() {
        let (engine, plan) = parse(
            r#"
            [engine]
            debug = true

            [[sysctl]]
            name = "net.ipv4.ip_forward"
            value = "1"

            [[sysctl]]
            name = "swappiness"
            parameter = "vm.swappiness"
            value = "10"
            persistent = false
            "#,
            registry(),
        )
        .unwrap();

        assert!(engine.debug);
        assert_eq!(engine.event_buffer, 16);
        assert_eq!(plan.total_resources(), 2);
        assert_eq!(plan.resources()[1].description(), "Set vm.swappiness = 10");
    }

    #[test]
    fn test_empty_document() {
        let (engine, plan) = parse("", registry()).unwrap();
        assert_eq!(engine, EngineOptions::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_kind() {
        let err = parse("[[file]]\nname = \"/etc/motd\"\n", registry()).unwrap_err();
        let err = err.downcast::<declarative::Error>().unwrap();
        assert!(matches!(err, declarative::Error::UnknownKind(k) if k == "file"));
    }

    #[test]
    fn test_missing_name() {
        let err = parse("[[sysctl]]\nvalue = \"1\"\n", registry()).unwrap_err();
        assert!(err.to_string().contains("has no name"));
    }

    #[test]
    fn test_duplicate_definitions() {
        let err = parse(
            "[[sysctl]]\nname = \"vm.swappiness\"\nvalue = \"1\"\n\
             [[sysctl]]\nname = \"vm.swappiness\"\nvalue = \"2\"\n",
            registry(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate resource"));
    }

    #[test]
    fn test_kind_must_be_array() {
        let err = parse("[sysctl]\nname = \"x\"\n", registry()).unwrap_err();
        assert!(err.to_string().contains("array of tables"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[sysctl]]\nname = \"vm.swappiness\"\nvalue = \"10\"").unwrap();

        let doc = Document::load(file.path(), registry()).unwrap();
        assert_eq!(doc.path, file.path());
        assert_eq!(doc.plan.total_resources(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Document::load(Path::new("/nonexistent/steward.toml"), registry()).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }
}

//! Purpose: Turn short or qualified type tokens into constructible node types.
//! Exports: `TypeResolver`, `TypeUniverse`, `TypeUnit`, `ConstructibleType`, `NamingConvention`.
//! Role: Backs node creation; isolates unit loading behind an injected universe.
//! Invariants: Lookups short-circuit: loaded units, on-disk plugin unit, legacy registry.
//! Invariants: Exhausting every layer is a reported error, never a panic.
//! Notes: No resolution cache; each request re-resolves (creation is rare).

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::NodeRef;

/// A type that can produce fresh node instances.
#[derive(Clone)]
pub struct ConstructibleType {
    qualified_name: String,
    construct: Rc<dyn Fn() -> NodeRef>,
}

impl ConstructibleType {
    pub fn new(
        qualified_name: impl Into<String>,
        construct: impl Fn() -> NodeRef + 'static,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            construct: Rc::new(construct),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Last dot-separated segment of the qualified name.
    pub fn short_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    pub fn construct(&self) -> NodeRef {
        (self.construct)()
    }
}

impl fmt::Debug for ConstructibleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructibleType")
            .field("qualified_name", &self.qualified_name)
            .finish_non_exhaustive()
    }
}

/// A loaded unit of types (one plugin file's worth).
pub trait TypeUnit {
    fn name(&self) -> &str;

    /// Dynamic units are generated at runtime and never scanned.
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Exact, case-insensitive lookup by qualified name.
    fn find_type(&self, qualified_name: &str) -> Option<ConstructibleType>;
}

/// Process-wide source of type units.
pub trait TypeUniverse {
    fn loaded_units(&self) -> Vec<Rc<dyn TypeUnit>>;

    /// Loads the unit stored at `path`, making it part of `loaded_units`.
    fn load_unit(&self, path: &Path) -> Result<Rc<dyn TypeUnit>, Error>;

    /// Legacy global lookup by partial unit name.
    fn load_by_partial_name(&self, partial_name: &str) -> Option<Rc<dyn TypeUnit>>;
}

/// Short-name inference: `<vendor>.<product>.<module>.<ShortName>`.
#[derive(Clone, Debug)]
pub struct NamingConvention {
    pub vendor: String,
    pub product: String,
    pub prefix_len: usize,
    pub suffix: String,
    pub unit_extension: String,
    /// Short names whose module segment does not follow the convention.
    pub module_overrides: Vec<(String, String)>,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            vendor: "Cognex".to_string(),
            product: "VisionPro".to_string(),
            prefix_len: 3,
            suffix: "Tool".to_string(),
            unit_extension: "dll".to_string(),
            module_overrides: vec![("CogFixtureTool".to_string(), "CalibFix".to_string())],
        }
    }
}

impl NamingConvention {
    pub fn with_namespace(mut self, vendor: impl Into<String>, product: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.product = product.into();
        self
    }

    /// Qualified names pass through; short names get a derived namespace.
    pub fn qualify(&self, identifier: &str) -> String {
        if identifier.contains('.') {
            return identifier.to_string();
        }
        let module = self.module_for(identifier);
        format!("{}.{}.{}.{}", self.vendor, self.product, module, identifier)
    }

    fn module_for(&self, short_name: &str) -> String {
        if let Some((_, module)) = self
            .module_overrides
            .iter()
            .find(|(name, _)| name == short_name)
        {
            return module.clone();
        }
        let stripped = short_name.get(self.prefix_len..).unwrap_or("");
        stripped.replace(self.suffix.as_str(), "")
    }

    /// Partial unit name: the first three segments of a qualified name.
    pub fn unit_name(&self, qualified_name: &str) -> Option<String> {
        let parts: Vec<&str> = qualified_name.split('.').collect();
        if parts.len() < 3 {
            return None;
        }
        Some(format!("{}.{}.{}", parts[0], parts[1], parts[2]))
    }

    pub fn unit_file_name(&self, qualified_name: &str) -> Option<String> {
        self.unit_name(qualified_name)
            .map(|unit| format!("{unit}.{}", self.unit_extension))
    }
}

pub struct TypeResolver {
    universe: Rc<dyn TypeUniverse>,
    convention: NamingConvention,
    base_dir: PathBuf,
}

impl TypeResolver {
    pub fn new(universe: Rc<dyn TypeUniverse>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            universe,
            convention: NamingConvention::default(),
            base_dir: base_dir.into(),
        }
    }

    pub fn with_convention(mut self, convention: NamingConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn convention(&self) -> &NamingConvention {
        &self.convention
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, identifier: &str) -> Result<ConstructibleType, Error> {
        let qualified = self.convention.qualify(identifier.trim());
        debug!(identifier, qualified = %qualified, "resolving type");

        if let Some(found) = self.find_loaded(&qualified) {
            return Ok(found);
        }
        if let Some(found) = self.find_in_plugin_file(&qualified) {
            return Ok(found);
        }
        if let Some(found) = self.find_in_legacy_registry(&qualified) {
            return Ok(found);
        }

        error!(qualified = %qualified, "type could not be resolved by any lookup layer");
        Err(Error::new(ErrorKind::TypeResolution).with_message(format!(
            "Could not resolve type '{identifier}' (tried '{qualified}')."
        )))
    }

    fn find_loaded(&self, qualified: &str) -> Option<ConstructibleType> {
        self.universe
            .loaded_units()
            .iter()
            .filter(|unit| !unit.is_dynamic())
            .find_map(|unit| unit.find_type(qualified))
    }

    fn find_in_plugin_file(&self, qualified: &str) -> Option<ConstructibleType> {
        let file_name = self.convention.unit_file_name(qualified)?;
        let path = self.base_dir.join(&file_name);
        if !path.exists() {
            warn!(
                file = %file_name,
                dir = %self.base_dir.display(),
                "plugin unit not found on disk"
            );
            return None;
        }
        match self.universe.load_unit(&path) {
            Ok(unit) => unit.find_type(qualified),
            Err(err) => {
                error!(
                    file = %file_name,
                    error = %err,
                    "plugin unit found but could not be loaded"
                );
                None
            }
        }
    }

    fn find_in_legacy_registry(&self, qualified: &str) -> Option<ConstructibleType> {
        let partial = self.convention.unit_name(qualified)?;
        self.universe
            .load_by_partial_name(&partial)
            .and_then(|unit| unit.find_type(qualified))
    }
}

//! Purpose: Static catalog of constructible types grouped into type units.
//! Exports: `CatalogUniverse`, `CatalogUnit`, `builtin_universe`, `find_tool_def`, tool defs.
//! Role: Concrete `TypeUniverse` for the reference model.
//! Invariants: Units are in exactly one state: loaded, installable from disk, or legacy-only.
//! Invariants: Loading an already-loaded unit returns the existing unit.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::info;

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{EnumType, node_ref};
use crate::core::typeres::{ConstructibleType, TypeUnit, TypeUniverse};
use crate::model::nodes::{ContainerKind, TOOL_BLOCK_TYPE, TOOL_GROUP_TYPE, ToolGroup};
use crate::model::tool::{FieldDef, FieldKind, Initial, ToolDef};

pub static POLARITY: EnumType = EnumType {
    name: "CogBlobSegmentationPolarityConstants",
    members: &["DarkBlobs", "LightBlobs"],
};

pub static CONNECTIVITY: EnumType = EnumType {
    name: "CogBlobConnectivityModeConstants",
    members: &["GreyScale", "WholeImage", "SegmentedRegions"],
};

pub static ALIGN_MODE: EnumType = EnumType {
    name: "CogPMAlignRunAlgorithmConstants",
    members: &["PatMax", "PatQuick", "PatFlex"],
};

pub static BLOB_TOOL: ToolDef = ToolDef {
    type_name: "CogBlobTool",
    unit: "Cognex.VisionPro.Blob",
    fields: &[
        FieldDef {
            name: "InputImage",
            kind: FieldKind::Image,
            writable: true,
            initial: Initial::Null,
        },
        FieldDef {
            name: "Threshold",
            kind: FieldKind::Int,
            writable: true,
            initial: Initial::Int(128),
        },
        FieldDef {
            name: "Polarity",
            kind: FieldKind::Enum(&POLARITY),
            writable: true,
            initial: Initial::Enum(0),
        },
        FieldDef {
            name: "ResultCount",
            kind: FieldKind::Int,
            writable: false,
            initial: Initial::Int(0),
        },
    ],
    run_params: &[
        FieldDef {
            name: "ConnectivityMode",
            kind: FieldKind::Enum(&CONNECTIVITY),
            writable: true,
            initial: Initial::Enum(0),
        },
        FieldDef {
            name: "MinArea",
            kind: FieldKind::Float,
            writable: true,
            initial: Initial::Float(10.0),
        },
        FieldDef {
            name: "MinPixels",
            kind: FieldKind::Int,
            writable: true,
            initial: Initial::Int(10),
        },
        FieldDef {
            name: "SortEnabled",
            kind: FieldKind::Bool,
            writable: true,
            initial: Initial::Bool(false),
        },
    ],
};

pub static IMAGE_FILE_TOOL: ToolDef = ToolDef {
    type_name: "CogImageFileTool",
    unit: "Cognex.VisionPro.ImageFile",
    fields: &[
        FieldDef {
            name: "FileName",
            kind: FieldKind::Text,
            writable: true,
            initial: Initial::Text(""),
        },
        FieldDef {
            name: "OutputImage",
            kind: FieldKind::Image,
            writable: false,
            initial: Initial::Image {
                width: 640,
                height: 480,
            },
        },
        FieldDef {
            name: "RecordIndex",
            kind: FieldKind::Int,
            writable: true,
            initial: Initial::Int(0),
        },
    ],
    run_params: &[],
};

pub static PMALIGN_TOOL: ToolDef = ToolDef {
    type_name: "CogPMAlignTool",
    unit: "Cognex.VisionPro.PMAlign",
    fields: &[
        FieldDef {
            name: "InputImage",
            kind: FieldKind::Image,
            writable: true,
            initial: Initial::Null,
        },
        FieldDef {
            name: "PatternTrained",
            kind: FieldKind::Bool,
            writable: false,
            initial: Initial::Bool(false),
        },
    ],
    run_params: &[
        FieldDef {
            name: "AcceptThreshold",
            kind: FieldKind::Float,
            writable: true,
            initial: Initial::Float(0.5),
        },
        FieldDef {
            name: "ApproxNumToFind",
            kind: FieldKind::Int,
            writable: true,
            initial: Initial::Int(1),
        },
        FieldDef {
            name: "RunAlgorithm",
            kind: FieldKind::Enum(&ALIGN_MODE),
            writable: true,
            initial: Initial::Enum(0),
        },
    ],
};

pub static FIXTURE_TOOL: ToolDef = ToolDef {
    type_name: "CogFixtureTool",
    unit: "Cognex.VisionPro.CalibFix",
    fields: &[
        FieldDef {
            name: "InputImage",
            kind: FieldKind::Image,
            writable: true,
            initial: Initial::Null,
        },
        FieldDef {
            name: "FixturedSpaceName",
            kind: FieldKind::Text,
            writable: true,
            initial: Initial::Text("Fixture"),
        },
        FieldDef {
            name: "OutputImage",
            kind: FieldKind::Image,
            writable: false,
            initial: Initial::Null,
        },
    ],
    run_params: &[],
};

pub static TOOL_DEFS: &[&ToolDef] = &[&BLOB_TOOL, &IMAGE_FILE_TOOL, &PMALIGN_TOOL, &FIXTURE_TOOL];

/// Definition lookup by short type name, independent of unit load state.
pub fn find_tool_def(type_name: &str) -> Option<&'static ToolDef> {
    TOOL_DEFS
        .iter()
        .copied()
        .find(|def| def.type_name.eq_ignore_ascii_case(type_name))
}

/// A named set of constructible types.
pub struct CatalogUnit {
    name: String,
    dynamic: bool,
    types: Vec<ConstructibleType>,
}

impl CatalogUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dynamic: false,
            types: Vec::new(),
        }
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn with_type(mut self, ty: ConstructibleType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn with_tool(self, def: &'static ToolDef) -> Self {
        self.with_type(ConstructibleType::new(def.qualified_name(), move || {
            def.instantiate()
        }))
    }

    pub fn with_container(self, kind: ContainerKind) -> Self {
        let type_name = kind.type_name();
        let module = match kind {
            ContainerKind::Group => "ToolGroup",
            ContainerKind::Block => "ToolBlock",
        };
        self.with_type(ConstructibleType::new(
            format!("Cognex.VisionPro.{module}.{type_name}"),
            move || node_ref(ToolGroup::new(kind, format!("{type_name}1"))),
        ))
    }
}

impl TypeUnit for CatalogUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn find_type(&self, qualified_name: &str) -> Option<ConstructibleType> {
        self.types
            .iter()
            .find(|ty| ty.qualified_name().eq_ignore_ascii_case(qualified_name))
            .cloned()
    }
}

/// Units already loaded, units installable from a file, and legacy-only units.
#[derive(Default)]
pub struct CatalogUniverse {
    loaded: RefCell<Vec<Rc<dyn TypeUnit>>>,
    installable: Vec<Rc<dyn TypeUnit>>,
    legacy: Vec<Rc<dyn TypeUnit>>,
}

impl CatalogUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaded(self, unit: CatalogUnit) -> Self {
        self.loaded.borrow_mut().push(Rc::new(unit));
        self
    }

    pub fn with_installable(mut self, unit: CatalogUnit) -> Self {
        self.installable.push(Rc::new(unit));
        self
    }

    pub fn with_legacy(mut self, unit: CatalogUnit) -> Self {
        self.legacy.push(Rc::new(unit));
        self
    }

    fn already_loaded(&self, name: &str) -> Option<Rc<dyn TypeUnit>> {
        self.loaded
            .borrow()
            .iter()
            .find(|unit| unit.name().eq_ignore_ascii_case(name))
            .cloned()
    }
}

impl TypeUniverse for CatalogUniverse {
    fn loaded_units(&self) -> Vec<Rc<dyn TypeUnit>> {
        self.loaded.borrow().clone()
    }

    fn load_unit(&self, path: &Path) -> Result<Rc<dyn TypeUnit>, Error> {
        std::fs::metadata(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open type unit")
                .with_path(path)
                .with_source(err)
        })?;
        let unit_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        if let Some(unit) = self.already_loaded(unit_name) {
            return Ok(unit);
        }
        let unit = self
            .installable
            .iter()
            .find(|unit| unit.name().eq_ignore_ascii_case(unit_name))
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::Corrupt)
                    .with_message(format!("'{unit_name}' is not a known type unit"))
                    .with_path(path)
            })?;
        info!(unit = unit_name, path = %path.display(), "loaded type unit");
        self.loaded.borrow_mut().push(unit.clone());
        Ok(unit)
    }

    fn load_by_partial_name(&self, partial_name: &str) -> Option<Rc<dyn TypeUnit>> {
        self.legacy
            .iter()
            .find(|unit| unit.name().eq_ignore_ascii_case(partial_name))
            .cloned()
    }
}

/// The catalog shipped with the driver.
pub fn builtin_universe() -> CatalogUniverse {
    CatalogUniverse::new()
        .with_loaded(
            CatalogUnit::new("Cognex.VisionPro.ToolGroup").with_container(ContainerKind::Group),
        )
        .with_loaded(
            CatalogUnit::new("Cognex.VisionPro.ToolBlock").with_container(ContainerKind::Block),
        )
        .with_loaded(CatalogUnit::new(IMAGE_FILE_TOOL.unit).with_tool(&IMAGE_FILE_TOOL))
        .with_loaded(CatalogUnit::new(BLOB_TOOL.unit).with_tool(&BLOB_TOOL))
        .with_loaded(
            CatalogUnit::new("Cognex.VisionPro.Dynamic.Proxies")
                .dynamic()
                .with_tool(&PMALIGN_TOOL),
        )
        .with_installable(CatalogUnit::new(PMALIGN_TOOL.unit).with_tool(&PMALIGN_TOOL))
        .with_legacy(CatalogUnit::new(FIXTURE_TOOL.unit).with_tool(&FIXTURE_TOOL))
}

/// Container constructor used when a document names a group or block.
pub fn container_kind(type_name: &str) -> Option<ContainerKind> {
    if type_name.eq_ignore_ascii_case(TOOL_GROUP_TYPE) {
        Some(ContainerKind::Group)
    } else if type_name.eq_ignore_ascii_case(TOOL_BLOCK_TYPE) {
        Some(ContainerKind::Block)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typeres::TypeResolver;

    #[test]
    fn builtin_types_resolve_through_every_layer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = TypeResolver::new(Rc::new(builtin_universe()), dir.path());

        let blob = resolver.resolve("CogBlobTool").expect("loaded");
        assert_eq!(blob.construct().borrow().type_name(), "CogBlobTool");
        // Containers sit outside the short-name convention and need their full name.
        assert!(resolver.resolve("CogToolGroup").is_err());
        let group = resolver
            .resolve("Cognex.VisionPro.ToolGroup.CogToolGroup")
            .expect("loaded");
        assert_eq!(group.construct().borrow().type_name(), "CogToolGroup");
        let fixture = resolver.resolve("CogFixtureTool").expect("legacy");
        assert_eq!(fixture.short_name(), "CogFixtureTool");

        // Only the dynamic unit carries PMAlign until the plugin file exists.
        let err = resolver.resolve("CogPMAlignTool").expect_err("not installed");
        assert_eq!(err.kind(), ErrorKind::TypeResolution);

        std::fs::write(dir.path().join("Cognex.VisionPro.PMAlign.dll"), b"").expect("write");
        let align = resolver.resolve("CogPMAlignTool").expect("plugin");
        assert_eq!(align.qualified_name(), "Cognex.VisionPro.PMAlign.CogPMAlignTool");
    }

    #[test]
    fn unknown_unit_files_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Cognex.VisionPro.Mystery.dll");
        std::fs::write(&path, b"").expect("write");
        let universe = builtin_universe();
        let err = universe.load_unit(&path).err().expect("unknown");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = universe
            .load_unit(&dir.path().join("missing.dll"))
            .err()
            .expect("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn tool_defs_are_found_by_short_name() {
        assert!(find_tool_def("cogblobtool").is_some());
        assert!(find_tool_def("CogToolGroup").is_none());
        assert_eq!(container_kind("cogtoolblock"), Some(ContainerKind::Block));
    }
}

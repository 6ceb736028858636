//! A compiler that copies sources into the module output root

use crate::config::CompileSettings;
use crate::error::{BuildError, BuildResult};
use convenient_monitor::{CompileContext, Compiler, FileNode, ModuleRoots};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Where one compiled source went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedOutput {
    /// Output root of the owning module
    pub output_root: PathBuf,
    /// Written file
    pub output: PathBuf,
}

/// Copies `<root>/a/b.<src>` to `<output root>/a/b.<out>`
#[derive(Debug, Clone)]
pub struct CopyCompiler {
    settings: CompileSettings,
    modules: Vec<ModuleRoots>,
}

impl CopyCompiler {
    /// Compiler for the given modules; paths must be absolute
    pub fn new(settings: CompileSettings, modules: Vec<ModuleRoots>) -> Self {
        Self { settings, modules }
    }

    /// Compile one source
    ///
    /// Returns `None` for sources outside every source root or in a module
    /// without an output root: they compile to nothing.
    pub fn compile(&self, source: &FileNode) -> BuildResult<Option<CopiedOutput>> {
        let Some((module, relative)) = self.modules.iter().find_map(|module| {
            module
                .source_roots
                .iter()
                .chain(&module.generated_roots)
                .find_map(|root| source.path.strip_prefix(root).ok())
                .map(|relative| (module, relative))
        }) else {
            return Ok(None);
        };
        let Some(output_root) = &module.output_root else {
            return Ok(None);
        };

        let output = output_root.join(relative).with_extension(&self.settings.output_extension);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        let _bytes = fs::copy(&source.path, &output).map_err(|e| BuildError::io(&source.path, e))?;
        debug!(source = %source.path.display(), output = %output.display(), "Compiled");

        Ok(Some(CopiedOutput {
            output_root: output_root.clone(),
            output,
        }))
    }
}

impl Compiler for CopyCompiler {
    fn description(&self) -> &str {
        "copy"
    }

    fn is_compilable_file(&self, file: &FileNode, _ctx: &CompileContext) -> bool {
        !file.is_dir && file.path.extension().is_some_and(|e| e == self.settings.source_extension.as_str())
    }
}

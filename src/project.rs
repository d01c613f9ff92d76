//! Remapping whole directories of compiled classes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::remapper::{ClassRemapper, RemapError};
use crate::table::{merge, parse_compact_mapping, parse_debug_mapping, RemapGoal, SymbolTable};

/// Errors of the batch remapping layer.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The options are inconsistent.
    #[error("invalid remap options: {0}")]
    InvalidOptions(String),
    /// A mapping source is malformed.
    #[error("malformed mapping {}: {message}", path.display())]
    Mapping {
        /// The mapping file.
        path: PathBuf,
        /// The parse error, including line number and text.
        message: String,
    },
    /// Reading or writing a file failed.
    #[error("failed to access {}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// A class file could not be remapped.
    #[error("failed to remap {}: {source}", path.display())]
    Remap {
        /// The class file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: RemapError,
    },
    /// The cached symbol table could not be read or written.
    #[error("invalid symbol table cache {}", path.display())]
    Cache {
        /// The cache file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProjectError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| ProjectError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Which directories to remap and how.
///
/// ```
/// let options: string_remapper::RemapOptions = serde_json::from_str(
///     r#"{ "inputDirs": ["build/classes"], "goal": "spigot" }"#,
/// )
/// .unwrap();
/// assert!(options.output_dirs.is_empty());
/// assert_eq!(options.goal, string_remapper::RemapGoal::Production);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapOptions {
    /// Directories containing `.class` files.
    pub input_dirs: Vec<PathBuf>,
    /// One output directory per input directory, or empty to rewrite the
    /// input directories in place.
    #[serde(default)]
    pub output_dirs: Vec<PathBuf>,
    /// The naming scheme to remap to.
    pub goal: RemapGoal,
}

/// Outcome of [`ProjectRemapper::remap`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemapSummary {
    /// Classes that were rewritten.
    pub remapped: usize,
    /// Classes that needed no change.
    pub unchanged: usize,
    /// Classes that could not be processed.
    pub failed: usize,
}

/// Remaps every class file below a set of directories.
///
/// Files are processed independently; a failing class is logged and
/// counted but does not stop the batch. When remapping in place the
/// original bytes are kept so [`revert`](Self::revert) can restore them.
#[derive(Debug)]
pub struct ProjectRemapper<'t> {
    remapper: ClassRemapper<'t>,
    options: RemapOptions,
    originals: Vec<(PathBuf, Vec<u8>)>,
}

impl<'t> ProjectRemapper<'t> {
    /// Validates `options` and creates a remapper over `table`.
    pub fn new(table: &'t SymbolTable, options: RemapOptions) -> Result<Self, ProjectError> {
        if !options.output_dirs.is_empty()
            && options.output_dirs.len() != options.input_dirs.len()
        {
            return Err(ProjectError::InvalidOptions(format!(
                "{} output directories given for {} input directories",
                options.output_dirs.len(),
                options.input_dirs.len()
            )));
        }
        for dir in &options.input_dirs {
            if !dir.is_dir() {
                return Err(ProjectError::InvalidOptions(format!(
                    "input directory {} does not exist or is not a directory",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            remapper: ClassRemapper::new(table, options.goal),
            options,
            originals: Vec::new(),
        })
    }

    /// The options this remapper was created with.
    pub fn options(&self) -> &RemapOptions {
        &self.options
    }

    /// Remaps all classes of all input directories.
    ///
    /// Changed classes are written to the matching output directory (or
    /// over the input), unchanged ones are copied when the output directory
    /// differs from the input.
    pub fn remap(&mut self) -> Result<RemapSummary, ProjectError> {
        let mut summary = RemapSummary::default();
        let dirs: Vec<(PathBuf, PathBuf)> = self
            .options
            .input_dirs
            .iter()
            .enumerate()
            .map(|(idx, input)| {
                let output = self.options.output_dirs.get(idx).unwrap_or(input);
                (input.clone(), output.clone())
            })
            .collect();

        for (input, output) in &dirs {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(error = %err, "skipping unreadable directory entry");
                        summary.failed += 1;
                        continue;
                    }
                };
                let path = entry.path();
                let is_class = path.extension().map_or(false, |ext| ext == "class");
                if !entry.file_type().is_file() || !is_class {
                    continue;
                }
                let relative = path.strip_prefix(input).unwrap_or(path);
                let target = output.join(relative);

                match self.remap_file(path, &target) {
                    Ok(true) => {
                        debug!(class = %relative.display(), "remapped strings");
                        summary.remapped += 1;
                    }
                    Ok(false) => summary.unchanged += 1,
                    Err(err) => {
                        error!(class = %relative.display(), error = %err, "failed to remap class");
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Remaps the class file at `input` and writes the result to `output`.
    ///
    /// Returns whether the class changed. An unchanged class is copied when
    /// `output` is a different path. When both paths are the same the
    /// original bytes are kept for [`revert`](Self::revert).
    pub fn remap_file(&mut self, input: &Path, output: &Path) -> Result<bool, ProjectError> {
        let in_place = input == output;
        let bytes = fs::read(input).map_err(ProjectError::io(input))?;
        let remapped = self
            .remapper
            .remap(&bytes)
            .map_err(|source| ProjectError::Remap {
                path: input.to_owned(),
                source,
            })?;

        if !in_place {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).map_err(ProjectError::io(parent))?;
            }
        }
        match remapped {
            Some(remapped) => {
                fs::write(output, remapped).map_err(ProjectError::io(output))?;
                if in_place {
                    self.originals.push((output.to_owned(), bytes));
                }
                Ok(true)
            }
            None => {
                if !in_place {
                    fs::write(output, &bytes).map_err(ProjectError::io(output))?;
                }
                Ok(false)
            }
        }
    }

    /// Restores the original bytes of every class remapped in place.
    ///
    /// Does nothing when the classes were written to separate output
    /// directories. Returns the number of restored files.
    pub fn revert(&mut self) -> Result<usize, ProjectError> {
        if !self.options.output_dirs.is_empty() {
            debug!("skipping revert because classes were written to separate output directories");
            return Ok(0);
        }

        let mut reverted = 0;
        for (path, original) in self.originals.drain(..) {
            debug!(path = %path.display(), "reverting remapped strings");
            fs::write(&path, original).map_err(ProjectError::io(&path))?;
            reverted += 1;
        }
        Ok(reverted)
    }
}

/// Loads the symbol table from `cache`, or builds it from the two mapping
/// files and writes the cache.
pub fn load_symbol_table(
    debug: &Path,
    compact: &Path,
    cache: &Path,
) -> Result<SymbolTable, ProjectError> {
    if cache.is_file() {
        debug!(cache = %cache.display(), "loading cached symbol table");
        let file = fs::File::open(cache).map_err(ProjectError::io(cache))?;
        return SymbolTable::from_reader(file).map_err(|source| ProjectError::Cache {
            path: cache.to_owned(),
            source,
        });
    }

    let debug_source = fs::read(debug).map_err(ProjectError::io(debug))?;
    let compact_source = fs::read(compact).map_err(ProjectError::io(compact))?;
    let debug_tables = parse_debug_mapping(&debug_source).map_err(|err| ProjectError::Mapping {
        path: debug.to_owned(),
        message: err.to_string(),
    })?;
    let compact_classes =
        parse_compact_mapping(&compact_source).map_err(|err| ProjectError::Mapping {
            path: compact.to_owned(),
            message: err.to_string(),
        })?;
    let table = merge(debug_tables, &compact_classes);

    if let Some(parent) = cache.parent() {
        fs::create_dir_all(parent).map_err(ProjectError::io(parent))?;
    }
    let file = fs::File::create(cache).map_err(ProjectError::io(cache))?;
    let mut writer = io::BufWriter::new(file);
    table
        .to_writer(&mut writer)
        .map_err(|source| ProjectError::Cache {
            path: cache.to_owned(),
            source,
        })?;
    writer.flush().map_err(ProjectError::io(cache))?;
    debug!(cache = %cache.display(), ?table, "wrote symbol table cache");

    Ok(table)
}

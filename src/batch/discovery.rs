//! Input discovery and task building.

use crate::error::{ConvertError, Result, ResultExt as _};
use crate::source::SourceFormat;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of every metadata document written to the output directory.
pub const OUTPUT_EXTENSION: &str = "json";

/// One file to convert. Tasks are built once and never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: SourceFormat,
}

/// Finds inputs of `format` under `root`.
///
/// A directory is searched recursively without following symbolic links, so
/// a link back to an ancestor cannot yield the same file twice. A matching
/// file is returned on its own; anything else yields nothing. Entries that
/// cannot be read are skipped with a warning. Results are sorted.
pub fn discover(root: &Path, format: SourceFormat) -> Vec<PathBuf> {
    if root.is_file() {
        return if SourceFormat::from_path(root) == Some(format) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    if !root.is_dir() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Skipping unreadable entry under {}: {err}", root.display());
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| SourceFormat::from_path(entry.path()) == Some(format))
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

/// Output path for `input`: `<output_dir>/<stem>.json`.
pub fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| ConvertError::InvalidPath(input.display().to_string()))?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    Ok(output_dir.join(name))
}

/// Builds one task per discovered input, SAS7BDAT files first.
///
/// Inputs that share a stem map to the same output; the last task wins.
pub fn build_tasks(input_root: &Path, output_dir: &Path) -> Result<Vec<ConversionTask>> {
    let mut tasks = Vec::new();
    for format in SourceFormat::ALL {
        for input in discover(input_root, format) {
            let output = output_path(&input, output_dir)?;
            tasks.push(ConversionTask {
                input,
                output,
                format,
            });
        }
    }

    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    for task in &tasks {
        if let Some(previous) = seen.insert(task.output.as_path(), task.input.as_path()) {
            tracing::warn!(
                "{} and {} both write {}; the later conversion overwrites the earlier",
                previous.display(),
                task.input.display(),
                task.output.display()
            );
        }
    }

    Ok(tasks)
}

/// Creates the output directory before any task runs.
///
/// Fails when the path exists and is not a directory.
pub fn prepare_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(ConvertError::InvalidPath(format!(
            "{} exists and is not a directory",
            output_dir.display()
        )));
    }
    fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Could not create the output directory {}",
            output_dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn touch(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, b"")?;
        Ok(())
    }

    #[test]
    fn test_discover_recurses_and_sorts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        touch(&dir.path().join("b.xpt"))?;
        touch(&dir.path().join("nested/a.XPT"))?;
        touch(&dir.path().join("nested/deeper/c.sas7bdat"))?;
        touch(&dir.path().join("notes.txt"))?;

        let xpt = discover(dir.path(), SourceFormat::Xport);
        assert_eq!(
            xpt,
            vec![dir.path().join("b.xpt"), dir.path().join("nested/a.XPT")]
        );
        let sas = discover(dir.path(), SourceFormat::Sas7bdat);
        assert_eq!(sas, vec![dir.path().join("nested/deeper/c.sas7bdat")]);
        Ok(())
    }

    #[test]
    fn test_discover_single_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("dm.xpt");
        touch(&file)?;
        assert_eq!(discover(&file, SourceFormat::Xport), vec![file.clone()]);
        assert!(discover(&file, SourceFormat::Sas7bdat).is_empty());
        assert!(discover(&dir.path().join("missing.xpt"), SourceFormat::Xport).is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_ignores_symlink_loops() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in");
        touch(&input.join("dm.xpt"))?;
        std::os::unix::fs::symlink(&input, input.join("loop"))?;

        assert_eq!(discover(&input, SourceFormat::Xport), vec![input.join("dm.xpt")]);
        let tasks = build_tasks(&input, &dir.path().join("out"))?;
        assert_eq!(tasks.len(), 1);
        Ok(())
    }

    #[test]
    fn test_build_tasks_names_outputs_by_stem() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out");
        touch(&dir.path().join("in/dm.xpt"))?;
        touch(&dir.path().join("in/ae.sas7bdat"))?;
        touch(&dir.path().join("in/sub/dm.sas7bdat"))?;

        let tasks = build_tasks(&dir.path().join("in"), &out)?;
        let summary: Vec<_> = tasks
            .iter()
            .map(|t| (t.format, t.output.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SourceFormat::Sas7bdat, out.join("ae.json")),
                (SourceFormat::Sas7bdat, out.join("dm.json")),
                (SourceFormat::Xport, out.join("dm.json")),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_output_path_keeps_inner_dots() -> Result<()> {
        let path = output_path(Path::new("in/dm.v2.xpt"), Path::new("out"))?;
        assert_eq!(path, Path::new("out/dm.v2.json"));
        Ok(())
    }

    #[test]
    fn test_prepare_output_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a/b");
        prepare_output_dir(&nested)?;
        assert!(nested.is_dir());
        prepare_output_dir(&nested)?;

        let file = dir.path().join("file");
        touch(&file)?;
        assert!(prepare_output_dir(&file).is_err());
        Ok(())
    }
}

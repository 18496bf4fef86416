//! Batch runs over directories of generated transport files.

mod common;

use common::{demographics, read_json, write_xpt};
use datasetjson::batch::{self, BatchOptions, TaskStatus};
use datasetjson::dataset::ConversionOptions;

#[test]
fn test_worker_count_clamps_to_task_count() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let (vars, rows) = demographics();
    write_xpt(&input.join("dm.xpt"), "DM", "Demographics", &vars, &rows)?;
    write_xpt(&input.join("nested/ae.xpt"), "AE", "Adverse Events", &vars, &rows)?;

    let options = BatchOptions {
        workers: Some(4),
        ..Default::default()
    };
    let report = batch::run(&input, &output, &options)?;

    assert_eq!(report.workers, Some(2));
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(read_json(&output.join("dm.json"))?["datasets"][0]["name"], "DM");
    assert_eq!(read_json(&output.join("ae.json"))?["datasets"][0]["name"], "AE");
    Ok(())
}

#[test]
fn test_sequential_when_workers_not_positive() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("dm.xpt");
    let (vars, rows) = demographics();
    write_xpt(&input, "DM", "Demographics", &vars, &rows)?;

    for workers in [None, Some(0), Some(-2)] {
        let output = dir.path().join(format!("out{}", workers.unwrap_or(9)));
        let options = BatchOptions {
            workers,
            ..Default::default()
        };
        let report = batch::run(&input, &output, &options)?;
        assert_eq!(report.workers, None);
        assert_eq!(report.succeeded(), 1);
        assert!(output.join("dm.json").is_file());
    }
    Ok(())
}

#[test]
fn test_corrupt_file_does_not_stop_the_batch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let (vars, rows) = demographics();
    write_xpt(&input.join("a.xpt"), "A", "", &vars, &rows)?;
    std::fs::write(input.join("b.xpt"), b"garbage")?;
    std::fs::write(input.join("c.sas7bdat"), vec![0u8; 1024])?;
    write_xpt(&input.join("d.xpt"), "D", "", &vars, &rows)?;

    let options = BatchOptions {
        workers: Some(3),
        conversion: ConversionOptions {
            external: true,
            ..Default::default()
        },
    };
    let report = batch::run(&input, &output, &options)?;

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.succeeded(), 2);
    let failed: Vec<_> = report
        .failed()
        .iter()
        .map(|o| o.input.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(failed, vec![Some("c.sas7bdat".to_owned()), Some("b.xpt".to_owned())]);
    assert!(report.failed().iter().all(|o| matches!(o.status, TaskStatus::Failed(_))));

    assert!(output.join("a.json").is_file());
    assert!(output.join("a-data.jsonl").is_file());
    assert!(output.join("d-data.jsonl").is_file());
    assert!(!output.join("b.json").exists());
    Ok(())
}

#[test]
fn test_output_path_that_is_a_file_is_a_setup_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("dm.xpt");
    let (vars, rows) = demographics();
    write_xpt(&input, "DM", "Demographics", &vars, &rows)?;
    let output = dir.path().join("taken");
    std::fs::write(&output, b"")?;

    let result = batch::run(&input, &output, &BatchOptions::default());
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_nothing_to_convert() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("notes.csv"), b"a,b\n")?;
    let output = dir.path().join("out");

    let report = batch::run(dir.path(), &output, &BatchOptions::default())?;
    assert!(report.outcomes.is_empty());
    assert!(output.is_dir());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_converts_each_file_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let (vars, rows) = demographics();
    write_xpt(&input.join("dm.xpt"), "DM", "Demographics", &vars, &rows)?;
    std::os::unix::fs::symlink(&input, input.join("loop"))?;

    let options = BatchOptions {
        workers: Some(4),
        ..Default::default()
    };
    let report = batch::run(&input, &output, &options)?;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.workers, Some(1));
    assert_eq!(report.succeeded(), 1);
    assert_eq!(read_json(&output.join("dm.json"))?["datasets"][0]["name"], "DM");
    Ok(())
}

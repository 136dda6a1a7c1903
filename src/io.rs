use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::data::Dataset;
use crate::error::{config_error, Result};
use crate::hierarchy::StaticHierarchy;
use crate::result::Output;

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| config_error(format!("delimiter {:?} is not an ASCII character", delimiter)))
}

/// Read a delimited file with a header line into a dataset.
pub fn read_csv(path: &Path, delimiter: char) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(true)
        .from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|value| value.to_string()).collect());
    }
    Dataset::create(rows, header)
}

/// Read a hierarchy table: one line per raw value, followed by its generalizations.
pub fn read_hierarchy(path: &Path, delimiter: char) -> Result<StaticHierarchy> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(false)
        .from_path(path)?;
    let mut hierarchy = StaticHierarchy::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let value = fields
            .next()
            .ok_or_else(|| config_error(format!("empty line in hierarchy {}", path.display())))?;
        hierarchy.add(value, fields)?;
    }
    Ok(hierarchy)
}

pub fn write_csv(path: &Path, output: &Output, delimiter: char) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_path(path)?;
    writer.write_record(&output.header)?;
    for row in &output.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population.csv");
        fs::write(&path, "person_id;gender\n1;8507\n2;8532\n").unwrap();
        let dataset = read_csv(&path, ';').unwrap();
        assert_eq!(dataset.header(), &["person_id", "gender"]);
        assert_eq!(dataset.num_rows(), 2);
        assert_eq!(dataset.rows()[1][1], "8532");
    }

    #[test]
    fn test_read_hierarchy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gender.csv");
        fs::write(&path, "8507;{8507,8532}\n8532;{8507,8532}\n").unwrap();
        let hierarchy = read_hierarchy(&path, ';').unwrap();
        assert_eq!(hierarchy.height(), 1);
        assert_eq!(hierarchy.level_of("8532", 1), Some("{8507,8532}"));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let output = Output {
            header: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec!["*".to_string(), "1980-1989".to_string()]],
        };
        write_csv(&path, &output, ';').unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a;b\n*;1980-1989\n");
    }

    #[test]
    fn test_rejects_wide_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_csv(&dir.path().join("x.csv"), '→').is_err());
    }
}

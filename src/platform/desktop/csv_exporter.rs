use anyhow::{Context, Result};
use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{particles::ParticleVec, V3};

/// Writes one `x,y,z` table with a row per particle in index order.
///
/// Values use the shortest representation that parses back to the same float.
pub fn write_csv_table(writer: &mut impl Write, vectors: &[V3]) -> std::io::Result<()> {
    writeln!(writer, "x,y,z")?;
    for v in vectors {
        writeln!(writer, "{},{},{}", v.x, v.y, v.z)?;
    }
    Ok(())
}

pub fn write_csv_file(path: &Path, vectors: &[V3]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_csv_table(&mut writer, vectors)
        .and_then(|_| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}

pub(crate) struct CsvExporter {
    /// something like './data' and 'pbf' which will get expanded to './data/pbf-positions-00001.csv'
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
}

impl CsvExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> Result<CsvExporter> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder).with_context(|| format!("failed to create output folder {}", folder.display()))?;

        Ok(CsvExporter {
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    /// Writes position and velocity tables, returns the path of the position table.
    pub(crate) fn add_snapshot(&mut self, particles: &ParticleVec) -> Result<PathBuf> {
        let position_path = self
            .folder
            .join(format!("{}-positions-{:05}.csv", self.basename, self.snapshot_number));
        let velocity_path = self
            .folder
            .join(format!("{}-velocities-{:05}.csv", self.basename, self.snapshot_number));

        write_csv_file(&position_path, &particles.position)?;
        write_csv_file(&velocity_path, &particles.velocity)?;

        self.snapshot_number += 1;
        Ok(position_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{floating_type_mod::FT, vec3f};

    #[test]
    fn table_has_header_and_one_row_per_particle() {
        let mut out = Vec::new();
        write_csv_table(&mut out, &[vec3f(0., 0.5, 1.), vec3f(-0.25, 2., 0.125)]).unwrap();
        let s = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(
            lines,
            vec!["x,y,z", "0,0.5,1", "-0.25,2,0.125"]
        );
    }

    #[test]
    fn small_values_survive_the_table() {
        let v = vec3f(1.0e-7, -3.25e-9, 123456.79);
        let mut out = Vec::new();
        write_csv_table(&mut out, &[v]).unwrap();
        let s = String::from_utf8(out).unwrap();
        let row: Vec<FT> = s
            .lines()
            .nth(1)
            .unwrap()
            .split(',')
            .map(|x| x.parse::<FT>().unwrap())
            .collect();
        assert_eq!(row, vec![v.x, v.y, v.z]);
    }

    #[test]
    fn exporter_numbers_snapshots() {
        let dir = std::env::temp_dir().join(format!("pbf-csv-test-{}", std::process::id()));
        let mut exporter = CsvExporter::new(&dir, "sim").unwrap();

        let mut particles = ParticleVec::allocate(8).unwrap();
        particles.lay_out_lattice(2).unwrap();

        let first = exporter.add_snapshot(&particles).unwrap();
        let second = exporter.add_snapshot(&particles).unwrap();
        assert!(first.ends_with("sim-positions-00001.csv"));
        assert!(second.ends_with("sim-positions-00002.csv"));
        assert!(dir.join("sim-velocities-00002.csv").exists());

        let content = std::fs::read_to_string(&first).unwrap();
        assert_eq!(content.lines().count(), 1 + 8);
        assert_eq!(content.lines().nth(8), Some("1,1,1"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = std::env::temp_dir().join(format!("pbf-csv-missing-{}", std::process::id()));
        let path = dir.join("does-not-exist").join("positions.csv");
        let err = write_csv_file(&path, &[V3::zeros()]).unwrap_err();
        assert!(format!("{:#}", err).contains("positions.csv"));
    }
}

use std::{
    collections::HashMap,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use csv::Writer;
use multibody::{Assembly, BodyId, BodyState, Snapshot};
use thiserror::Error;

pub type ResultWriter = Writer<BufWriter<File>>;

#[derive(Debug, Error)]
pub enum ResultErrors {
    #[error("could not create result directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("could not create result file {0}: {1}")]
    CreateFile(PathBuf, std::io::Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot has no state for body '{0}'")]
    MissingState(String),
    #[error("no result writer with id {0}")]
    WriterNotFound(u32),
}

/// Owns one csv writer per result file under `result_path`.
pub struct ResultManager {
    writers: HashMap<u32, ResultWriter>,
    pub result_path: PathBuf,
    next_id: u32,
}

impl ResultManager {
    pub fn new(result_path: PathBuf) -> Self {
        Self {
            writers: HashMap::new(),
            result_path,
            next_id: 0,
        }
    }

    /// Creates `<result_path>/<name>.csv` with the given header row.
    pub fn new_writer(&mut self, name: &str, headers: &[&str]) -> Result<u32, ResultErrors> {
        std::fs::create_dir_all(&self.result_path)
            .map_err(|e| ResultErrors::CreateDir(self.result_path.clone(), e))?;

        let path = self.result_path.join(format!("{name}.csv"));
        let file = File::create(&path).map_err(|e| ResultErrors::CreateFile(path, e))?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        writer.write_record(headers)?;
        let id = self.next_id;
        self.writers.insert(id, writer);
        self.next_id += 1;
        Ok(id)
    }

    pub fn write_record(&mut self, id: u32, content: &[String]) -> Result<(), ResultErrors> {
        let writer = self
            .writers
            .get_mut(&id)
            .ok_or(ResultErrors::WriterNotFound(id))?;
        writer.write_record(content)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ResultErrors> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

pub const BODY_HEADERS: [&str; 14] = [
    "t", "x", "y", "z", "qw", "qx", "qy", "qz", "vx", "vy", "vz", "wx", "wy", "wz",
];

/// One csv row for a body state at time `t`.
pub fn body_record(t: f64, state: &BodyState) -> Vec<String> {
    let q = state.orientation.quaternion();
    [
        t,
        state.position.x,
        state.position.y,
        state.position.z,
        q.w,
        q.i,
        q.j,
        q.k,
        state.linear_velocity.x,
        state.linear_velocity.y,
        state.linear_velocity.z,
        state.angular_velocity.x,
        state.angular_velocity.y,
        state.angular_velocity.z,
    ]
    .iter()
    .map(|v| v.to_string())
    .collect()
}

/// Writes the committed state of every body of an assembly, one file per body.
pub struct AssemblyRecorder {
    bodies: Vec<(BodyId, String, u32)>,
}

impl AssemblyRecorder {
    pub fn new(assembly: &Assembly, results: &mut ResultManager) -> Result<Self, ResultErrors> {
        let mut bodies = Vec::new();
        for body in assembly.bodies().iter() {
            let writer = results.new_writer(&body.name, &BODY_HEADERS)?;
            bodies.push((body.id(), body.name.clone(), writer));
        }
        tracing::debug!(
            "writing {} body result files to {}",
            bodies.len(),
            results.result_path.display()
        );
        Ok(Self { bodies })
    }

    pub fn record(
        &self,
        snapshot: &Snapshot,
        results: &mut ResultManager,
    ) -> Result<(), ResultErrors> {
        for (id, name, writer) in &self.bodies {
            let state = snapshot
                .state(*id)
                .ok_or_else(|| ResultErrors::MissingState(name.clone()))?;
            results.write_record(*writer, &body_record(snapshot.time, state))?;
        }
        Ok(())
    }
}

/// Directory for a new run: `<root>/<name>_<n>` with the first unused `n`.
pub fn next_run_dir(root: &Path, name: &str) -> PathBuf {
    let mut n = 0;
    loop {
        let candidate = root.join(format!("{name}_{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multibody::{BodyBuilder, Pose, Simulator, SimulatorConfig};
    use nalgebra::Matrix3;
    use std::{
        fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("sim_result_{tag}_{nanos}"))
    }

    #[test]
    fn test_writes_one_file_per_body() {
        let mut assembly = Assembly::new("rec");
        assembly
            .create_body(BodyBuilder::fixed("floor", Pose::identity()))
            .unwrap();
        assembly
            .create_body(BodyBuilder::new(
                "ball",
                1.0,
                Matrix3::identity(),
                Pose::identity(),
            ))
            .unwrap();
        let dir = scratch_dir("bodies");
        let mut results = ResultManager::new(dir.clone());
        let recorder = AssemblyRecorder::new(&assembly, &mut results).unwrap();
        let mut sim = Simulator::new(&assembly, SimulatorConfig::default());
        recorder.record(&sim.snapshot(), &mut results).unwrap();
        for _ in 0..3 {
            sim.step(&mut assembly, 0.01).unwrap();
            recorder.record(&sim.snapshot(), &mut results).unwrap();
        }
        results.flush().unwrap();

        let ball = fs::read_to_string(dir.join("ball.csv")).unwrap();
        let lines: Vec<&str> = ball.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], BODY_HEADERS.join(","));
        assert!(dir.join("floor.csv").exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unknown_writer() {
        let mut results = ResultManager::new(scratch_dir("unknown"));
        assert!(matches!(
            results.write_record(7, &[]),
            Err(ResultErrors::WriterNotFound(7))
        ));
    }

    #[test]
    fn test_body_record_layout() {
        let record = body_record(0.5, &BodyState::default());
        assert_eq!(record.len(), BODY_HEADERS.len());
        assert_eq!(record[0], "0.5");
        // identity orientation
        assert_eq!(record[4], "1");
    }
}

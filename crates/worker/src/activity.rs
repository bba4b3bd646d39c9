//! Process activity sampling for heartbeats.
//!
//! The sampler snapshots the pids that exist when the runner starts. Each
//! sample lists the command names of newer processes whose CPU time
//! (`utime + stime` from `/proc/<pid>/stat`) grew since the previous
//! sample, so a heartbeat says which stage of a pipeline is busy.
//!
//! On hosts without `/proc` every sample is empty.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default procfs mount.
pub const PROC_ROOT: &str = "/proc";

/// Tracks CPU usage of processes started after the runner.
#[derive(Debug)]
pub struct ActivitySampler {
    root: PathBuf,
    baseline: HashSet<u32>,
    last_ticks: HashMap<u32, u64>,
}

impl ActivitySampler {
    /// Snapshot the processes currently running under `/proc`.
    pub fn capture() -> Self {
        Self::capture_at(PROC_ROOT)
    }

    /// Snapshot the processes under an arbitrary procfs-shaped root.
    pub fn capture_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let baseline = list_pids(&root).into_iter().collect();
        Self {
            root,
            baseline,
            last_ticks: HashMap::new(),
        }
    }

    /// Number of processes in the startup baseline.
    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    /// Sorted, comma-separated names of new processes that used CPU since
    /// the last sample.
    pub fn sample(&mut self) -> String {
        let mut busy = BTreeSet::new();
        let mut ticks = HashMap::new();

        for pid in list_pids(&self.root) {
            if self.baseline.contains(&pid) {
                continue;
            }
            let Ok(stat) = std::fs::read_to_string(self.root.join(pid.to_string()).join("stat"))
            else {
                // Exited between listing and reading.
                continue;
            };
            let Some(parsed) = parse_stat(&stat) else {
                continue;
            };
            let previous = self.last_ticks.get(&pid).copied().unwrap_or(0);
            if parsed.cpu_ticks > previous {
                busy.insert(parsed.name);
            }
            ticks.insert(pid, parsed.cpu_ticks);
        }

        self.last_ticks = ticks;
        busy.into_iter().collect::<Vec<_>>().join(",")
    }
}

/// Fields of `/proc/<pid>/stat` the sampler uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub name: String,
    /// User plus system time, in clock ticks.
    pub cpu_ticks: u64,
}

/// Parse one `/proc/<pid>/stat` line.
///
/// The command name sits in parentheses and may itself contain spaces or
/// parentheses, so it runs up to the *last* `)`. `utime` and `stime` are
/// fields 14 and 15 overall, i.e. the 12th and 13th after the name.
pub fn parse_stat(line: &str) -> Option<ProcStat> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }
    let name = line[open + 1..close].to_string();
    let mut fields = line[close + 1..].split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(ProcStat {
        name,
        cpu_ticks: utime + stime,
    })
}

fn list_pids(root: &Path) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect()
}

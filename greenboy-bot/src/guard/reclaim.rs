//! Forced reclamation of the instance resources
//!
//! Finds leftover processes of this program run by the same operator,
//! terminates them, frees the guard port and removes the stale lock file.
//! Everything here is best effort and blocking; call it from
//! `spawn_blocking`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::file_lock::read_holder_pid;
use super::port_lock::port_in_use;

const POLL_STEP: Duration = Duration::from_millis(100);

/// What a reclaim pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Processes that exited after SIGTERM
    pub terminated: Vec<u32>,
    /// Processes that needed SIGKILL
    pub killed: Vec<u32>,
    pub port_freed: bool,
    pub lock_removed: bool,
}

#[derive(Debug, Clone)]
pub struct Reclaimer {
    program: String,
    operator: String,
    lock_path: PathBuf,
    port: u16,
    grace: Duration,
}

impl Reclaimer {
    pub fn new(
        program: impl Into<String>,
        operator: impl Into<String>,
        lock_path: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            program: program.into(),
            operator: operator.into(),
            lock_path: lock_path.into(),
            port,
            grace: Duration::from_secs(5),
        }
    }

    pub fn force_reclaim(&self) -> ReclaimReport {
        let own_pid = std::process::id();
        let mut report = ReclaimReport::default();

        let mut pids = self.listed_instances(own_pid);
        pids.extend(self.pgrep_instances(own_pid));
        if let Some(pid) = self.lock_holder(own_pid) {
            pids.insert(pid);
        }

        if pids.is_empty() {
            debug!("No other {} instances found", self.program);
        }

        for pid in pids {
            info!(pid, "Terminating previous instance");
            if terminate(pid, self.grace) {
                report.terminated.push(pid);
            } else {
                warn!(pid, "Instance ignored SIGTERM, killing it");
                report.killed.push(pid);
            }
        }

        if port_in_use(self.port) {
            info!(port = self.port, "Freeing guard port");
            let freed = Command::new("fuser")
                .arg("-k")
                .arg(format!("{}/tcp", self.port))
                .output();
            match freed {
                Ok(_) => report.port_freed = !port_in_use(self.port),
                Err(e) => warn!("Could not run fuser: {}", e),
            }
        }

        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {
                info!("Removed stale lock file {}", self.lock_path.display());
                report.lock_removed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not remove lock file {}: {}",
                self.lock_path.display(),
                e
            ),
        }

        report
    }

    /// Matches from the full process table
    fn listed_instances(&self, own_pid: u32) -> BTreeSet<u32> {
        match run_tool("ps", &["-eo", "pid=,user=,args="]) {
            Some(listing) => matching_pids(&listing, &self.program, &self.operator, own_pid),
            None => BTreeSet::new(),
        }
    }

    /// Matches reported by `pgrep`, which also sees renamed argv
    fn pgrep_instances(&self, own_pid: u32) -> BTreeSet<u32> {
        run_tool("pgrep", &["-u", &self.operator, "-x", &self.program])
            .map(|out| {
                out.lines()
                    .filter_map(|line| line.trim().parse::<u32>().ok())
                    .filter(|pid| *pid != own_pid)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pid from the lock file, trusted only while it still runs this program
    fn lock_holder(&self, own_pid: u32) -> Option<u32> {
        let pid = read_holder_pid(&self.lock_path)?;
        if pid == own_pid || !is_alive(pid) {
            return None;
        }
        let listing = run_tool("ps", &["-o", "pid=,user=,args=", "-p", &pid.to_string()])?;
        matching_pids(&listing, &self.program, &self.operator, own_pid)
            .contains(&pid)
            .then_some(pid)
    }
}

/// Pids in a `ps -o pid=,user=,args=` listing that run `program` as `operator`
///
/// The program is matched against the file name of the first argument, so
/// `/opt/bin/green-boy --flag` matches but `vim green-boy.log` does not.
pub fn matching_pids(listing: &str, program: &str, operator: &str, own_pid: u32) -> BTreeSet<u32> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse::<u32>().ok()?;
            let user = parts.next()?;
            let exe = parts.next()?;
            let name = Path::new(exe).file_name()?.to_str()?;
            (user == operator && name == program && pid != own_pid).then_some(pid)
        })
        .collect()
}

fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output() {
        Ok(output) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        Err(e) => {
            debug!("Could not run {}: {}", program, e);
            None
        }
    }
}

fn is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// SIGTERM, wait up to `grace`, then SIGKILL
///
/// Returns `true` if the process went away without SIGKILL.
fn terminate(pid: u32, grace: Duration) -> bool {
    let raw = pid as libc::pid_t;
    unsafe {
        libc::kill(raw, libc::SIGTERM);
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        thread::sleep(POLL_STEP);
    }

    unsafe {
        libc::kill(raw, libc::SIGKILL);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LISTING: &str = "\
    1 root     /sbin/init
  200 alice    /home/alice/bin/green-boy
  201 alice    green-boy --registry-file jobs.json
  202 bob      /usr/local/bin/green-boy
  203 alice    vim green-boy.log
  204 alice    /usr/bin/python3 green-boy.py
  999 alice    green-boy
";

    #[test]
    fn test_matching_pids() {
        let pids = matching_pids(LISTING, "green-boy", "alice", 999);
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![200, 201]);
    }

    #[test]
    fn test_matching_pids_ignores_garbage() {
        let pids = matching_pids("PID USER ARGS\n\n  x alice green-boy\n", "green-boy", "alice", 1);
        assert!(pids.is_empty());
    }

    #[test]
    fn test_reclaim_removes_stale_lock_file() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("greenboy-nobody.lock");
        // Our own pid is never a reclaim target
        std::fs::write(&lock, std::process::id().to_string()).unwrap();

        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let reclaimer = Reclaimer::new(
            "green-boy-test-no-such-program",
            "greenboy-test-no-such-user",
            &lock,
            port,
        );

        let report = reclaimer.force_reclaim();

        assert!(report.terminated.is_empty());
        assert!(report.killed.is_empty());
        assert!(report.lock_removed);
        assert!(!lock.exists());
    }
}

use std::fmt;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done(i32),
    Killed(i32),
}

#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub pgid: Pid,
    /// Processes not yet reaped. The last one decides the job's status.
    pub pids: Vec<Pid>,
    pub last_pid: Pid,
    pub command: String,
    pub status: JobStatus,
    pub is_current: bool,
    pub is_previous: bool,
}

impl Job {
    fn new(index: usize, pgid: Pid, pids: Vec<Pid>, command: String, status: JobStatus) -> Self {
        let last_pid = pids.last().copied().unwrap_or(pgid);
        Self {
            index,
            pgid,
            pids,
            last_pid,
            command,
            status,
            is_current: false,
            is_previous: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Done(_) | JobStatus::Killed(_))
    }

    /// Polls the job's remaining processes without blocking.
    fn poll(&mut self) {
        let mut remaining = Vec::with_capacity(self.pids.len());
        for &pid in &self.pids {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => remaining.push(pid),
                Ok(WaitStatus::Exited(pid, code)) => {
                    if pid == self.last_pid {
                        self.status = JobStatus::Done(code);
                    }
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    if pid == self.last_pid {
                        self.status = JobStatus::Killed(sig as i32);
                    }
                }
                Ok(_) => remaining.push(pid),
                Err(Errno::ECHILD) => {
                    warn!("job {}: process {} was already reaped", self.index, pid);
                }
                Err(e) => {
                    warn!("job {}: waitpid({}) failed: {}", self.index, pid, e);
                    remaining.push(pid);
                }
            }
        }
        self.pids = remaining;
        if self.pids.is_empty() && !self.is_finished() {
            // The status-carrying process vanished without a report.
            self.status = JobStatus::Done(0);
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Running => "running".to_string(),
            JobStatus::Stopped => "stopped".to_string(),
            JobStatus::Done(0) => "done".to_string(),
            JobStatus::Done(code) => format!("exit {}", code),
            JobStatus::Killed(sig) => format!("killed ({})", sig),
        };
        let mark = if self.is_current {
            "+"
        } else if self.is_previous {
            "-"
        } else {
            " "
        };
        write!(
            f,
            "[{}]{} {} {} {}",
            self.index, mark, self.pgid, status, self.command
        )
    }
}

/// Background and stopped process groups the shell still has to reap.
#[derive(Debug, Default)]
pub struct JobManager {
    jobs: Vec<Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn find_available_index(&self) -> usize {
        let mut index = 1;
        while self.jobs.iter().any(|job| job.index == index) {
            index += 1;
        }
        index
    }

    /// Records a job and makes it the current one. Returns its index.
    pub fn add_job(
        &mut self,
        pgid: Pid,
        pids: Vec<Pid>,
        command: String,
        status: JobStatus,
    ) -> usize {
        let index = self.find_available_index();
        let mut job = Job::new(index, pgid, pids, command, status);
        job.is_current = true;
        info!("job [{}] started: pgid={} {}", index, pgid, job.command);
        self.jobs.push(job);
        self.update_marks(index);
        index
    }

    pub fn remove_job(&mut self, pgid: Pid) -> Option<Job> {
        let pos = self.jobs.iter().position(|job| job.pgid == pgid)?;
        let job = self.jobs.remove(pos);

        if job.is_current && !self.jobs.is_empty() {
            // The previous job becomes current; failing that, the newest one.
            if let Some(prev) = self.jobs.iter_mut().find(|job| job.is_previous) {
                prev.is_current = true;
                prev.is_previous = false;
            } else if let Some(last) = self.jobs.last_mut() {
                last.is_current = true;
            }
        }
        Some(job)
    }

    fn update_marks(&mut self, current_job_index: usize) {
        for job in self.jobs.iter_mut() {
            if job.index == current_job_index {
                job.is_current = true;
                job.is_previous = false;
            } else if job.is_current {
                job.is_current = false;
                job.is_previous = true;
            } else {
                job.is_previous = false;
            }
        }
    }

    /// Collects every job whose processes have all terminated.
    pub fn reap(&mut self) -> Vec<Job> {
        for job in self.jobs.iter_mut() {
            job.poll();
        }
        let finished: Vec<Pid> = self
            .jobs
            .iter()
            .filter(|job| job.is_finished())
            .map(|job| job.pgid)
            .collect();

        let mut reaped = Vec::with_capacity(finished.len());
        for pgid in finished {
            if let Some(job) = self.remove_job(pgid) {
                debug!("job [{}] reaped: {:?}", job.index, job.status);
                reaped.push(job);
            }
        }
        reaped
    }
}
